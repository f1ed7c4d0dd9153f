//! Per-record transformation from raw Slack export fields to a
//! [`ParsedMessage`].
//!
//! Covers the text pipeline (URL un-escaping, HTML entity un-escaping,
//! Slack→Discord markdown fixes), the timestamp/name header, display-name
//! resolution against a previously loaded user directory, and extraction
//! of link previews and attached files.
//!
//! Anything malformed inside one record is logged and skipped; the record
//! is still processed for its remaining fields. Transformation never fails.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SlackportError};
use crate::model::{format_epoch_secs, AttachedFile, Link, ParsedMessage, Timestamp};

/// Name used when no display name can be resolved for a message author.
pub const UNKNOWN_NAME: &str = "???";

// Slack uses *one* asterisk for bold and ~one~ tilde for strikethrough;
// Discord wants two of each. Single greedy pass, best effort on nested or
// adjacent spans.
static SLACK_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*)(\S+|\S.*\S)(\*)").expect("bold regex"));
static SLACK_STRIKETHROUGH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(~)(\S+|\S.*\S)(~)").expect("strikethrough regex"));

// ============================================================================
// Raw export records
// ============================================================================

/// One record from a Slack export day file, as serialized JSON.
///
/// Only the fields this importer reads are declared; everything else in
/// the record is ignored.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExportRecord {
    /// Record type; only `"message"` records are imported
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Message timestamp, e.g. `"1693347600.000100"`
    pub ts: Option<String>,
    /// Slack user id of the sender
    pub user: Option<String>,
    /// Per-message profile snapshot
    pub user_profile: Option<UserProfile>,
    /// Message body text
    pub text: Option<String>,
    /// Rich-link attachment records
    pub attachments: Option<Vec<AttachmentRecord>>,
    /// Attached file records
    pub files: Option<Vec<FileRecord>>,
    /// Present (possibly empty) iff this message is the root of a thread
    pub replies: Option<Vec<ReplyStub>>,
    /// Timestamp of the thread root this message replies to
    pub thread_ts: Option<String>,
}

/// The profile snapshot embedded in a message record.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct UserProfile {
    /// User-chosen display name, may be empty
    pub display_name: Option<String>,
    /// Full name, may be empty
    pub real_name: Option<String>,
}

/// A reply stub inside a thread root's `replies` list.
///
/// Only the presence of the list matters for thread reconstruction; the
/// stubs themselves are not used.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplyStub {
    /// Replying user id
    pub user: Option<String>,
    /// Reply timestamp
    pub ts: Option<String>,
}

/// One Slack attachment record (a rich-link preview).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AttachmentRecord {
    /// Link title
    pub title: Option<String>,
    /// Target URL of the title
    pub title_link: Option<String>,
    /// Description text
    pub text: Option<String>,
    /// Source service name
    pub service_name: Option<String>,
    /// Source service icon URL
    pub service_icon: Option<String>,
    /// Image URL
    pub image_url: Option<String>,
    /// Thumbnail URL
    pub thumb_url: Option<String>,
    /// `"tombstone"` if the attachment was deleted from Slack
    pub mode: Option<String>,
}

/// One Slack file record.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileRecord {
    /// Slack file id
    pub id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Download URL
    pub url_private: Option<String>,
    /// `"tombstone"` if the file was deleted from Slack
    pub mode: Option<String>,
    /// Deletion time in epoch seconds, for tombstones
    pub date_deleted: Option<i64>,
}

// ============================================================================
// Text pipeline
// ============================================================================

/// Undoes the Slack export's escaping of slashes in URLs (`\/` → `/`).
pub fn unescape_url(url: &str) -> String {
    url.replace("\\/", "/")
}

/// Undoes the Slack export's HTML entity escaping.
///
/// The export encodes exactly three control characters: ampersand
/// (`&amp;`), less-than (`&lt;`), and greater-than (`&gt;`). The
/// ampersand is decoded first, matching the order Slack documents.
pub fn unescape_text(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Rewrites Slack's single-delimiter bold and strikethrough markers to the
/// double-delimiter form Discord renders.
///
/// `*bold*` → `**bold**`, `~gone~` → `~~gone~~`. This is a best-effort
/// single-pass substitution; behavior on nested or unbalanced delimiters
/// is whatever the greedy pattern produces.
pub fn fix_markdown(text: &str) -> String {
    let bold_fixed = SLACK_BOLD_RE.replace_all(text, "${1}*${2}*${3}");
    SLACK_STRIKETHROUGH_RE
        .replace_all(&bold_fixed, "${1}~${2}~${3}")
        .into_owned()
}

/// Formats a message body with its timestamp/name header.
///
/// The header is `` `<local time>` **<name>** `` followed by the body,
/// separated by a newline when the body spans multiple lines and a single
/// space otherwise. When no name is given the name segment is omitted
/// entirely.
pub fn format_message(ts: Timestamp, name: Option<&str>, body: &str) -> String {
    let sep = if body.contains('\n') { "\n" } else { " " };
    match name {
        Some(name) => format!("`{}` **{}**{}{}", ts.format_local(), name, sep, body),
        None => format!("`{}`{}{}", ts.format_local(), sep, body),
    }
}

// ============================================================================
// User directory
// ============================================================================

/// Slack user id → display name, loaded from a `users.json` export file.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: Option<String>,
    name: Option<String>,
    real_name: Option<String>,
}

impl UserDirectory {
    /// An empty directory; name resolution falls back to per-message data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads a `users.json` file.
    ///
    /// Entries missing an id or any name are skipped with a warning;
    /// duplicate ids keep the first occurrence. An unreadable or
    /// malformed file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "parsing user information");
        let content = fs::read_to_string(path)?;
        let records: Vec<UserRecord> = serde_json::from_str(&content)
            .map_err(|e| SlackportError::export_parse(e, Some(path.to_path_buf())))?;

        let mut users = HashMap::new();
        for record in records {
            let Some(id) = record.id else {
                warn!("user in Slack users file is missing id, ignoring");
                continue;
            };
            if users.contains_key(&id) {
                warn!(user_id = %id, "duplicate Slack user id, ignoring repeated instance");
                continue;
            }
            let name = match (record.name, record.real_name) {
                (Some(name), _) if !name.is_empty() => name,
                (_, Some(real_name)) if !real_name.is_empty() => real_name,
                _ => {
                    warn!(user_id = %id, "unable to find name for user id");
                    continue;
                }
            };
            debug!(user_id = %id, name = %name, "user name registered");
            users.insert(id, name);
        }

        info!(count = users.len(), "users successfully parsed");
        Ok(Self { users })
    }

    /// Looks up a display name by Slack user id.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.users.get(id).map(String::as_str)
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            users: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

// ============================================================================
// Transformer
// ============================================================================

/// Turns raw export records into [`ParsedMessage`]s.
pub struct MessageTransformer {
    users: UserDirectory,
}

impl MessageTransformer {
    /// Creates a transformer resolving names against the given directory.
    pub fn new(users: UserDirectory) -> Self {
        Self { users }
    }

    /// Resolves the display name for a record.
    ///
    /// Resolution order: user directory → embedded display name →
    /// embedded full name → sender id with its leading `U` stripped →
    /// [`UNKNOWN_NAME`]. Never fails.
    pub fn display_name(&self, record: &ExportRecord, ts: Timestamp, filename: &Path) -> String {
        if let Some(id) = &record.user {
            if let Some(name) = self.users.get(id) {
                return name.to_string();
            }
        }

        if let Some(profile) = &record.user_profile {
            if let Some(display_name) = profile.display_name.as_deref() {
                if !display_name.is_empty() {
                    return display_name.to_string();
                }
            }
            if let Some(real_name) = profile.real_name.as_deref() {
                if !real_name.is_empty() {
                    return real_name.to_string();
                }
            }
        }

        if let Some(id) = &record.user {
            return match id.strip_prefix('U') {
                Some(stripped) => stripped.to_string(),
                None => id.clone(),
            };
        }

        warn!(
            timestamp = %ts,
            file = %filename.display(),
            "unable to find a user to display for message"
        );
        UNKNOWN_NAME.to_string()
    }

    /// Transforms one record into a [`ParsedMessage`].
    ///
    /// The caller has already checked the record type and extracted `ts`.
    pub fn transform(&self, record: &ExportRecord, ts: Timestamp, filename: &Path) -> ParsedMessage {
        let name = self.display_name(record, ts, filename);
        let body = fix_markdown(&unescape_text(&unescape_url(
            record.text.as_deref().unwrap_or(""),
        )));
        let mut message = ParsedMessage::new(format_message(ts, Some(&name), &body));

        if let Some(attachments) = &record.attachments {
            for attachment in attachments {
                add_link(&mut message, attachment);
            }
        }

        if let Some(files) = &record.files {
            for file in files {
                add_file(&mut message, file);
            }
        }

        message
    }
}

fn add_link(message: &mut ParsedMessage, attachment: &AttachmentRecord) {
    if attachment.mode.as_deref() == Some("tombstone") {
        warn!("attached link was deleted from Slack, ignoring");
        return;
    }

    let link = Link {
        title: attachment.title.clone(),
        title_link: attachment.title_link.as_deref().map(unescape_url),
        text: attachment.text.clone(),
        service_name: attachment.service_name.clone(),
        service_icon: attachment.service_icon.as_deref().map(unescape_url),
        image_url: attachment.image_url.as_deref().map(unescape_url),
        thumb_url: attachment.thumb_url.as_deref().map(unescape_url),
    };

    info!(url = link.title_link.as_deref().unwrap_or("<none>"), "link added to parsed message");
    message.push_link(link);
}

fn add_file(message: &mut ParsedMessage, file: &FileRecord) {
    if file.mode.as_deref() == Some("tombstone") {
        // File was deleted from Slack; log it, don't mention it in the import.
        match file.date_deleted {
            Some(deleted) => warn!(
                deleted_at = %format_epoch_secs(deleted),
                "attached file was deleted, ignoring"
            ),
            None => warn!("attached file was deleted, ignoring"),
        }
        return;
    }

    let (Some(id), Some(name), Some(url)) = (&file.id, &file.name, &file.url_private) else {
        warn!("attached file record is missing id, name, or url, skipping");
        return;
    };

    info!(name = %name, "file added to parsed message");
    message.push_file(AttachedFile::new(id, name, unescape_url(url)));
}

// ============================================================================
// Tests
// ============================================================================

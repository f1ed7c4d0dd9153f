//! Walks a Slack export and reconstructs the canonical message model.
//!
//! The ingester resolves the source→destination channel map for the chosen
//! source mode, enumerates each channel's date-stamped day files in
//! chronological order, and feeds every record through the
//! [`MessageTransformer`], placing the results into roots and threads.
//!
//! Thread membership comes solely from a record's explicit `thread_ts`
//! reference. A reply whose root is missing from the export gets a
//! synthetic placeholder root, so partial exports still import cleanly.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Source;
use crate::error::{Result, SlackportError};
use crate::model::{
    ChannelMap, ChannelMessages, ParsedExport, ParsedMessage, RootEntry, ThreadMap, Timestamp,
};
use crate::transform::{format_message, ExportRecord, MessageTransformer, UserDirectory};

/// Body of the placeholder root synthesized for a reply whose thread root
/// is not in the export.
pub const ORPHAN_THREAD_TEXT: &str = "_Unable to find start of exported thread_";

// Slack export day files are named YYYY-MM-DD.json; anything else in a
// channel directory (attachments subdirs, canvases) is not a day file.
static EXPORT_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\d{4}-\d{2}-\d{2}\.json\z").expect("filename regex"));

/// Checks whether a filename looks like a Slack export day file.
pub fn is_export_filename(filename: &str) -> bool {
    EXPORT_FILENAME_RE.is_match(filename)
}

/// Strips the leading pound sign from a channel name, if present.
fn canonicalize(channel_name: &str) -> &str {
    channel_name.strip_prefix('#').unwrap_or(channel_name)
}

/// Parses a Slack export into a [`ParsedExport`].
pub struct ExportIngester {
    source: Source,
    users_file: Option<PathBuf>,
}

impl ExportIngester {
    /// Creates an ingester for the given source.
    ///
    /// `users_file` overrides the default `users.json` location, which is
    /// otherwise deduced relative to the source (the export root, or the
    /// parent of a single channel directory or day file).
    pub fn new(source: Source, users_file: Option<PathBuf>) -> Self {
        Self { source, users_file }
    }

    /// Parses the whole export.
    ///
    /// Fatal errors: an unreadable file, invalid JSON, or a bad channel
    /// mapping file. Problems inside individual records are logged and
    /// skipped.
    pub fn ingest(&self) -> Result<ParsedExport> {
        let users = self.load_users()?;
        let transformer = MessageTransformer::new(users);

        let channel_map = self.build_channel_map()?;
        info!(channels = channel_map.len(), "mapping of Slack to Discord channels resolved");
        for (slack_channel, discord_channel) in &channel_map {
            debug!(
                slack = slack_channel.as_deref().unwrap_or("<single file>"),
                discord = %discord_channel,
                "channel mapping"
            );
        }

        let mut export = ParsedExport::new();
        for (slack_channel, discord_channel) in &channel_map {
            let messages =
                self.parse_channel(slack_channel.as_deref(), discord_channel, &transformer)?;
            info!(
                channel = %discord_channel,
                roots = messages.len(),
                "messages parsed for Discord channel"
            );
            export.insert_channel(discord_channel.clone(), messages);
        }

        info!("messages from Slack export successfully parsed");
        Ok(export)
    }

    // =========================================================================
    // User directory
    // =========================================================================

    fn load_users(&self) -> Result<UserDirectory> {
        let candidate = self.users_file.clone().or_else(|| self.default_users_file());

        let Some(path) = candidate else {
            warn!("users file is not specified, and unable to figure it out");
            return Ok(UserDirectory::empty());
        };

        if !path.exists() {
            warn!(
                path = %path.display(),
                "no users file found, will get user info from individual messages"
            );
            return Ok(UserDirectory::empty());
        }

        UserDirectory::load(&path)
    }

    fn default_users_file(&self) -> Option<PathBuf> {
        match &self.source {
            Source::DirTree { root, .. } => Some(root.join("users.json")),
            Source::Dir { dir, .. } => dir.parent().map(|p| p.join("users.json")),
            Source::File { file, .. } => file
                .parent()
                .and_then(Path::parent)
                .map(|p| p.join("users.json")),
        }
    }

    // =========================================================================
    // Channel map
    // =========================================================================

    /// Resolves the source→destination channel map for the configured mode.
    pub fn build_channel_map(&self) -> Result<ChannelMap> {
        match &self.source {
            Source::File { dest_channel, .. } => {
                // one channel only, one file
                Ok(vec![(None, canonicalize(dest_channel).to_string())])
            }

            Source::Dir { dir, dest_channel } => {
                let slack_channel = dir_basename(dir)?;
                let dest = match dest_channel {
                    Some(dest) => canonicalize(dest).to_string(),
                    None => {
                        info!(channel = %slack_channel, "inferring dest Discord channel");
                        slack_channel.clone()
                    }
                };
                Ok(vec![(Some(slack_channel), dest)])
            }

            Source::DirTree { root, channel_file } => {
                let all_slack_channels = list_subdirs(root)?;

                match channel_file {
                    Some(channel_file) => {
                        parse_channel_file(channel_file, root, &all_slack_channels)
                    }
                    None => {
                        // no channel file: include every channel, same name on
                        // the Discord side
                        Ok(all_slack_channels
                            .into_iter()
                            .map(|name| (Some(name.clone()), name))
                            .collect())
                    }
                }
            }
        }
    }

    // =========================================================================
    // Per-channel parsing
    // =========================================================================

    fn parse_channel(
        &self,
        slack_channel: Option<&str>,
        discord_channel: &str,
        transformer: &MessageTransformer,
    ) -> Result<ChannelMessages> {
        let mut messages = ChannelMessages::new();

        match slack_channel {
            Some(slack_channel) => {
                info!(
                    slack = %slack_channel,
                    discord = %discord_channel,
                    "parsing Slack channel from export"
                );
                let channel_dir = match &self.source {
                    Source::DirTree { root, .. } => root.join(slack_channel),
                    Source::Dir { dir, .. } => dir.clone(),
                    Source::File { .. } => {
                        unreachable!("single-file mode has no source channel")
                    }
                };

                let mut filenames: Vec<String> = fs::read_dir(&channel_dir)?
                    .filter_map(std::result::Result::ok)
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .filter(|name| is_export_filename(name))
                    .collect();

                if filenames.is_empty() {
                    warn!(
                        channel = %slack_channel,
                        dir = %channel_dir.display(),
                        "unable to find any Slack export JSON files for channel"
                    );
                    return Ok(messages);
                }

                // lexicographic order on YYYY-MM-DD.json is date order
                filenames.sort();
                for filename in filenames {
                    self.parse_file(&channel_dir.join(filename), transformer, &mut messages)?;
                }
            }

            None => {
                let Source::File { file, .. } = &self.source else {
                    unreachable!("no source channel outside single-file mode")
                };
                info!(
                    file = %file.display(),
                    discord = %discord_channel,
                    "parsing a single Slack export file"
                );
                self.parse_file(file, transformer, &mut messages)?;
            }
        }

        Ok(messages)
    }

    fn parse_file(
        &self,
        path: &Path,
        transformer: &MessageTransformer,
        messages: &mut ChannelMessages,
    ) -> Result<()> {
        info!(file = %path.display(), "parsing Slack export JSON file");

        let conforming = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_export_filename);
        if !conforming {
            warn!(file = %path.display(), "filename is not named as expected, will try to parse anyway");
        }

        let content = fs::read_to_string(path)?;
        let records: Vec<ExportRecord> = serde_json::from_str(&content)
            .map_err(|e| SlackportError::export_parse(e, Some(path.to_path_buf())))?;

        for record in &records {
            place_record(record, transformer, path, messages);
        }

        debug!(file = %path.display(), records = records.len(), "export file parsed");
        Ok(())
    }
}

/// Places one record into a channel's roots and threads.
///
/// Non-message records are skipped silently; a record without a usable
/// timestamp is skipped with a warning. A record declaring replies is
/// always a thread root; a record with a `thread_ts` joins (or
/// synthesizes) that root's thread; anything else is standalone.
fn place_record(
    record: &ExportRecord,
    transformer: &MessageTransformer,
    filename: &Path,
    messages: &mut ChannelMessages,
) {
    if record.kind.as_deref() != Some("message") {
        return;
    }

    let Some(ts) = record.ts.as_deref().and_then(Timestamp::parse) else {
        warn!(file = %filename.display(), "message is missing timestamp, skipping");
        return;
    };

    let message = transformer.transform(record, ts, filename);

    if record.replies.is_some() {
        // head of a thread
        messages.insert(ts, RootEntry::thread_root(message));
    } else if let Some(thread_ts_raw) = record.thread_ts.as_deref() {
        let Some(thread_ts) = Timestamp::parse(thread_ts_raw) else {
            warn!(
                timestamp = %ts,
                thread_ts = %thread_ts_raw,
                "reply has an unparseable thread timestamp, treating as standalone"
            );
            messages.insert(ts, RootEntry::standalone(message));
            return;
        };

        let entry = messages.entry(thread_ts).or_insert_with(|| {
            // can't find the root of the thread this message belongs to;
            // happens when the history before the export window is missing
            warn!(
                thread_ts = %thread_ts,
                timestamp = %ts,
                "can't find thread root for message, creating synthetic thread"
            );
            RootEntry::thread_root(ParsedMessage::new(format_message(
                thread_ts,
                None,
                ORPHAN_THREAD_TEXT,
            )))
        });
        entry
            .thread
            .get_or_insert_with(ThreadMap::new)
            .insert(ts, message);
    } else {
        // not associated with a thread at all
        messages.insert(ts, RootEntry::standalone(message));
    }
}

// ============================================================================
// Directory helpers
// ============================================================================

fn dir_basename(dir: &Path) -> Result<String> {
    // canonicalize so trailing separators and relative paths like "." still
    // yield a real directory name
    let canonical = dir.canonicalize()?;
    canonical
        .file_name()
        .and_then(|n| n.to_str())
        .map(ToString::to_string)
        .ok_or_else(|| {
            SlackportError::config(format!(
                "unable to infer a channel name from source dir {}",
                dir.display()
            ))
        })
}

fn list_subdirs(root: &Path) -> Result<Vec<String>> {
    let mut subdirs: Vec<String> = fs::read_dir(root)?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    subdirs.sort();
    Ok(subdirs)
}

fn parse_channel_file(
    channel_file: &Path,
    root: &Path,
    all_slack_channels: &[String],
) -> Result<ChannelMap> {
    let content = fs::read_to_string(channel_file)?;
    let mut map = ChannelMap::new();

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.len() {
            0 => {} // empty line, okay, skip
            1 | 2 => {
                let slack_channel = canonicalize(fields[0]);
                if !all_slack_channels.iter().any(|c| c == slack_channel) {
                    return Err(SlackportError::config(format!(
                        "Slack channel {} from channel file {} is not in the Slack export at {}",
                        slack_channel,
                        channel_file.display(),
                        root.display()
                    )));
                }
                let discord_channel = canonicalize(fields.get(1).copied().unwrap_or(fields[0]));
                // a repeated source line replaces the earlier mapping
                map.retain(|(source, _)| source.as_deref() != Some(slack_channel));
                map.push((Some(slack_channel.to_string()), discord_channel.to_string()));
            }
            _ => {
                return Err(SlackportError::config(format!(
                    "line in file mapping Slack to Discord channels has too many fields: {line:?}"
                )));
            }
        }
    }

    Ok(map)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ReplyStub;

    fn transformer() -> MessageTransformer {
        MessageTransformer::new(UserDirectory::empty())
    }

    fn msg_record(ts: &str, text: &str) -> ExportRecord {
        ExportRecord {
            kind: Some("message".to_string()),
            ts: Some(ts.to_string()),
            user: Some("U1".to_string()),
            text: Some(text.to_string()),
            ..ExportRecord::default()
        }
    }

    #[test]
    fn test_is_export_filename() {
        assert!(is_export_filename("2023-08-29.json"));
        assert!(!is_export_filename("2023-08-29.json.bak"));
        assert!(!is_export_filename("notes.json"));
        assert!(!is_export_filename("2023-8-29.json"));
        assert!(!is_export_filename("x2023-08-29.json"));
    }

    #[test]
    fn test_canonicalize_strips_pound() {
        assert_eq!(canonicalize("#general"), "general");
        assert_eq!(canonicalize("general"), "general");
    }

    #[test]
    fn test_place_standalone_message() {
        let mut messages = ChannelMessages::new();
        let record = msg_record("1000.000000", "hello");
        place_record(&record, &transformer(), Path::new("f"), &mut messages);

        assert_eq!(messages.len(), 1);
        let entry = &messages[&Timestamp::from_secs(1000)];
        assert!(!entry.is_thread_root());
    }

    #[test]
    fn test_place_skips_non_message_types() {
        let mut messages = ChannelMessages::new();
        let mut record = msg_record("1000.000000", "joined");
        record.kind = Some("channel_join".to_string());
        place_record(&record, &transformer(), Path::new("f"), &mut messages);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_place_skips_missing_timestamp() {
        let mut messages = ChannelMessages::new();
        let mut record = msg_record("1000.000000", "no ts");
        record.ts = None;
        place_record(&record, &transformer(), Path::new("f"), &mut messages);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_place_thread_root_and_replies() {
        let mut messages = ChannelMessages::new();

        let mut root = msg_record("2000.000000", "root");
        root.replies = Some(vec![ReplyStub::default()]);
        place_record(&root, &transformer(), Path::new("f"), &mut messages);

        let mut reply1 = msg_record("2001.000000", "first reply");
        reply1.thread_ts = Some("2000.000000".to_string());
        place_record(&reply1, &transformer(), Path::new("f"), &mut messages);

        let mut reply2 = msg_record("2002.000000", "second reply");
        reply2.thread_ts = Some("2000.000000".to_string());
        place_record(&reply2, &transformer(), Path::new("f"), &mut messages);

        assert_eq!(messages.len(), 1);
        let entry = &messages[&Timestamp::from_secs(2000)];
        let thread = entry.thread.as_ref().unwrap();
        assert_eq!(thread.len(), 2);
        let order: Vec<i64> = thread.keys().map(Timestamp::secs).collect();
        assert_eq!(order, vec![2001, 2002]);
    }

    #[test]
    fn test_place_orphan_reply_synthesizes_root() {
        let mut messages = ChannelMessages::new();

        let mut reply = msg_record("3001.000000", "orphan reply");
        reply.thread_ts = Some("3000.000000".to_string());
        place_record(&reply, &transformer(), Path::new("f"), &mut messages);

        assert_eq!(messages.len(), 1);
        let entry = &messages[&Timestamp::from_secs(3000)];
        assert!(entry.message.text.ends_with(ORPHAN_THREAD_TEXT));
        // synthetic root header has no name segment
        assert!(!entry.message.text.contains("**"));
        let thread = entry.thread.as_ref().unwrap();
        assert_eq!(thread.len(), 1);
        assert!(thread.contains_key(&Timestamp::from_secs(3001)));
    }

    #[test]
    fn test_place_orphan_then_more_replies_share_synthetic_root() {
        let mut messages = ChannelMessages::new();

        for (ts, text) in [("3001.000000", "one"), ("3002.000000", "two")] {
            let mut reply = msg_record(ts, text);
            reply.thread_ts = Some("3000.000000".to_string());
            place_record(&reply, &transformer(), Path::new("f"), &mut messages);
        }

        assert_eq!(messages.len(), 1);
        let thread = messages[&Timestamp::from_secs(3000)].thread.as_ref().unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_place_unparseable_thread_ts_falls_back_to_standalone() {
        let mut messages = ChannelMessages::new();
        let mut reply = msg_record("4000.000000", "weird");
        reply.thread_ts = Some("not-a-ts".to_string());
        place_record(&reply, &transformer(), Path::new("f"), &mut messages);

        assert_eq!(messages.len(), 1);
        assert!(!messages[&Timestamp::from_secs(4000)].is_thread_root());
    }

    #[test]
    fn test_channel_file_rejects_too_many_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("general")).unwrap();
        let channel_file = dir.path().join("channels.txt");
        fs::write(&channel_file, "general renamed extra\n").unwrap();

        let err =
            parse_channel_file(&channel_file, dir.path(), &["general".to_string()]).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("too many fields"));
    }

    #[test]
    fn test_channel_file_rejects_unknown_source_channel() {
        let dir = tempfile::tempdir().unwrap();
        let channel_file = dir.path().join("channels.txt");
        fs::write(&channel_file, "missing\n").unwrap();

        let err =
            parse_channel_file(&channel_file, dir.path(), &["general".to_string()]).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_channel_file_maps_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let channel_file = dir.path().join("channels.txt");
        fs::write(&channel_file, "#general\n\nrandom off-topic\n").unwrap();

        let channels = vec!["general".to_string(), "random".to_string()];
        let map = parse_channel_file(&channel_file, dir.path(), &channels).unwrap();
        assert_eq!(
            map,
            vec![
                (Some("general".to_string()), "general".to_string()),
                (Some("random".to_string()), "off-topic".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_channel_map_single_file() {
        let ingester = ExportIngester::new(
            Source::File {
                file: PathBuf::from("/export/2023-08-29.json"),
                dest_channel: "#imported".to_string(),
            },
            None,
        );
        let map = ingester.build_channel_map().unwrap();
        assert_eq!(map, vec![(None, "imported".to_string())]);
    }

    #[test]
    fn test_build_channel_map_dir_defaults_to_basename() {
        let root = tempfile::tempdir().unwrap();
        let channel_dir = root.path().join("general");
        fs::create_dir(&channel_dir).unwrap();

        let ingester = ExportIngester::new(
            Source::Dir {
                dir: channel_dir,
                dest_channel: None,
            },
            None,
        );
        let map = ingester.build_channel_map().unwrap();
        assert_eq!(
            map,
            vec![(Some("general".to_string()), "general".to_string())]
        );
    }

    #[test]
    fn test_build_channel_map_dirtree_without_channel_file() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("general")).unwrap();
        fs::create_dir(root.path().join("random")).unwrap();
        fs::write(root.path().join("users.json"), "[]").unwrap();

        let ingester = ExportIngester::new(
            Source::DirTree {
                root: root.path().to_path_buf(),
                channel_file: None,
            },
            None,
        );
        let map = ingester.build_channel_map().unwrap();
        assert_eq!(
            map,
            vec![
                (Some("general".to_string()), "general".to_string()),
                (Some("random".to_string()), "random".to_string()),
            ]
        );
    }
}

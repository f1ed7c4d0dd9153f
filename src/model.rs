//! The canonical message model built from a Slack export.
//!
//! Parsing produces one [`ParsedExport`]: destination channel name →
//! [`ChannelMessages`] → [`RootEntry`] (a root message plus an optional
//! thread). All maps are keyed by [`Timestamp`], so iterating them yields
//! source chronological order without any explicit sort step.
//!
//! The model is built once by [`crate::ingest::ExportIngester`], has its
//! attached-file local paths filled in by [`crate::download::FileFetcher`],
//! and is then handed read-only to the delivery pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// A Slack message timestamp: whole microseconds since the Unix epoch.
///
/// Slack serializes timestamps as strings of the form `"1693347600.000100"`
/// (seconds, dot, fractional digits). Within one channel these values form a
/// single shared key space: a thread root and its replies never collide.
/// Storing microseconds as an integer makes the value a well-behaved ordered
/// map key, which the float form is not.
///
/// # Example
///
/// ```
/// use slackport::model::Timestamp;
///
/// let ts = Timestamp::parse("1693347600.000100").unwrap();
/// assert_eq!(ts.to_string(), "1693347600.000100");
/// assert!(ts < Timestamp::parse("1693347600.000200").unwrap());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Parses a Slack `ts` string (`"seconds.fraction"` or `"seconds"`).
    ///
    /// Fractional digits beyond microseconds are truncated; missing digits
    /// are zero-padded. Returns `None` for anything non-numeric.
    pub fn parse(s: &str) -> Option<Self> {
        let (secs_part, frac_part) = match s.split_once('.') {
            Some((secs, frac)) => (secs, frac),
            None => (s, ""),
        };

        let secs: i64 = secs_part.parse().ok()?;

        let mut micros: i64 = 0;
        let mut seen = 0;
        for c in frac_part.chars() {
            if seen == 6 {
                break;
            }
            micros = micros * 10 + i64::from(c.to_digit(10)?);
            seen += 1;
        }
        for _ in seen..6 {
            micros *= 10;
        }

        Some(Self(secs * 1_000_000 + micros))
    }

    /// Creates a timestamp from whole seconds since the epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Creates a timestamp from whole microseconds since the epoch.
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Whole seconds since the epoch.
    pub fn secs(&self) -> i64 {
        self.0.div_euclid(1_000_000)
    }

    /// Microseconds within the current second.
    pub fn subsec_micros(&self) -> i64 {
        self.0.rem_euclid(1_000_000)
    }

    /// Formats this timestamp in local time, `YYYY-MM-DD HH:MM:SS`.
    ///
    /// Used for the header line prepended to every posted message.
    pub fn format_local(&self) -> String {
        format_epoch_secs(self.secs())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs(), self.subsec_micros())
    }
}

/// Formats whole epoch seconds in local time, `YYYY-MM-DD HH:MM:SS`.
///
/// Falls back to the raw number if the value is outside chrono's range.
pub fn format_epoch_secs(secs: i64) -> String {
    match chrono::DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => secs.to_string(),
    }
}

/// A rich-link preview extracted from one Slack attachment record.
///
/// Slack calls these "attachments"; Discord calls them embeds. Every field
/// is optional and carried over field-for-field. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Link {
    /// Link title
    pub title: Option<String>,
    /// Target URL of the title
    pub title_link: Option<String>,
    /// Description text
    pub text: Option<String>,
    /// Name of the service the link points at
    pub service_name: Option<String>,
    /// Icon URL of that service
    pub service_icon: Option<String>,
    /// Full-size image URL
    pub image_url: Option<String>,
    /// Thumbnail URL
    pub thumb_url: Option<String>,
}

/// A file attached to a Slack message.
///
/// `local_path` is filled in later by the downloader; `not_found` is set
/// if the remote side returned an explicit not-found response that the
/// operator chose to tolerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    /// Slack file id
    pub id: String,
    /// Display name for the upload
    pub name: String,
    /// Remote source URL (`url_private` in the export)
    pub url: String,
    /// Where the downloader stored the file locally
    pub local_path: Option<PathBuf>,
    /// The remote side said the file no longer exists
    pub not_found: bool,
}

impl AttachedFile {
    /// Creates a new attached file awaiting download.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            local_path: None,
            not_found: false,
        }
    }

    /// Returns `true` if this file was downloaded and can be uploaded.
    pub fn is_uploadable(&self) -> bool {
        self.local_path.is_some() && !self.not_found
    }
}

/// A single message transformed from a Slack export record.
///
/// `text` is the fully formatted content (timestamp/name header plus body).
/// Links and files keep their source order; both lists are appended to
/// during construction only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedMessage {
    /// Formatted message text, ready to post
    pub text: String,
    links: Vec<Link>,
    files: Vec<AttachedFile>,
}

impl ParsedMessage {
    /// Creates a message with the given formatted text and no links/files.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Appends a link preview. Source order is preserved.
    pub fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Appends an attached file. Source order is preserved.
    pub fn push_file(&mut self, file: AttachedFile) {
        self.files.push(file);
    }

    /// The link previews, in source order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The attached files, in source order.
    pub fn files(&self) -> &[AttachedFile] {
        &self.files
    }

    /// Mutable access to the attached files, for the downloader.
    pub fn files_mut(&mut self) -> &mut [AttachedFile] {
        &mut self.files
    }
}

/// Replies of one thread, keyed by each reply's own timestamp.
pub type ThreadMap = BTreeMap<Timestamp, ParsedMessage>;

/// A root message plus its optional thread.
///
/// `thread: None` is a standalone message. `Some` with an empty map is a
/// thread root still awaiting replies (or whose replies were lost from the
/// export). The distinction matters: only roots that declared replies get a
/// thread created on the Discord side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RootEntry {
    /// The root message
    pub message: ParsedMessage,
    /// Thread replies, if this root anchors a thread
    pub thread: Option<ThreadMap>,
}

impl RootEntry {
    /// A message with no thread.
    pub fn standalone(message: ParsedMessage) -> Self {
        Self {
            message,
            thread: None,
        }
    }

    /// A thread root with an (initially empty) reply map.
    pub fn thread_root(message: ParsedMessage) -> Self {
        Self {
            message,
            thread: Some(ThreadMap::new()),
        }
    }

    /// Returns `true` if this entry anchors a thread.
    pub fn is_thread_root(&self) -> bool {
        self.thread.is_some()
    }
}

/// All root entries of one destination channel, keyed by root timestamp.
pub type ChannelMessages = BTreeMap<Timestamp, RootEntry>;

/// Mapping from source Slack channel (or `None` in single-file mode) to
/// destination Discord channel name, in definition order.
pub type ChannelMap = Vec<(Option<String>, String)>;

/// The complete parsed export: destination channel name → messages.
///
/// Built once per run by the ingester; after the downloader fills in local
/// file paths it is read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExport {
    channels: BTreeMap<String, ChannelMessages>,
}

impl ParsedExport {
    /// Creates an empty export.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) one channel's messages.
    pub fn insert_channel(&mut self, dest_channel: impl Into<String>, messages: ChannelMessages) {
        self.channels.insert(dest_channel.into(), messages);
    }

    /// Iterates channels by destination name.
    pub fn channels(&self) -> impl Iterator<Item = (&String, &ChannelMessages)> {
        self.channels.iter()
    }

    /// Destination channel names.
    pub fn channel_names(&self) -> impl Iterator<Item = &String> {
        self.channels.keys()
    }

    /// Looks up one channel's messages.
    pub fn channel(&self, dest_channel: &str) -> Option<&ChannelMessages> {
        self.channels.get(dest_channel)
    }

    /// Number of destination channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if no channels were parsed.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Visits every attached file in the export mutably, roots first, then
    /// thread replies, so the downloader can fill in local paths.
    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut AttachedFile> {
        self.channels.values_mut().flat_map(|msgs| {
            msgs.values_mut().flat_map(|entry| {
                let root_files = entry.message.files.iter_mut();
                let thread_files = entry
                    .thread
                    .iter_mut()
                    .flat_map(|t| t.values_mut().flat_map(|m| m.files.iter_mut()));
                root_files.chain(thread_files)
            })
        })
    }

    /// Total count of attached files across all messages.
    pub fn file_count(&self) -> usize {
        self.channels
            .values()
            .flat_map(|msgs| msgs.values())
            .map(|entry| {
                entry.message.files.len()
                    + entry
                        .thread
                        .as_ref()
                        .map_or(0, |t| t.values().map(|m| m.files.len()).sum())
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_parse_and_display() {
        let ts = Timestamp::parse("1693347600.000100").unwrap();
        assert_eq!(ts.secs(), 1693347600);
        assert_eq!(ts.subsec_micros(), 100);
        assert_eq!(ts.to_string(), "1693347600.000100");
    }

    #[test]
    fn test_timestamp_parse_whole_seconds() {
        let ts = Timestamp::parse("1693347600").unwrap();
        assert_eq!(ts, Timestamp::from_secs(1693347600));
        assert_eq!(ts.to_string(), "1693347600.000000");
    }

    #[test]
    fn test_timestamp_parse_short_fraction_pads() {
        let ts = Timestamp::parse("100.5").unwrap();
        assert_eq!(ts.subsec_micros(), 500_000);
    }

    #[test]
    fn test_timestamp_parse_long_fraction_truncates() {
        let ts = Timestamp::parse("100.1234567").unwrap();
        assert_eq!(ts.subsec_micros(), 123_456);
    }

    #[test]
    fn test_timestamp_parse_rejects_garbage() {
        assert!(Timestamp::parse("").is_none());
        assert!(Timestamp::parse("abc").is_none());
        assert!(Timestamp::parse("12.3a").is_none());
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::parse("1000.000001").unwrap();
        let b = Timestamp::parse("1000.000002").unwrap();
        let c = Timestamp::parse("1001.000000").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_attached_file_uploadable() {
        let mut file = AttachedFile::new("F1", "pic.png", "https://example.com/pic.png");
        assert!(!file.is_uploadable());

        file.local_path = Some(PathBuf::from("/tmp/F1"));
        assert!(file.is_uploadable());

        file.not_found = true;
        assert!(!file.is_uploadable());
    }

    #[test]
    fn test_root_entry_kinds() {
        let standalone = RootEntry::standalone(ParsedMessage::new("hi"));
        assert!(!standalone.is_thread_root());

        let root = RootEntry::thread_root(ParsedMessage::new("root"));
        assert!(root.is_thread_root());
        assert!(root.thread.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_channel_messages_iterates_ascending() {
        let mut msgs = ChannelMessages::new();
        msgs.insert(
            Timestamp::from_secs(2000),
            RootEntry::standalone(ParsedMessage::new("second")),
        );
        msgs.insert(
            Timestamp::from_secs(1000),
            RootEntry::standalone(ParsedMessage::new("first")),
        );

        let order: Vec<i64> = msgs.keys().map(Timestamp::secs).collect();
        assert_eq!(order, vec![1000, 2000]);
    }

    #[test]
    fn test_export_files_mut_visits_roots_and_threads() {
        let mut root = ParsedMessage::new("root");
        root.push_file(AttachedFile::new("F1", "a", "u1"));

        let mut reply = ParsedMessage::new("reply");
        reply.push_file(AttachedFile::new("F2", "b", "u2"));

        let mut entry = RootEntry::thread_root(root);
        entry
            .thread
            .as_mut()
            .unwrap()
            .insert(Timestamp::from_secs(2001), reply);

        let mut msgs = ChannelMessages::new();
        msgs.insert(Timestamp::from_secs(2000), entry);

        let mut export = ParsedExport::new();
        export.insert_channel("general", msgs);

        assert_eq!(export.file_count(), 2);
        let ids: Vec<String> = export.files_mut().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec!["F1", "F2"]);
    }
}

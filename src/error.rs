//! Unified error types for slackport.
//!
//! This module provides a single [`SlackportError`] enum that covers all
//! error cases in the library.
//!
//! # Error Handling Philosophy
//!
//! - **Fatal** errors (bad configuration, unreadable export files, an
//!   unresolvable destination server) surface as variants here and abort
//!   the run.
//! - **Recoverable** per-record problems (a message missing a timestamp,
//!   a tombstoned file) never become errors; they are logged at the call
//!   site and the record is skipped.
//! - **Transient** remote failures are not represented here at all; they
//!   stay inside the retry loop in [`crate::discord::retry`] until they
//!   succeed or the operator cancels.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::discord::gateway::GatewayError;

/// A specialized [`Result`] type for slackport operations.
pub type Result<T> = std::result::Result<T, SlackportError>;

/// The error type for all slackport operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SlackportError {
    /// An I/O error occurred reading the export or writing downloads.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A Slack export file could not be parsed as JSON.
    ///
    /// This is fatal for the whole run: a malformed day file means the
    /// export itself is damaged, and a partial import would silently drop
    /// history.
    #[error("Failed to parse Slack export{}: {source}", .path.as_ref().map(|p| format!(" (file: {})", p.display())).unwrap_or_default())]
    Export {
        /// The underlying JSON parse error
        #[source]
        source: serde_json::Error,
        /// The file path, if available
        path: Option<PathBuf>,
    },

    /// The supplied configuration is not usable.
    ///
    /// Covers conflicting source-selection modes, bad channel-mapping
    /// file entries, and an unresolved or ambiguous destination server.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// A destination channel name does not satisfy Discord's rules.
    ///
    /// Names must be 1-100 characters of lowercase letters, digits,
    /// hyphen, or underscore, with no two consecutive hyphens.
    #[error("Invalid Discord channel name '{name}': {reason}")]
    InvalidChannelName {
        /// The offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// A gateway call failed outside the retried posting path.
    #[error("Discord gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// An HTTP transport error while downloading attached files.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A file attached to a Slack message could not be downloaded.
    #[error("Failed to download {url}: HTTP status {status}")]
    Download {
        /// The remote URL
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// The operator cancelled the run during a retry wait.
    #[error("Cancelled by operator")]
    Cancelled,
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl SlackportError {
    /// Creates an export parse error.
    pub fn export_parse(source: serde_json::Error, path: Option<PathBuf>) -> Self {
        SlackportError::Export { source, path }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SlackportError::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid channel name error.
    pub fn invalid_channel_name(name: impl Into<String>, reason: &'static str) -> Self {
        SlackportError::InvalidChannelName {
            name: name.into(),
            reason,
        }
    }

    /// Creates a download failure error.
    pub fn download(url: impl Into<String>, status: u16) -> Self {
        SlackportError::Download {
            url: url.into(),
            status,
        }
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, SlackportError::Config { .. })
    }

    /// Returns `true` if this is an export parse error.
    pub fn is_export(&self) -> bool {
        matches!(self, SlackportError::Export { .. })
    }

    /// Returns `true` if the operator cancelled the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SlackportError::Cancelled)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = SlackportError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_export_error_with_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err =
            SlackportError::export_parse(json_err, Some(PathBuf::from("/export/2023-01-01.json")));
        let display = err.to_string();
        assert!(display.contains("Slack export"));
        assert!(display.contains("/export/2023-01-01.json"));
    }

    #[test]
    fn test_export_error_without_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = SlackportError::export_parse(json_err, None);
        assert!(!err.to_string().contains("file:"));
    }

    #[test]
    fn test_config_error_display() {
        let err = SlackportError::config("--dest-channel is required with --src-file");
        assert!(err.is_config());
        assert!(err.to_string().contains("--dest-channel"));
    }

    #[test]
    fn test_invalid_channel_name_display() {
        let err = SlackportError::invalid_channel_name("foo--bar", "contains consecutive hyphens");
        let display = err.to_string();
        assert!(display.contains("foo--bar"));
        assert!(display.contains("consecutive hyphens"));
    }

    #[test]
    fn test_download_error_display() {
        let err = SlackportError::download("https://files.example.com/F123", 403);
        let display = err.to_string();
        assert!(display.contains("F123"));
        assert!(display.contains("403"));
    }

    #[test]
    fn test_is_methods() {
        assert!(SlackportError::Cancelled.is_cancelled());
        assert!(!SlackportError::Cancelled.is_config());
        assert!(!SlackportError::config("x").is_export());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = SlackportError::from(io_err);
        assert!(err.source().is_some());
    }
}

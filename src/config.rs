//! Validated run configuration.
//!
//! [`ImportConfig::from_args`] turns raw CLI [`Args`] into a checked
//! configuration: exactly one source mode, only the companion flags that
//! mode allows, and a resolved credential. Everything downstream treats
//! the result as already validated.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cli::Args;
use crate::error::{Result, SlackportError};

/// Fallback credential file, read from the working directory.
const TOKEN_DOT_FILE: &str = ".discord_token";

/// Which part of a Slack export to import.
///
/// The three modes are mutually exclusive and validated upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// One day file of one channel; the destination channel is required.
    File {
        /// The day file
        file: PathBuf,
        /// Destination Discord channel
        dest_channel: String,
    },
    /// One channel directory; the destination defaults to its basename.
    Dir {
        /// The channel directory
        dir: PathBuf,
        /// Destination Discord channel override
        dest_channel: Option<String>,
    },
    /// The whole export tree, optionally filtered by a channel file.
    DirTree {
        /// Top level of the unzipped export
        root: PathBuf,
        /// Optional `source [destination]` mapping file
        channel_file: Option<PathBuf>,
    },
}

/// A fully validated run configuration.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// What to import
    pub source: Source,
    /// Discord bot token
    pub token: String,
    /// Destination server name filter
    pub server_name: Option<String>,
    /// Create missing destination channels
    pub create_channels: bool,
    /// users.json override
    pub users_file: Option<PathBuf>,
    /// Downloads directory override
    pub downloads_dir: Option<PathBuf>,
    /// Tolerate not-found responses for attached files
    pub ignore_file_not_found: bool,
    /// Verbose logging
    pub verbose: bool,
    /// Log instead of calling Discord
    pub dry_run: bool,
}

impl ImportConfig {
    /// Validates raw CLI arguments into a usable configuration.
    pub fn from_args(args: Args) -> Result<Self> {
        let source = resolve_source(&args)?;
        let token = resolve_token(args.token, Path::new(TOKEN_DOT_FILE))?;

        debug!(?source, "source mode resolved");
        Ok(Self {
            source,
            token,
            server_name: args.server,
            create_channels: args.create,
            users_file: args.users_file,
            downloads_dir: args.downloads_dir,
            ignore_file_not_found: args.ignore_file_not_found,
            verbose: args.verbose,
            dry_run: args.dry_run,
        })
    }
}

/// Checks source mode exclusivity and per-mode companion flags.
fn resolve_source(args: &Args) -> Result<Source> {
    let one_file = args.src_file.is_some();
    let one_channel = args.src_dir.is_some();
    let multi_channels = args.src_dirtree.is_some();

    let ways = usize::from(one_file) + usize::from(one_channel) + usize::from(multi_channels);
    if ways > 1 {
        return Err(SlackportError::config(
            "--src-file (one file), --src-dir (one channel), and --src-dirtree (multiple \
             channels) are all mutually exclusive",
        ));
    }
    if ways == 0 {
        return Err(SlackportError::config(
            "one (and only one) of --src-file (one file), --src-dir (one channel), or \
             --src-dirtree (multiple channels) is required",
        ));
    }

    if args.channel_file.is_some() && !multi_channels {
        return Err(SlackportError::config(
            "--channel-file is only allowed with --src-dirtree (multiple channels)",
        ));
    }

    if multi_channels && args.dest_channel.is_some() {
        return Err(SlackportError::config(
            "--dest-channel is not allowed with --src-dirtree (multiple channels); it is only \
             allowed with --src-file or --src-dir",
        ));
    }

    if let Some(file) = &args.src_file {
        let Some(dest_channel) = args.dest_channel.clone() else {
            return Err(SlackportError::config(
                "--dest-channel is required with --src-file (one file)",
            ));
        };
        return Ok(Source::File {
            file: file.clone(),
            dest_channel,
        });
    }

    if let Some(dir) = &args.src_dir {
        return Ok(Source::Dir {
            dir: dir.clone(),
            dest_channel: args.dest_channel.clone(),
        });
    }

    let root = args.src_dirtree.clone().expect("one mode is set");
    Ok(Source::DirTree {
        root,
        channel_file: args.channel_file.clone(),
    })
}

/// Resolves the Discord token: CLI flag (or DISCORD_TOKEN env var, which
/// clap folds into it), then the dot file.
fn resolve_token(token: Option<String>, dot_file: &Path) -> Result<String> {
    if let Some(token) = token {
        return Ok(token);
    }

    if dot_file.is_file() {
        let token = fs::read_to_string(dot_file)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    Err(SlackportError::config(
        "Discord token is required via either (in order) the --token command line arg, the \
         DISCORD_TOKEN env var, or a .discord_token file in the working directory",
    ))
}

// ============================================================================
// Tests
// ============================================================================

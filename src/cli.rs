//! Command-line interface definition using clap.
//!
//! Raw arguments only; the mode exclusivity rules (one of `--src-file`,
//! `--src-dir`, `--src-dirtree`, plus which companions each allows) are
//! validated in [`crate::config`], which turns [`Args`] into a checked
//! [`ImportConfig`](crate::config::ImportConfig).

use std::path::PathBuf;

use clap::Parser;

/// Parse data exported from Slack and import it into Discord.
#[derive(Parser, Debug, Clone)]
#[command(name = "slackport")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    slackport --src-file general/2023-08-29.json --dest-channel general
    slackport --src-dir export/general
    slackport --src-dirtree export --channel-file channels.txt --create
    slackport --src-dirtree export --dry-run

src and dest related options follow one of three mutually exclusive forms:

    --src-file FILE --dest-channel CHANNEL   one day of one channel
    --src-dir DIR [--dest-channel CHANNEL]   all days of one channel
    --src-dirtree DIR [--channel-file FILE]  all days of many channels

Channel names should not include the leading pound sign (#).")]
pub struct Args {
    /// Discord bot token. Obtain from the Discord developer portal when
    /// setting up your application. Falls back to the DISCORD_TOKEN env
    /// var, then a .discord_token file in the working directory.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Name of the Discord server. Only needed if the bot is a member of
    /// more than one server.
    #[arg(long, value_name = "SERVER")]
    pub server: Option<String>,

    /// Create any destination Discord text channel that does not exist.
    /// Default behavior is to fail if a destination channel is missing.
    #[arg(long)]
    pub create: bool,

    /// Single source file for import from Slack (one day of one channel)
    #[arg(long, value_name = "FILE")]
    pub src_file: Option<PathBuf>,

    /// Destination Discord channel (single-channel modes only)
    #[arg(long, value_name = "CHANNEL")]
    pub dest_channel: Option<String>,

    /// Directory of source files for import from Slack (all days of one
    /// channel)
    #[arg(long, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,

    /// Directory tree of source directories for import from Slack (all
    /// channels). This is the top level of the unzipped Slack export.
    #[arg(long, value_name = "DIR")]
    pub src_dirtree: Option<PathBuf>,

    /// File listing the Slack channels to port to Discord, with optional
    /// renames (`source [destination]` per line)
    #[arg(long, value_name = "FILE")]
    pub channel_file: Option<PathBuf>,

    /// JSON file with Slack user name information. Defaults to users.json
    /// at the top level of the export; if missing, names are taken from
    /// individual messages.
    #[arg(long, value_name = "FILE")]
    pub users_file: Option<PathBuf>,

    /// Directory for downloading files attached to Slack messages before
    /// uploading them to Discord. Defaults to a fresh downloads/<timestamp>
    /// directory; reuse a previous run's directory to resume.
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Ignore not-found errors when downloading attached files, logging a
    /// warning instead of failing. Files deleted from Slack after the
    /// export was taken produce these.
    #[arg(long)]
    pub ignore_file_not_found: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Don't change any state in Discord. Dry run is only relative to
    /// Discord: the export is still parsed and files are still downloaded.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_parse_minimal_dirtree() {
        let args = Args::parse_from(["slackport", "--src-dirtree", "export"]);
        assert_eq!(args.src_dirtree, Some(PathBuf::from("export")));
        assert!(args.src_file.is_none());
        assert!(!args.dry_run);
    }

    #[test]
    fn test_args_parse_full_single_file() {
        let args = Args::parse_from([
            "slackport",
            "--token",
            "sekrit",
            "--src-file",
            "general/2023-08-29.json",
            "--dest-channel",
            "general",
            "--dry-run",
            "--verbose",
        ]);
        assert_eq!(args.token.as_deref(), Some("sekrit"));
        assert_eq!(args.dest_channel.as_deref(), Some("general"));
        assert!(args.dry_run);
        assert!(args.verbose);
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Args::command().debug_assert();
    }
}

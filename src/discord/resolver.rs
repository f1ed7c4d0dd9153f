//! Destination server and channel resolution.
//!
//! Before any message is posted, the resolver picks the one destination
//! guild (optionally filtered by name; membership in exactly one guild is
//! required otherwise), validates every destination channel name, and
//! builds a one-shot name → handle map, creating missing channels when
//! enabled. The map is read-only afterward.
//!
//! These calls are deliberately not wrapped by the retry policy: they are
//! setup, not the repeated posting path, and failing fast here surfaces a
//! misconfiguration before anything is posted.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use super::gateway::{ChannelHandle, DiscordGateway};
use crate::error::{Result, SlackportError};

// Discord channel names: lowercase letters, digits, hyphen, underscore.
static CHANNEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A[a-z0-9_-]+\z").expect("channel name regex"));

/// Maximum length of a Discord channel name.
const MAX_CHANNEL_NAME_LEN: usize = 100;

/// Validates a destination channel name against Discord's rules.
///
/// Accepts 1-100 characters of lowercase letters, digits, hyphen, and
/// underscore, with no two consecutive hyphens. Runs before any remote
/// call so a bad mapping fails the run early.
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SlackportError::invalid_channel_name(name, "name is empty"));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(SlackportError::invalid_channel_name(
            name,
            "name is longer than 100 characters",
        ));
    }
    if !CHANNEL_NAME_RE.is_match(name) {
        return Err(SlackportError::invalid_channel_name(
            name,
            "only lowercase letters, digits, hyphen, and underscore are allowed",
        ));
    }
    if name.contains("--") {
        return Err(SlackportError::invalid_channel_name(
            name,
            "contains consecutive hyphens",
        ));
    }
    Ok(())
}

/// The read-only name → handle map produced by resolution.
///
/// A `None` handle means the channel was "created" during a dry run and
/// has no server-side identity; the posting path must tolerate that.
#[derive(Debug, Default)]
pub struct ResolvedChannels {
    channels: HashMap<String, Option<ChannelHandle>>,
}

impl ResolvedChannels {
    /// Looks up the handle for a destination channel name.
    pub fn get(&self, name: &str) -> Option<&ChannelHandle> {
        self.channels.get(name).and_then(Option::as_ref)
    }

    /// Returns `true` if the name was resolved (even to a dry-run hole).
    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of resolved names.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Resolves destination channel names to live channel handles.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    server_name: Option<String>,
    create_channels: bool,
    dry_run: bool,
}

impl ChannelResolver {
    /// Creates a resolver.
    ///
    /// `server_name` disambiguates when the bot belongs to several guilds;
    /// `create_channels` permits creating missing destination channels;
    /// `dry_run` logs instead of creating.
    pub fn new(server_name: Option<String>, create_channels: bool, dry_run: bool) -> Self {
        Self {
            server_name,
            create_channels,
            dry_run,
        }
    }

    /// Resolves every destination channel name to a handle.
    ///
    /// Fatal errors: no unique guild, an invalid channel name, or a
    /// missing channel with creation disabled.
    pub async fn resolve<'a>(
        &self,
        gateway: &dyn DiscordGateway,
        channel_names: impl Iterator<Item = &'a String>,
    ) -> Result<ResolvedChannels> {
        let names: Vec<&String> = channel_names.collect();
        info!(count = names.len(), "checking that all Discord channels to post to exist");

        for name in &names {
            validate_channel_name(name)?;
        }

        let guild = self.resolve_guild(gateway).await?;

        // limit the search to text channels; the import doesn't support voice
        let existing = gateway.text_channels(&guild.id).await?;
        info!(
            guild = %guild.name,
            channels = existing.len(),
            "text channels listed on Discord server"
        );

        let mut resolved = ResolvedChannels::default();
        for name in names {
            let handle = self.resolve_channel(gateway, &guild.id, name, &existing).await?;
            resolved.channels.insert(name.clone(), handle);
        }

        info!(count = resolved.len(), "successfully got all Discord channels to post to");
        Ok(resolved)
    }

    async fn resolve_guild(
        &self,
        gateway: &dyn DiscordGateway,
    ) -> Result<super::gateway::Guild> {
        let all = gateway.guilds().await?;

        let matches: Vec<_> = match &self.server_name {
            Some(server_name) => all.into_iter().filter(|g| &g.name == server_name).collect(),
            None => all,
        };

        let qualifier = self
            .server_name
            .as_ref()
            .map(|n| format!(" with name {n}"))
            .unwrap_or_default();

        match matches.len() {
            0 => Err(SlackportError::config(format!(
                "unable to find Discord server{qualifier}"
            ))),
            1 => {
                let guild = matches.into_iter().next().unwrap();
                info!(guild = %guild.name, id = %guild.id, "successfully got Discord server");
                Ok(guild)
            }
            _ => Err(SlackportError::config(format!(
                "unable to find unique Discord server{qualifier}: {:?}",
                matches.iter().map(|g| g.name.as_str()).collect::<Vec<_>>()
            ))),
        }
    }

    async fn resolve_channel(
        &self,
        gateway: &dyn DiscordGateway,
        guild_id: &str,
        name: &str,
        existing: &[ChannelHandle],
    ) -> Result<Option<ChannelHandle>> {
        let matches: Vec<&ChannelHandle> = existing.iter().filter(|c| c.name == name).collect();

        match matches.len() {
            0 => {
                if !self.create_channels {
                    return Err(SlackportError::config(format!(
                        "unable to find Discord channel {name}, use --create to auto create"
                    )));
                }
                info!(channel = %name, "creating missing Discord channel");
                if self.dry_run {
                    info!(channel = %name, "DRY RUN: create_text_channel");
                    return Ok(None);
                }
                let created = gateway.create_text_channel(guild_id, name).await?;
                Ok(Some(created))
            }
            1 => {
                let channel = matches[0];
                info!(channel = %channel.name, id = %channel.id, "successfully got Discord channel");
                Ok(Some(channel.clone()))
            }
            _ => {
                // unlikely; Discord does not stop same-name channels though
                warn!(
                    channel = %name,
                    count = matches.len(),
                    "found multiple Discord channels with the same name, arbitrarily picking the first"
                );
                Ok(Some(matches[0].clone()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

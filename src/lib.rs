//! # slackport
//!
//! A Rust library and CLI for importing Slack workspace exports into
//! Discord, preserving channel identity, message order, thread structure,
//! rich-link previews, and file attachments.
//!
//! ## Overview
//!
//! A Slack export is a directory tree: one subdirectory per channel, one
//! JSON file per calendar day. slackport reconstructs that flat record
//! stream into an ordered, threaded model and posts it to Discord,
//! strictly sequentially, retrying transient remote failures forever with
//! backoff and rate-limit awareness.
//!
//! The import runs in three phases:
//!
//! 1. **Ingest** — [`ingest::ExportIngester`] walks the export, maps
//!    source channels to destination names, and builds a read-only
//!    [`model::ParsedExport`] via [`transform::MessageTransformer`].
//! 2. **Download** — [`download::FileFetcher`] fetches attached files to
//!    local disk so they can be re-uploaded.
//! 3. **Deliver** — [`discord::DeliveryPipeline`] resolves destination
//!    channels with [`discord::ChannelResolver`] and posts everything in
//!    source chronological order through a [`discord::DiscordGateway`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use slackport::config::Source;
//! use slackport::discord::{ChannelResolver, DeliveryPipeline, RestGateway, RetryPolicy};
//! use slackport::ingest::ExportIngester;
//! use slackport::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<()> {
//! let ingester = ExportIngester::new(
//!     Source::DirTree {
//!         root: "export".into(),
//!         channel_file: None,
//!     },
//!     None,
//! );
//! let export = ingester.ingest()?;
//!
//! let gateway = Arc::new(RestGateway::new("bot-token")?);
//! let resolver = ChannelResolver::new(None, false, false);
//! let retry = RetryPolicy::new(CancellationToken::new());
//! let mut pipeline = DeliveryPipeline::new(gateway, resolver, retry, false);
//! let report = pipeline.run(Arc::new(export)).await?;
//! println!("posted {} messages", report.messages_posted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - [`model`] — the canonical data model ([`model::ParsedExport`],
//!   [`model::RootEntry`], [`model::Timestamp`])
//! - [`transform`] — per-record text/name/link/file transformation
//! - [`ingest`] — export walking and thread reconstruction
//! - [`discord`] — channel resolution, retry policy, delivery pipeline,
//!   and the REST gateway
//! - [`download`] — attached-file downloading
//! - [`cli`], [`config`] — CLI arguments and validated configuration
//! - [`error`] — unified error types ([`SlackportError`], [`Result`])

pub mod cli;
pub mod config;
pub mod discord;
pub mod download;
pub mod error;
pub mod ingest;
pub mod model;
pub mod transform;

// Re-export the main types at the crate root for convenience
pub use error::{Result, SlackportError};
pub use model::ParsedExport;

/// Convenient re-exports for common usage.
///
/// ```rust
/// use slackport::prelude::*;
/// ```
pub mod prelude {
    // Error types
    pub use crate::error::{Result, SlackportError};

    // The canonical model
    pub use crate::model::{
        AttachedFile, ChannelMessages, Link, ParsedExport, ParsedMessage, RootEntry, ThreadMap,
        Timestamp,
    };

    // Ingestion
    pub use crate::ingest::ExportIngester;
    pub use crate::transform::{MessageTransformer, UserDirectory};

    // Delivery
    pub use crate::discord::{
        ChannelResolver, DeliveryPipeline, DeliveryReport, DiscordGateway, PipelineState,
        RestGateway, RetryPolicy,
    };

    // Downloading
    pub use crate::download::FileFetcher;

    // Configuration
    pub use crate::config::{ImportConfig, Source};
}

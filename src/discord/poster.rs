//! The sequential delivery pipeline.
//!
//! One connection session, one background posting task, no concurrency in
//! the posting path: channels, roots, and replies go out strictly in
//! order, so what Discord shows matches source chronology without any
//! locking.
//!
//! Lifecycle: `Disconnected → Connecting → Ready → PostingChannels →
//! Closed`. `Ready` fires once after the credential is validated and
//! spawns the posting task. Every exit path, success or failure, ends in
//! `Closed`; an error caught inside the posting loop is logged and only
//! reflected in the returned [`DeliveryReport`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::gateway::{
    DiscordGateway, FileUpload, MessagePayload, SentMessage, ThreadHandle,
};
use super::resolver::ChannelResolver;
use super::retry::RetryPolicy;
use crate::error::Result;
use crate::model::{ChannelMessages, ParsedExport, ParsedMessage};

/// Lifecycle of one delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not yet connected
    Disconnected,
    /// Validating the credential
    Connecting,
    /// Credential accepted; posting task spawned
    Ready,
    /// Walking the parsed export
    PostingChannels,
    /// Finished, successfully or not
    Closed,
}

/// What one delivery run did.
///
/// There is deliberately no hard success/failure contract beyond
/// `failed`: an error inside the posting loop is logged and the run still
/// closes cleanly. Counts include dry-run would-be actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages posted (roots and replies)
    pub messages_posted: usize,
    /// Threads created
    pub threads_created: usize,
    /// Files attached to sent messages
    pub files_attached: usize,
    /// An error or cancellation interrupted the posting loop
    pub failed: bool,
}

/// Posts a [`ParsedExport`] to Discord, in order, with unbounded retry.
pub struct DeliveryPipeline {
    gateway: Arc<dyn DiscordGateway>,
    resolver: ChannelResolver,
    retry: RetryPolicy,
    dry_run: bool,
    state: PipelineState,
}

impl DeliveryPipeline {
    /// Creates a pipeline over the given gateway.
    pub fn new(
        gateway: Arc<dyn DiscordGateway>,
        resolver: ChannelResolver,
        retry: RetryPolicy,
        dry_run: bool,
    ) -> Self {
        Self {
            gateway,
            resolver,
            retry,
            dry_run,
            state: PipelineState::Disconnected,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the whole delivery: connect, resolve channels, post everything.
    ///
    /// Returns an error only for connection failures; anything that goes
    /// wrong after `Ready` is caught, logged, and reported via
    /// [`DeliveryReport::failed`]. The pipeline reaches
    /// [`PipelineState::Closed`] on every exit path.
    pub async fn run(&mut self, export: Arc<ParsedExport>) -> Result<DeliveryReport> {
        self.state = PipelineState::Connecting;
        info!("connecting to Discord");

        let identity = match self.gateway.identify().await {
            Ok(identity) => identity,
            Err(e) => {
                self.state = PipelineState::Closed;
                return Err(e.into());
            }
        };

        self.state = PipelineState::Ready;
        info!(user = %identity.username, id = %identity.id, "logged in, ready to post");

        let task = tokio::spawn(post_all(
            Arc::clone(&self.gateway),
            self.resolver.clone(),
            self.retry.clone(),
            Arc::clone(&export),
            self.dry_run,
        ));
        self.state = PipelineState::PostingChannels;

        let report = match task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "posting task did not complete");
                DeliveryReport {
                    failed: true,
                    ..DeliveryReport::default()
                }
            }
        };

        self.state = PipelineState::Closed;
        info!("pipeline closed");
        Ok(report)
    }
}

/// The single background posting task.
///
/// Resolves channels, then walks the export. Errors are caught here so
/// the pipeline always shuts down.
async fn post_all(
    gateway: Arc<dyn DiscordGateway>,
    resolver: ChannelResolver,
    retry: RetryPolicy,
    export: Arc<ParsedExport>,
    dry_run: bool,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    match post_all_inner(&gateway, &resolver, &retry, &export, dry_run, &mut report).await {
        Ok(()) => {
            info!("done posting messages to all Discord channels");
        }
        Err(e) if e.is_cancelled() => {
            report.failed = true;
            warn!("posting cancelled by operator");
        }
        Err(e) => {
            report.failed = true;
            error!(error = %e, "caught error posting messages");
        }
    }

    report
}

async fn post_all_inner(
    gateway: &Arc<dyn DiscordGateway>,
    resolver: &ChannelResolver,
    retry: &RetryPolicy,
    export: &ParsedExport,
    dry_run: bool,
    report: &mut DeliveryReport,
) -> Result<()> {
    let resolved = resolver.resolve(gateway.as_ref(), export.channel_names()).await?;

    for (channel_name, messages) in export.channels() {
        info!(channel = %channel_name, "begin posting messages to Discord channel");
        let channel_id = resolved.get(channel_name).map(|h| h.id.clone());
        post_channel(gateway, retry, dry_run, channel_id.as_deref(), messages, report).await?;
        info!(channel = %channel_name, "done posting messages to Discord channel");
    }

    Ok(())
}

/// Posts one channel's roots and threads, ascending by timestamp.
async fn post_channel(
    gateway: &Arc<dyn DiscordGateway>,
    retry: &RetryPolicy,
    dry_run: bool,
    channel_id: Option<&str>,
    messages: &ChannelMessages,
    report: &mut DeliveryReport,
) -> Result<()> {
    for (timestamp, entry) in messages {
        let payload = MessagePayload::from_message(&entry.message);
        let sent = send_message(
            gateway,
            retry,
            dry_run,
            channel_id,
            &payload,
            "sending message to channel",
        )
        .await?;
        report.messages_posted += 1;
        info!(timestamp = %timestamp, "message posted");

        attach_message_files(gateway, retry, dry_run, sent.as_ref(), &entry.message, report)
            .await?;

        // a root whose replies are all missing from the export gets no
        // Discord thread; there would be nothing to put in it
        let Some(thread) = entry.thread.as_ref().filter(|t| !t.is_empty()) else {
            continue;
        };

        let thread_name = format!("thread{timestamp}");
        let created =
            create_thread(gateway, retry, dry_run, sent.as_ref(), &thread_name).await?;
        report.threads_created += 1;

        for (reply_timestamp, reply) in thread {
            let reply_payload = MessagePayload::from_message(reply);
            let sent_reply = send_message(
                gateway,
                retry,
                dry_run,
                created.as_ref().map(|t| t.id.as_str()),
                &reply_payload,
                "sending message to thread",
            )
            .await?;
            report.messages_posted += 1;
            info!(timestamp = %reply_timestamp, "message in thread posted");

            attach_message_files(gateway, retry, dry_run, sent_reply.as_ref(), reply, report)
                .await?;
        }
    }

    Ok(())
}

/// Sends one message with retry. Returns `None` in dry-run mode or when no
/// destination id exists (a dry-run-created channel or thread).
async fn send_message(
    gateway: &Arc<dyn DiscordGateway>,
    retry: &RetryPolicy,
    dry_run: bool,
    channel_id: Option<&str>,
    payload: &MessagePayload,
    desc: &'static str,
) -> Result<Option<SentMessage>> {
    if dry_run {
        info!(content_len = payload.content.len(), embeds = payload.embeds.len(), "DRY RUN: {desc}");
        return Ok(None);
    }

    let Some(channel_id) = channel_id else {
        warn!("no destination id available for send, skipping");
        return Ok(None);
    };

    let sent = retry
        .run(desc, || gateway.send_message(channel_id, payload))
        .await?;
    Ok(Some(sent))
}

/// Creates a thread at a sent root with retry. Returns `None` in dry-run
/// mode or when the root was never really sent.
async fn create_thread(
    gateway: &Arc<dyn DiscordGateway>,
    retry: &RetryPolicy,
    dry_run: bool,
    root: Option<&SentMessage>,
    name: &str,
) -> Result<Option<ThreadHandle>> {
    if dry_run {
        info!(thread = %name, "DRY RUN: creating thread");
        return Ok(None);
    }

    let Some(root) = root else {
        warn!(thread = %name, "no sent root message to anchor thread, skipping");
        return Ok(None);
    };

    let created = retry
        .run("creating thread", || gateway.create_thread(root, name))
        .await?;
    Ok(Some(created))
}

/// Attaches a message's files to it, excluding files the downloader marked
/// not found. Skips the call entirely when nothing is uploadable.
async fn attach_message_files(
    gateway: &Arc<dyn DiscordGateway>,
    retry: &RetryPolicy,
    dry_run: bool,
    sent: Option<&SentMessage>,
    message: &ParsedMessage,
    report: &mut DeliveryReport,
) -> Result<()> {
    if message.files().is_empty() {
        return Ok(());
    }

    let uploads = uploads_for(message);
    if uploads.is_empty() {
        debug!("no uploadable files for message, skipping attach call");
        return Ok(());
    }

    if dry_run {
        info!(count = uploads.len(), "DRY RUN: adding files to message");
        report.files_attached += uploads.len();
        return Ok(());
    }

    let Some(sent) = sent else {
        warn!("no sent message to attach files to, skipping");
        return Ok(());
    };

    retry
        .run("adding files to message", || {
            gateway.attach_files(sent, &uploads)
        })
        .await?;
    report.files_attached += uploads.len();
    info!(count = uploads.len(), "files added to message");

    Ok(())
}

/// Builds the upload list for a message: downloaded files only.
fn uploads_for(message: &ParsedMessage) -> Vec<FileUpload> {
    message
        .files()
        .iter()
        .filter_map(|file| {
            if file.not_found {
                debug!(file = %file.name, "excluding file the downloader marked not found");
                return None;
            }
            match &file.local_path {
                Some(path) => Some(FileUpload {
                    path: path.clone(),
                    filename: file.name.clone(),
                }),
                None => {
                    warn!(file = %file.name, "file was never downloaded, excluding from upload");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttachedFile;
    use std::path::PathBuf;

    #[test]
    fn test_uploads_for_excludes_not_found_and_missing() {
        let mut message = ParsedMessage::new("files");

        let mut downloaded = AttachedFile::new("F1", "ok.png", "u1");
        downloaded.local_path = Some(PathBuf::from("/tmp/F1"));
        message.push_file(downloaded);

        let mut missing = AttachedFile::new("F2", "gone.png", "u2");
        missing.local_path = Some(PathBuf::from("/tmp/F2"));
        missing.not_found = true;
        message.push_file(missing);

        message.push_file(AttachedFile::new("F3", "never.png", "u3"));

        let uploads = uploads_for(&message);
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, "ok.png");
        assert_eq!(uploads[0].path, PathBuf::from("/tmp/F1"));
    }

    #[test]
    fn test_report_default_is_clean() {
        let report = DeliveryReport::default();
        assert_eq!(report.messages_posted, 0);
        assert!(!report.failed);
    }
}

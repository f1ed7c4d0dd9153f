//! Downloads files attached to Slack messages.
//!
//! Slack's `url_private` links die with the workspace, so every attached
//! file is fetched into a local downloads directory before delivery
//! begins; the attach-files calls need a readable local path. Downloads
//! are sequential and resumable: a local file whose size matches the
//! remote `Content-Length` is not fetched again.
//!
//! A not-found response can be tolerated (the file is flagged and later
//! excluded from uploads) — files deleted from Slack after the export was
//! taken produce exactly this. Any other HTTP failure is an error.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::{Client, StatusCode};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SlackportError};
use crate::model::ParsedExport;

/// Fetches attached files ahead of delivery.
#[derive(Debug)]
pub struct FileFetcher {
    http: Client,
    downloads_dir: PathBuf,
    ignore_not_found: bool,
}

impl FileFetcher {
    /// Creates a fetcher writing into `downloads_dir`.
    ///
    /// Without an explicit directory a fresh `downloads/<unix-secs>` is
    /// used, so repeated runs don't mix their files. The directory is
    /// only created once there is something to download.
    pub fn new(downloads_dir: Option<PathBuf>, ignore_not_found: bool) -> Result<Self> {
        let downloads_dir = match downloads_dir {
            Some(dir) => dir,
            None => {
                // second-level accuracy; two runs within the same second
                // are not a realistic case
                let stamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                PathBuf::from("downloads").join(stamp.to_string())
            }
        };

        if downloads_dir.exists() && !downloads_dir.is_dir() {
            return Err(SlackportError::config(format!(
                "downloads dir already exists but is not a directory: {}",
                downloads_dir.display()
            )));
        }

        info!(
            dir = %downloads_dir.display(),
            "downloaded files from Slack (if any) will be placed here"
        );

        Ok(Self {
            http: Client::new(),
            downloads_dir,
            ignore_not_found,
        })
    }

    /// The directory downloads land in.
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Downloads every attached file in the export, filling in local
    /// paths (and not-found flags) on the [`ParsedExport`] in place.
    ///
    /// Must complete before the delivery pipeline starts.
    pub async fn fetch_all(&self, export: &mut ParsedExport) -> Result<()> {
        let total = export.file_count();
        if total == 0 {
            info!("there are no files to download");
            return Ok(());
        }

        info!(
            count = total,
            dir = %self.downloads_dir.display(),
            "downloading files attached to Slack messages"
        );
        fs::create_dir_all(&self.downloads_dir).await?;

        let mut success = 0usize;
        let mut not_found = 0usize;
        let mut skipped = 0usize;

        for file in export.files_mut() {
            // name the local file by id, not display name, to dodge
            // filename collisions across messages
            let local = self.downloads_dir.join(&file.id);
            file.local_path = Some(local.clone());

            if local.is_file() {
                let local_size = fs::metadata(&local).await.map(|m| m.len()).ok();
                let remote_size = self.remote_size(&file.url).await;
                if let (Some(local_size), Some(remote_size)) = (local_size, remote_size) {
                    if local_size == remote_size {
                        debug!(
                            url = %file.url,
                            size = local_size,
                            path = %local.display(),
                            "skipping download covered by existing local file"
                        );
                        skipped += 1;
                        continue;
                    }
                }
            }

            if self.fetch_one(&file.url, &local).await? {
                success += 1;
            } else {
                file.not_found = true;
                not_found += 1;
            }
        }

        info!(count = success, dir = %self.downloads_dir.display(), "files downloaded");
        info!(count = skipped, "files skipped that already existed locally");
        if not_found > 0 {
            warn!(count = not_found, "files not found were ignored");
        }
        Ok(())
    }

    /// Size of a remote file via a `Content-Length` HEAD probe, if the
    /// server will say.
    async fn remote_size(&self, url: &str) -> Option<u64> {
        let response = self.http.head(url).send().await.ok()?;
        if !response.status().is_success() {
            warn!(url = %url, "unable to get size of remote URL (HTTP response not OK)");
            return None;
        }
        let size = response.content_length();
        if size.is_none() {
            warn!(url = %url, "unable to get size of remote URL (missing Content-Length)");
        }
        size
    }

    /// Fetches one URL into a local file.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` for a tolerated
    /// not-found; every other HTTP problem is an error.
    async fn fetch_one(&self, url: &str, filename: &Path) -> Result<bool> {
        debug!(url = %url, file = %filename.display(), "downloading");
        if filename.exists() {
            warn!(file = %filename.display(), "local file already exists, will overwrite");
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            if self.ignore_not_found {
                warn!(url = %url, "not found error returned while fetching, ignoring");
                return Ok(false);
            }
            error!(
                url = %url,
                "not found error returned while fetching; all of these can be ignored with --ignore-file-not-found"
            );
            info!(
                dir = %self.downloads_dir.display(),
                "to resume re-using already downloaded files, pass --downloads-dir with this directory"
            );
            return Err(SlackportError::download(url, status.as_u16()));
        }

        if !status.is_success() {
            return Err(SlackportError::download(url, status.as_u16()));
        }

        let bytes = response.bytes().await?;
        fs::write(filename, &bytes).await?;
        Ok(true)
    }
}

// ============================================================================
// Tests
// ============================================================================

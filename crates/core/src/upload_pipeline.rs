use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::object_store::ObjectStore;
use crate::{Error, Result};

/// Linear-scaled retry delay: `attempt * base` (spec.md §4.5), `attempt`
/// is 1-based. Kept pure so scenario S4's delay sequence can be asserted
/// directly without sleeping in a test (SPEC_FULL §8).
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

/// Ships one staged chunk to `parts/<basename>` with bounded retry, per
/// spec.md §4.5:
/// (a) skip (and delete local) if the remote object already exists;
/// (b) otherwise upload with linear backoff up to `max_attempts`;
/// (c) delete the local copy on success.
///
/// Returns `Ok(true)` if the chunk was durably uploaded this call (or was
/// already durable), `Ok(false)` is never returned — failure is always an
/// `Err` (exhausted retries are fatal to the run, spec.md §4.5, §7).
pub async fn upload_chunk_with_retry(
    store: &dyn ObjectStore,
    local_path: &Path,
    remote_uri: &str,
    max_attempts: u32,
    backoff_base: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    if store.exists(remote_uri).await? {
        tracing::debug!(event = "upload.already_present", uri = remote_uri, "skipping upload");
        remove_local_if_present(local_path)?;
        return Ok(());
    }

    let mut attempt = 1u32;
    loop {
        tracing::debug!(event = "upload.attempt", uri = remote_uri, attempt, "uploading chunk");
        match store.upload(local_path, remote_uri).await {
            Ok(()) => {
                tracing::info!(event = "upload.succeeded", uri = remote_uri, attempt, "chunk uploaded");
                remove_local_if_present(local_path)?;
                return Ok(());
            }
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        event = "upload.exhausted",
                        uri = remote_uri,
                        attempts = attempt,
                        error = %err,
                        "upload retries exhausted"
                    );
                    return Err(Error::UploadFailed {
                        message: format!("{remote_uri}: {err} (after {attempt} attempts)"),
                    });
                }
                let delay = backoff_delay(attempt, backoff_base);
                tracing::debug!(
                    event = "upload.retry_scheduled",
                    uri = remote_uri,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "scheduling retry"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Interrupted),
                }
                attempt += 1;
            }
        }
    }
}

fn remove_local_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::object_store::{COMPOSE_BATCH_SIZE, ObjectStore};
use crate::{Error, Result};

/// Delay after each compose call to tolerate eventual-consistency lag
/// before deleting the just-composed sources (spec.md §4.6).
const POST_COMPOSE_DELAY: Duration = Duration::from_secs(10);

/// Folds every object under `parts_prefix` into `target`, batching
/// `COMPOSE_BATCH_SIZE` (31) sources per call with `target` always first
/// so composition preserves emission order (spec.md §4.6). Pre-condition:
/// caller has already created `target` (empty placeholder is fine) before
/// calling this, since every compose batch includes it as a source.
///
/// On a compose error, aborts immediately and leaves the partial target in
/// place so a later invocation can resume (spec.md §4.6, §7 ComposeFailed).
pub async fn compose_all(
    store: &dyn ObjectStore,
    target: &str,
    parts_prefix: &str,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut compose_calls = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        let parts = store.list(parts_prefix).await?;
        if parts.is_empty() {
            break;
        }

        let batch: Vec<String> = parts.into_iter().take(COMPOSE_BATCH_SIZE).collect();
        let mut sources = Vec::with_capacity(batch.len() + 1);
        sources.push(target.to_string());
        sources.extend(batch.iter().cloned());

        tracing::info!(
            event = "composer.compose_batch",
            target,
            batch_size = batch.len(),
            "composing batch"
        );

        store.compose(target, &sources).await.map_err(|e| Error::ComposeFailed {
            message: e.to_string(),
        })?;
        compose_calls += 1;

        tokio::select! {
            _ = tokio::time::sleep(POST_COMPOSE_DELAY) => {}
            _ = cancel.cancelled() => return Err(Error::Interrupted),
        }

        store.delete_many(&batch).await?;
    }

    Ok(compose_calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::InMemoryObjectStore;

    async fn seed_parts(store: &InMemoryObjectStore, count: usize) {
        for i in 0..count {
            store
                .upload_bytes(vec![b'x'], &format!("gs://bucket/run/parts/{i}_part-1.tar.gz"))
                .await
                .unwrap();
        }
    }

    // `start_paused` gives this test tokio's auto-advancing virtual clock,
    // so the 10s post-compose delay per batch doesn't make the suite slow.
    #[tokio::test(start_paused = true)]
    async fn composes_95_chunks_in_four_batches() {
        let store = InMemoryObjectStore::new();
        store.upload_bytes(Vec::new(), "gs://bucket/run/run.tar.gz").await.unwrap();
        seed_parts(&store, 95).await;

        let cancel = CancellationToken::new();
        let calls = compose_all(&store, "gs://bucket/run/run.tar.gz", "gs://bucket/run/parts/", &cancel)
            .await
            .unwrap();

        assert_eq!(calls, 4);
        assert_eq!(store.compose_calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn composed_target_content_equals_union_of_parts_in_order() {
        let store = InMemoryObjectStore::new();
        store.upload_bytes(Vec::new(), "gs://bucket/run/run.tar.gz").await.unwrap();
        store.upload_bytes(b"A".to_vec(), "gs://bucket/run/parts/1_part-1.tar.gz").await.unwrap();
        store.upload_bytes(b"B".to_vec(), "gs://bucket/run/parts/2_part-1.tar.gz").await.unwrap();

        let cancel = CancellationToken::new();
        compose_all(&store, "gs://bucket/run/run.tar.gz", "gs://bucket/run/parts/", &cancel)
            .await
            .unwrap();

        assert_eq!(store.get("gs://bucket/run/run.tar.gz").unwrap(), b"AB".to_vec());
    }
}

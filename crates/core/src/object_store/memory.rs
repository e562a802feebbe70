use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::naming::natural_cmp;
use crate::{Error, Result};

use super::{BoxFuture, COMPOSE_FANIN_MAX, ObjectStore};

/// In-process object store used by unit and integration tests. Enforces
/// the same `COMPOSE_FANIN_MAX` bound a real backend would, so a test
/// exercising the composer catches a caller that violates it (spec.md §8
/// invariant 4).
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub upload_calls: AtomicUsize,
    pub compose_calls: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.lock().expect("object store mutex poisoned").get(uri).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("object store mutex poisoned").len()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn exists<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .objects
                .lock()
                .expect("object store mutex poisoned")
                .contains_key(uri))
        })
    }

    fn upload<'a>(&'a self, local_path: &'a Path, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let bytes = std::fs::read(local_path)?;
            self.objects
                .lock()
                .expect("object store mutex poisoned")
                .insert(uri.to_string(), bytes);
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn upload_bytes<'a>(&'a self, bytes: Vec<u8>, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.objects
                .lock()
                .expect("object store mutex poisoned")
                .insert(uri.to_string(), bytes);
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut names: Vec<String> = self
                .objects
                .lock()
                .expect("object store mutex poisoned")
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            names.sort_by(|a, b| natural_cmp(a, b));
            Ok(names)
        })
    }

    fn compose<'a>(&'a self, target: &'a str, sources: &'a [String]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if sources.len() > COMPOSE_FANIN_MAX {
                return Err(Error::ComposeFailed {
                    message: format!(
                        "compose source count {} exceeds COMPOSE_FANIN_MAX {}",
                        sources.len(),
                        COMPOSE_FANIN_MAX
                    ),
                });
            }

            let mut combined = Vec::new();
            {
                let guard = self.objects.lock().expect("object store mutex poisoned");
                for source in sources {
                    let bytes = guard.get(source).ok_or_else(|| Error::ComposeFailed {
                        message: format!("compose source missing: {source}"),
                    })?;
                    combined.extend_from_slice(bytes);
                }
            }
            self.objects
                .lock()
                .expect("object store mutex poisoned")
                .insert(target.to_string(), combined);
            self.compose_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.objects.lock().expect("object store mutex poisoned").remove(uri);
            Ok(())
        })
    }

    fn delete_many<'a>(&'a self, uris: &'a [String]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut guard = self.objects.lock().expect("object store mutex poisoned");
            for uri in uris {
                guard.remove(uri);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_exists_then_delete() {
        let store = InMemoryObjectStore::new();
        store.upload_bytes(b"hi".to_vec(), "gs://bucket/a").await.unwrap();
        assert!(store.exists("gs://bucket/a").await.unwrap());
        store.delete("gs://bucket/a").await.unwrap();
        assert!(!store.exists("gs://bucket/a").await.unwrap());
    }

    #[tokio::test]
    async fn compose_rejects_too_many_sources() {
        let store = InMemoryObjectStore::new();
        let sources: Vec<String> = (0..40).map(|i| format!("gs://bucket/{i}")).collect();
        for s in &sources {
            store.upload_bytes(b"x".to_vec(), s).await.unwrap();
        }
        let err = store.compose("gs://bucket/target", &sources).await.unwrap_err();
        assert!(matches!(err, Error::ComposeFailed { .. }));
    }

    #[tokio::test]
    async fn compose_concatenates_in_order() {
        let store = InMemoryObjectStore::new();
        store.upload_bytes(b"A".to_vec(), "gs://bucket/a").await.unwrap();
        store.upload_bytes(b"B".to_vec(), "gs://bucket/b").await.unwrap();
        store
            .compose(
                "gs://bucket/target",
                &["gs://bucket/a".to_string(), "gs://bucket/b".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(store.get("gs://bucket/target").unwrap(), b"AB".to_vec());
    }

    #[tokio::test]
    async fn list_is_naturally_ordered() {
        let store = InMemoryObjectStore::new();
        for name in ["parts/9_part-1.tar.gz", "parts/10_part-1.tar.gz", "parts/2_part-1.tar.gz"] {
            store.upload_bytes(Vec::new(), &format!("gs://bucket/{name}")).await.unwrap();
        }
        let listed = store.list("gs://bucket/parts/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                "gs://bucket/parts/2_part-1.tar.gz",
                "gs://bucket/parts/9_part-1.tar.gz",
                "gs://bucket/parts/10_part-1.tar.gz",
            ]
        );
    }
}

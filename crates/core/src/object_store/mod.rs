mod gcs;
mod memory;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

pub use gcs::GcsObjectStore;
pub use memory::InMemoryObjectStore;

use crate::Result;

/// Maximum number of sources a single `compose` call accepts (spec.md §4.2).
pub const COMPOSE_FANIN_MAX: usize = 32;

/// Leaves one fan-in slot for the running target (spec.md §4.6).
pub const COMPOSE_BATCH_SIZE: usize = COMPOSE_FANIN_MAX - 1;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote object-store operations the controller needs (spec.md §4.2).
/// Hand-rolled boxed-future methods instead of `async_trait`, mirroring the
/// teacher's `Storage` trait in `storage.rs` — no dependency on a macro
/// crate the rest of the corpus doesn't use for this purpose.
pub trait ObjectStore: Send + Sync {
    fn exists<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, bool>;

    fn upload<'a>(&'a self, local_path: &'a Path, uri: &'a str) -> BoxFuture<'a, ()>;

    fn upload_bytes<'a>(&'a self, bytes: Vec<u8>, uri: &'a str) -> BoxFuture<'a, ()>;

    /// Lists objects under `prefix`, in natural/version order of the final
    /// path segment (spec.md §4.2).
    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Vec<String>>;

    /// Server-side concatenation. Must fail if `sources.len() >
    /// COMPOSE_FANIN_MAX` (spec.md §4.2).
    fn compose<'a>(&'a self, target: &'a str, sources: &'a [String]) -> BoxFuture<'a, ()>;

    fn delete<'a>(&'a self, uri: &'a str) -> BoxFuture<'a, ()>;

    fn delete_many<'a>(&'a self, uris: &'a [String]) -> BoxFuture<'a, ()>;
}

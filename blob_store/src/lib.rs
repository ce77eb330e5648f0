//! Object-level access to the bucket(s) holding live binlogs and backups.
//!
//! The engines speak [`BlobStore`], a small path-string interface over
//! whatever object storage the deployment uses. [`ObjectBlobStore`] is the
//! production implementation on top of [`object_store::DynObjectStore`].
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::{Debug, Display, Formatter};

mod object;
pub use object::ObjectBlobStore;

/// Generic boxed error type for blob store operations.
///
/// The dynamic boxing makes it easy to carry errors from different backends
/// while callers match on [`BlobStoreErrorKind`].
#[derive(Debug)]
pub struct BlobStoreError {
    inner: Box<dyn std::error::Error + Sync + Send>,
    kind: BlobStoreErrorKind,
}

impl BlobStoreError {
    /// Wrap an error under the given kind.
    pub fn new(
        kind: BlobStoreErrorKind,
        e: impl Into<Box<dyn std::error::Error + Sync + Send>>,
    ) -> Self {
        Self {
            inner: e.into(),
            kind,
        }
    }

    /// The referenced object does not exist.
    pub fn not_found(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BlobStoreErrorKind::NotFound, e)
    }

    /// The operation may succeed if retried.
    pub fn transient(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BlobStoreErrorKind::Transient, e)
    }

    /// The store rejected the caller's credentials.
    pub fn auth(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BlobStoreErrorKind::Auth, e)
    }

    /// Anything else.
    pub fn unknown(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(BlobStoreErrorKind::Unknown, e)
    }

    /// Returns the kind of error this was.
    pub fn kind(&self) -> BlobStoreErrorKind {
        self.kind
    }

    /// Returns the inner error.
    pub fn inner(&self) -> &dyn std::error::Error {
        self.inner.as_ref()
    }
}

impl Display for BlobStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlobStoreError({:?}): {}", self.kind, self.inner)
    }
}

impl std::error::Error for BlobStoreError {}

impl From<object_store::Error> for BlobStoreError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { .. } => Self::not_found(e),
            other => Self::unknown(other),
        }
    }
}

/// Classification of a [`BlobStoreError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlobStoreErrorKind {
    /// The referenced object does not exist.
    NotFound,

    /// The operation failed but may succeed if retried.
    Transient,

    /// The store rejected the caller's credentials.
    Auth,

    /// This operation failed for an unknown reason.
    Unknown,
}

/// One object (or, for non-recursive listings, one directory) returned by a
/// prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Logical path of the entry. Directory entries carry a trailing `/`.
    pub path: String,
    /// Object size in bytes; 0 for directory entries.
    pub size: i64,
}

/// Object-level access used by the backup engines.
///
/// Paths are `/`-separated logical keys; double slashes are rejected. The
/// live data bucket and the backup target bucket may be distinct backends;
/// implementations hide the routing.
#[async_trait]
pub trait BlobStore: Debug + Send + Sync + 'static {
    /// Does an object exist at `path`?
    async fn exist(&self, path: &str) -> Result<bool, BlobStoreError>;

    /// Read the object at `path` in full.
    async fn read(&self, path: &str) -> Result<Bytes, BlobStoreError>;

    /// Write `data` to `path`, overwriting any existing object.
    async fn write(&self, path: &str, data: Bytes) -> Result<(), BlobStoreError>;

    /// Copy the object at `src` to `dst`.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), BlobStoreError>;

    /// List objects under `prefix`. Non-recursive listings additionally
    /// surface the immediate sub-directories. Ordering is unspecified.
    async fn list_with_prefix(
        &self,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, BlobStoreError>;

    /// Best-effort bulk delete of every object under `prefix`.
    async fn remove_with_prefix(&self, prefix: &str) -> Result<(), BlobStoreError>;
}

/// Recognized configuration of the production blob store adapter.
///
/// Constructing the concrete cloud client out of this is the embedder's
/// concern; the type names the contract.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct BlobStoreConfig {
    pub address: String,
    pub port: u16,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub use_ssl: bool,
    pub bucket_name: String,
    /// Bucket receiving backup data; may equal `bucket_name`.
    pub backup_bucket_name: String,
    pub root_path: String,
    pub use_iam: bool,
    pub iam_endpoint: String,
    pub create_bucket_if_missing: bool,
}

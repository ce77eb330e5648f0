//! Client interface to the live vector database cluster.
//!
//! The backup engines consume the cluster exclusively through
//! [`DataEngineClient`]; a network implementation is an embedder concern,
//! while [`MockDataEngine`] backs the test suites.
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
use backup_types::{CollectionSchema, ConsistencyLevel};
use std::fmt::{Debug, Display, Formatter};

mod mock;
pub use mock::{BulkloadRequest, CreatedCollection, MockDataEngine, DEFAULT_PARTITION};

/// Generic boxed error type for data engine operations.
#[derive(Debug)]
pub struct EngineError {
    inner: Box<dyn std::error::Error + Sync + Send>,
    kind: EngineErrorKind,
}

impl EngineError {
    /// Wrap an error under the given kind.
    pub fn new(
        kind: EngineErrorKind,
        e: impl Into<Box<dyn std::error::Error + Sync + Send>>,
    ) -> Self {
        Self {
            inner: e.into(),
            kind,
        }
    }

    /// The cluster could not be reached.
    pub fn connect(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(EngineErrorKind::Connect, e)
    }

    /// The referenced entity does not exist.
    pub fn not_found(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(EngineErrorKind::NotFound, e)
    }

    /// The cluster rejected the request.
    pub fn request(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(EngineErrorKind::Request, e)
    }

    /// Anything else.
    pub fn unknown(e: impl Into<Box<dyn std::error::Error + Sync + Send>>) -> Self {
        Self::new(EngineErrorKind::Unknown, e)
    }

    /// Returns the kind of error this was.
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// Returns the inner error.
    pub fn inner(&self) -> &dyn std::error::Error {
        self.inner.as_ref()
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineError({:?}): {}", self.kind, self.inner)
    }
}

impl std::error::Error for EngineError {}

/// Classification of an [`EngineError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The cluster could not be reached.
    Connect,

    /// The referenced entity does not exist.
    NotFound,

    /// The cluster rejected the request.
    Request,

    /// This operation failed for an unknown reason.
    Unknown,
}

/// Connection contract of the production client: created lazily on the first
/// operation, torn down on drop.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct EngineConfig {
    pub address: String,
    pub port: u16,
}

/// A collection as reported by a listing. Explicitly incomplete; use
/// [`DataEngineClient::describe_collection`] for the full schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Engine-assigned collection id.
    pub id: i64,
    /// Collection name.
    pub name: String,
}

/// Complete description of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescription {
    /// Engine-assigned collection id.
    pub id: i64,
    /// Collection name.
    pub name: String,
    /// Complete schema.
    pub schema: CollectionSchema,
    /// Shard count.
    pub shards_num: i32,
    /// Consistency level.
    pub consistency_level: ConsistencyLevel,
}

/// One partition of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Engine-assigned partition id.
    pub id: i64,
    /// Partition name.
    pub name: String,
}

/// Result of a blocking flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushResult {
    /// Segments the flush just sealed.
    pub new_sealed: Vec<i64>,
    /// Segments that were already sealed beforehand.
    pub already_sealed: Vec<i64>,
    /// Seal time in unix seconds; monotonically meaningful per collection.
    pub seal_time: i64,
}

/// One persisted segment as enumerated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Engine-assigned segment id.
    pub id: i64,
    /// Owning collection.
    pub collection_id: i64,
    /// Owning partition.
    pub partition_id: i64,
    /// Row count.
    pub num_rows: i64,
}

/// Terminal and intermediate states of a bulk-ingest task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkloadState {
    /// Queued, not yet started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Current status of one bulk-ingest task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkloadStatus {
    /// Task state.
    pub state: BulkloadState,
    /// Failure reason when `state` is [`BulkloadState::Failed`].
    pub reason: String,
}

impl BulkloadStatus {
    /// A status with no reason attached.
    pub fn new(state: BulkloadState) -> Self {
        Self {
            state,
            reason: String::new(),
        }
    }
}

/// Everything the backup engines need from the live cluster.
#[async_trait]
pub trait DataEngineClient: Debug + Send + Sync + 'static {
    /// List all collections. Results are incomplete descriptions.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, EngineError>;

    /// Does a collection with this name exist?
    async fn has_collection(&self, name: &str) -> Result<bool, EngineError>;

    /// Complete description of one collection.
    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, EngineError>;

    /// All partitions of one collection.
    async fn show_partitions(&self, collection: &str) -> Result<Vec<PartitionInfo>, EngineError>;

    /// Seal all growing segments of a collection, returning both the
    /// just-sealed and the already-sealed segment ids plus the seal time.
    /// Pending until the flush completed.
    async fn flush(&self, collection: &str) -> Result<FlushResult, EngineError>;

    /// Enumerate the persisted segments of one collection.
    async fn get_persistent_segments(
        &self,
        collection: &str,
    ) -> Result<Vec<SegmentInfo>, EngineError>;

    /// Create a collection from a complete schema.
    async fn create_collection(
        &self,
        schema: &CollectionSchema,
        shards_num: i32,
        consistency_level: ConsistencyLevel,
    ) -> Result<(), EngineError>;

    /// Does the partition exist within the collection?
    async fn has_partition(&self, collection: &str, partition: &str)
        -> Result<bool, EngineError>;

    /// Create a partition within an existing collection.
    async fn create_partition(
        &self,
        collection: &str,
        partition: &str,
    ) -> Result<(), EngineError>;

    /// Submit a server-side bulk ingest of `files` into `(collection,
    /// partition)`; returns the ids of the spawned tasks.
    async fn bulkload(
        &self,
        collection: &str,
        partition: &str,
        row_based: bool,
        files: &[String],
        options: &[(&str, String)],
    ) -> Result<Vec<i64>, EngineError>;

    /// Current status of a bulk-ingest task.
    async fn bulkload_state(&self, task_id: i64) -> Result<BulkloadStatus, EngineError>;

    /// Return type (like `"mock"` or `"grpc"`) of this client.
    fn type_name(&self) -> &'static str;
}

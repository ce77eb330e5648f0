//! Shared types describing the contents of a backup.
//!
//! A backup is a strict four-level tree: [`BackupInfo`] →
//! [`CollectionBackupInfo`] → [`PartitionBackupInfo`] →
//! [`SegmentBackupInfo`]. The tree is what the engines work with in memory;
//! the flattened "leveled" form and its on-disk serialization live in
//! [`meta`].
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

use serde::{Deserialize, Serialize};

pub mod meta;

/// Number of low bits carrying the logical counter of a composite logical
/// timestamp. The physical part is milliseconds since the unix epoch.
pub const LOGICAL_BITS: u32 = 18;

const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Compose a logical timestamp from a physical part (unix milliseconds) and a
/// logical counter.
pub fn compose_ts(physical_ms: i64, logical: i64) -> u64 {
    ((physical_ms as u64) << LOGICAL_BITS) | (logical as u64 & LOGICAL_MASK)
}

/// Extract the physical part (unix milliseconds) of a composite timestamp.
pub fn physical_ms(ts: u64) -> i64 {
    (ts >> LOGICAL_BITS) as i64
}

/// Terminal and intermediate states of a backup.
///
/// Only `Success` marks a complete backup; any other persisted state is an
/// incomplete or abandoned attempt left in the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupStatus {
    /// Created but no step has run yet.
    Initial,
    /// A snapshot is in flight.
    Executing,
    /// All data and metadata were written.
    Success,
    /// The attempt stopped before completion.
    Fail,
}

/// Engine-side read-after-write semantics, preserved verbatim by
/// backup/restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// Reads observe all prior writes.
    Strong,
    /// Reads observe writes of the same session.
    Session,
    /// Reads may lag by a bounded window.
    Bounded,
    /// No ordering guarantee.
    Eventually,
    /// User-supplied guarantee timestamp.
    Customized,
}

/// Field payload types understood by the data engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    VarChar,
    BinaryVector,
    FloatVector,
}

/// A single `key=value` parameter attached to a field (type or index
/// parameters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    /// Parameter name.
    pub key: String,
    /// Parameter value, uninterpreted.
    pub value: String,
}

impl KeyValuePair {
    /// Build a pair from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One field of a collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Engine-assigned field id.
    pub field_id: i64,
    /// Field name.
    pub name: String,
    /// Whether this field is the primary key.
    pub is_primary_key: bool,
    /// Whether primary keys are generated by the engine.
    pub auto_id: bool,
    /// Free-form description.
    pub description: String,
    /// Payload type.
    pub data_type: DataType,
    /// Type parameters (e.g. vector dimension).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<KeyValuePair>,
    /// Index parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_params: Vec<KeyValuePair>,
}

/// Complete schema of a collection, round-tripped verbatim by backup and
/// restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Whether primary keys are engine-generated.
    pub auto_id: bool,
    /// Fields in engine order.
    pub fields: Vec<FieldSchema>,
}

/// One log record: a single path into the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binlog {
    /// Object-store path of the log file.
    pub log_path: String,
    /// Size of the log file in bytes, as reported by the store listing.
    #[serde(default)]
    pub log_size: i64,
}

/// All log records of one field within one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinlog {
    /// Engine-assigned field id.
    pub field_id: i64,
    /// Log records in store-returned order.
    pub binlogs: Vec<Binlog>,
}

/// Backup state of one sealed segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentBackupInfo {
    /// Engine-assigned segment id.
    pub segment_id: i64,
    /// Owning collection.
    pub collection_id: i64,
    /// Owning partition.
    pub partition_id: i64,
    /// Row count at seal time.
    pub num_of_rows: i64,
    /// Total bytes across all recorded logs.
    #[serde(default)]
    pub size: i64,
    /// Insert field-binlogs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binlogs: Vec<FieldBinlog>,
    /// Delete field-binlogs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deltalogs: Vec<FieldBinlog>,
    /// Per-field statistics logs. Not copied by the snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statslogs: Vec<FieldBinlog>,
}

impl SegmentBackupInfo {
    /// Sum of the sizes of every recorded log.
    pub fn logged_bytes(&self) -> i64 {
        self.binlogs
            .iter()
            .chain(self.deltalogs.iter())
            .chain(self.statslogs.iter())
            .flat_map(|f| f.binlogs.iter())
            .map(|b| b.log_size)
            .sum()
    }
}

/// Backup state of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBackupInfo {
    /// Engine-assigned partition id.
    pub partition_id: i64,
    /// Partition name.
    pub partition_name: String,
    /// Owning collection.
    pub collection_id: i64,
    /// Total bytes across contained segments.
    #[serde(default)]
    pub size: i64,
    /// Segments captured for this partition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentBackupInfo>,
}

/// Backup state of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBackupInfo {
    /// Engine-assigned collection id.
    pub collection_id: i64,
    /// Collection name at backup time.
    pub collection_name: String,
    /// Reserved; always empty.
    #[serde(default)]
    pub db_name: String,
    /// Complete schema, as described by the engine.
    pub schema: CollectionSchema,
    /// Shard count.
    pub shards_num: i32,
    /// Consistency level.
    pub consistency_level: ConsistencyLevel,
    /// Seal time reported by Flush, as a composite logical timestamp with
    /// logical part zero.
    pub backup_timestamp: u64,
    /// Total bytes across contained partitions.
    #[serde(default)]
    pub size: i64,
    /// Partitions captured for this collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<PartitionBackupInfo>,
}

/// Root of the backup tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Reserved; always empty until a catalog identifier policy exists.
    #[serde(default)]
    pub id: String,
    /// Backup name, unique within the catalog.
    pub name: String,
    /// Unix seconds at the end of the snapshot.
    pub backup_timestamp: u64,
    /// Terminal state of the attempt.
    pub status: BackupStatus,
    /// Why a non-`Success` attempt stopped, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Collections captured by this backup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<CollectionBackupInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_ts_bit_layout() {
        let ts = compose_ts(1_658_400_000_000, 0);
        assert_eq!(ts, 1_658_400_000_000 << 18);
        assert_eq!(physical_ms(ts), 1_658_400_000_000);

        // logical part is masked into the low bits and never leaks upward
        let ts = compose_ts(1, (1 << 18) + 5);
        assert_eq!(ts, (1 << 18) | 5);
    }

    #[test]
    fn status_serializes_as_plain_variant_name() {
        assert_eq!(
            serde_json::to_string(&BackupStatus::Success).unwrap(),
            r#""Success""#
        );
    }
}

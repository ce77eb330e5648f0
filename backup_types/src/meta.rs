//! Leveled form of a backup and its on-disk serialization.
//!
//! On disk a backup is four independent JSON blobs: the root header
//! (`backup_meta.json`) and one flat list per level. Bounding each blob to a
//! single level keeps blob sizes proportional to that level and lets a reader
//! fetch only what it needs. The leveled and tree forms are lossless
//! transforms of each other: [`level`] strips children into flat lists,
//! [`tree`] re-links them by foreign key in a single pass.

use crate::{BackupInfo, CollectionBackupInfo, PartitionBackupInfo, SegmentBackupInfo};
use bytes::Bytes;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;

/// Errors produced by the meta codec.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum MetaError {
    #[snafu(display("error serializing {} level: {}", level, source))]
    Serialize {
        level: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("error deserializing {} level: {}", level, source))]
    Deserialize {
        level: &'static str,
        source: serde_json::Error,
    },
}

/// Flattened representation of a backup: the bare root plus one list per
/// level. Child vectors inside the entries are always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeveledBackupInfo {
    /// Root header with `collections` stripped.
    pub backup: BackupInfo,
    /// All collections, `partitions` stripped.
    pub collections: Vec<CollectionBackupInfo>,
    /// All partitions, `segments` stripped.
    pub partitions: Vec<PartitionBackupInfo>,
    /// All segments.
    pub segments: Vec<SegmentBackupInfo>,
}

/// The four serialized meta payloads of one backup.
#[derive(Debug, Clone)]
pub struct MetaBlobs {
    /// Root header blob.
    pub backup: Bytes,
    /// Collection level blob.
    pub collections: Bytes,
    /// Partition level blob.
    pub partitions: Bytes,
    /// Segment level blob.
    pub segments: Bytes,
}

/// Flatten a backup tree into its leveled form.
///
/// Entries keep their in-parent order, so `tree(level(x)) == x` for any
/// well-formed tree.
pub fn level(backup: &BackupInfo) -> LeveledBackupInfo {
    let mut collections = Vec::with_capacity(backup.collections.len());
    let mut partitions = Vec::new();
    let mut segments = Vec::new();

    for collection in &backup.collections {
        for partition in &collection.partitions {
            for segment in &partition.segments {
                segments.push(segment.clone());
            }
            partitions.push(PartitionBackupInfo {
                segments: vec![],
                ..partition.clone()
            });
        }
        collections.push(CollectionBackupInfo {
            partitions: vec![],
            ..collection.clone()
        });
    }

    LeveledBackupInfo {
        backup: BackupInfo {
            collections: vec![],
            ..backup.clone()
        },
        collections,
        partitions,
        segments,
    }
}

/// Re-link a leveled backup into its tree form by joining foreign keys.
///
/// Segments join partitions on `partition_id`; partitions join collections on
/// `collection_id`. Entries with a dangling key are dropped, matching the
/// strict-tree relation: well-formed inputs have none.
pub fn tree(leveled: &LeveledBackupInfo) -> BackupInfo {
    let mut partitions: Vec<PartitionBackupInfo> = leveled
        .partitions
        .iter()
        .map(|p| PartitionBackupInfo {
            segments: vec![],
            ..p.clone()
        })
        .collect();
    let partition_idx: HashMap<i64, usize> = partitions
        .iter()
        .enumerate()
        .map(|(i, p)| (p.partition_id, i))
        .collect();
    for segment in &leveled.segments {
        if let Some(&i) = partition_idx.get(&segment.partition_id) {
            partitions[i].segments.push(segment.clone());
        }
    }

    let mut collections: Vec<CollectionBackupInfo> = leveled
        .collections
        .iter()
        .map(|c| CollectionBackupInfo {
            partitions: vec![],
            ..c.clone()
        })
        .collect();
    let collection_idx: HashMap<i64, usize> = collections
        .iter()
        .enumerate()
        .map(|(i, c)| (c.collection_id, i))
        .collect();
    for partition in partitions {
        if let Some(&i) = collection_idx.get(&partition.collection_id) {
            collections[i].partitions.push(partition);
        }
    }

    BackupInfo {
        collections,
        ..leveled.backup.clone()
    }
}

/// Serialize a backup tree into its four meta blobs.
///
/// All four blobs derive from the same in-memory tree, so a reader that loads
/// all four observes one consistent backup.
pub fn serialize(backup: &BackupInfo) -> Result<MetaBlobs, MetaError> {
    let leveled = level(backup);
    Ok(MetaBlobs {
        backup: serde_json::to_vec(&leveled.backup)
            .context(SerializeSnafu { level: "backup" })?
            .into(),
        collections: serde_json::to_vec(&leveled.collections)
            .context(SerializeSnafu {
                level: "collection",
            })?
            .into(),
        partitions: serde_json::to_vec(&leveled.partitions)
            .context(SerializeSnafu { level: "partition" })?
            .into(),
        segments: serde_json::to_vec(&leveled.segments)
            .context(SerializeSnafu { level: "segment" })?
            .into(),
    })
}

/// Deserialize the four meta blobs back into a backup tree.
pub fn deserialize(
    backup: &[u8],
    collections: &[u8],
    partitions: &[u8],
    segments: &[u8],
) -> Result<BackupInfo, MetaError> {
    let leveled = LeveledBackupInfo {
        backup: serde_json::from_slice(backup).context(DeserializeSnafu { level: "backup" })?,
        collections: serde_json::from_slice(collections).context(DeserializeSnafu {
            level: "collection",
        })?,
        partitions: serde_json::from_slice(partitions)
            .context(DeserializeSnafu { level: "partition" })?,
        segments: serde_json::from_slice(segments)
            .context(DeserializeSnafu { level: "segment" })?,
    };
    Ok(tree(&leveled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BackupStatus, Binlog, CollectionSchema, ConsistencyLevel, DataType, FieldBinlog,
        FieldSchema, KeyValuePair,
    };

    fn schema(name: &str) -> CollectionSchema {
        CollectionSchema {
            name: name.into(),
            description: String::new(),
            auto_id: false,
            fields: vec![
                FieldSchema {
                    field_id: 100,
                    name: "pk".into(),
                    is_primary_key: true,
                    auto_id: false,
                    description: String::new(),
                    data_type: DataType::Int64,
                    type_params: vec![],
                    index_params: vec![],
                },
                FieldSchema {
                    field_id: 101,
                    name: "vec".into(),
                    is_primary_key: false,
                    auto_id: false,
                    description: String::new(),
                    data_type: DataType::FloatVector,
                    type_params: vec![KeyValuePair::new("dim", "128")],
                    index_params: vec![],
                },
            ],
        }
    }

    fn segment(collection_id: i64, partition_id: i64, segment_id: i64) -> SegmentBackupInfo {
        SegmentBackupInfo {
            segment_id,
            collection_id,
            partition_id,
            num_of_rows: 1000,
            size: 4096,
            binlogs: vec![FieldBinlog {
                field_id: 100,
                binlogs: vec![Binlog {
                    log_path: format!(
                        "files/insert_log/{}/{}/{}/100/1",
                        collection_id, partition_id, segment_id
                    ),
                    log_size: 4096,
                }],
            }],
            deltalogs: vec![],
            statslogs: vec![],
        }
    }

    fn sample_tree() -> BackupInfo {
        BackupInfo {
            id: String::new(),
            name: "b1".into(),
            backup_timestamp: 1_658_400_000,
            status: BackupStatus::Success,
            error_message: None,
            collections: vec![
                CollectionBackupInfo {
                    collection_id: 1,
                    collection_name: "c1".into(),
                    db_name: String::new(),
                    schema: schema("c1"),
                    shards_num: 2,
                    consistency_level: ConsistencyLevel::Bounded,
                    backup_timestamp: crate::compose_ts(1_658_400_000_000, 0),
                    size: 8192,
                    partitions: vec![
                        PartitionBackupInfo {
                            partition_id: 10,
                            partition_name: "_default".into(),
                            collection_id: 1,
                            size: 8192,
                            segments: vec![segment(1, 10, 101), segment(1, 10, 102)],
                        },
                        PartitionBackupInfo {
                            partition_id: 11,
                            partition_name: "p1".into(),
                            collection_id: 1,
                            size: 0,
                            segments: vec![],
                        },
                    ],
                },
                CollectionBackupInfo {
                    collection_id: 2,
                    collection_name: "c2".into(),
                    db_name: String::new(),
                    schema: schema("c2"),
                    shards_num: 1,
                    consistency_level: ConsistencyLevel::Strong,
                    backup_timestamp: crate::compose_ts(1_658_400_001_000, 0),
                    size: 4096,
                    partitions: vec![PartitionBackupInfo {
                        partition_id: 20,
                        partition_name: "_default".into(),
                        collection_id: 2,
                        size: 4096,
                        segments: vec![segment(2, 20, 201)],
                    }],
                },
            ],
        }
    }

    #[test]
    fn level_then_tree_round_trips() {
        let backup = sample_tree();
        assert_eq!(tree(&level(&backup)), backup);
    }

    #[test]
    fn tree_then_level_round_trips() {
        let leveled = level(&sample_tree());
        assert_eq!(level(&tree(&leveled)), leveled);
    }

    #[test]
    fn level_strips_children() {
        let leveled = level(&sample_tree());
        assert!(leveled.backup.collections.is_empty());
        assert!(leveled.collections.iter().all(|c| c.partitions.is_empty()));
        assert!(leveled.partitions.iter().all(|p| p.segments.is_empty()));
        assert_eq!(leveled.collections.len(), 2);
        assert_eq!(leveled.partitions.len(), 3);
        assert_eq!(leveled.segments.len(), 3);
    }

    #[test]
    fn tree_preserves_child_order() {
        let backup = sample_tree();
        let rebuilt = tree(&level(&backup));
        let ids: Vec<i64> = rebuilt.collections[0].partitions[0]
            .segments
            .iter()
            .map(|s| s.segment_id)
            .collect();
        assert_eq!(ids, vec![101, 102]);
    }

    #[test]
    fn blobs_round_trip() {
        let backup = sample_tree();
        let blobs = serialize(&backup).unwrap();
        let rebuilt = deserialize(
            &blobs.backup,
            &blobs.collections,
            &blobs.partitions,
            &blobs.segments,
        )
        .unwrap();
        assert_eq!(rebuilt, backup);
    }

    #[test]
    fn root_blob_carries_only_the_header() {
        let blobs = serialize(&sample_tree()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&blobs.backup).unwrap();
        assert!(value.get("collections").is_none());
        assert_eq!(value["name"], "b1");
        assert_eq!(value["status"], "Success");
    }

    #[test]
    fn corrupted_level_fails_with_its_level_name() {
        let blobs = serialize(&sample_tree()).unwrap();
        let err = deserialize(&blobs.backup, b"not json", &blobs.partitions, &blobs.segments)
            .unwrap_err();
        assert!(err.to_string().contains("collection level"));
    }
}

//! In-process mock of the data engine for tests and embedders.

use crate::{
    BulkloadState, BulkloadStatus, CollectionDescription, CollectionInfo, DataEngineClient,
    EngineError, FlushResult, PartitionInfo, SegmentInfo,
};
use async_trait::async_trait;
use backup_types::{CollectionSchema, ConsistencyLevel};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

/// Name of the partition every new collection starts with.
pub const DEFAULT_PARTITION: &str = "_default";

/// Arguments of a recorded [`DataEngineClient::create_collection`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCollection {
    /// Schema the collection was created from.
    pub schema: CollectionSchema,
    /// Requested shard count.
    pub shards_num: i32,
    /// Requested consistency level.
    pub consistency_level: ConsistencyLevel,
}

/// Arguments of a recorded [`DataEngineClient::bulkload`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkloadRequest {
    /// Target collection.
    pub collection: String,
    /// Target partition.
    pub partition: String,
    /// Whether row-based ingest was requested.
    pub row_based: bool,
    /// File arguments.
    pub files: Vec<String>,
    /// Ingest options.
    pub options: Vec<(String, String)>,
    /// Task ids handed back to the caller.
    pub task_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
struct MockCollection {
    description: CollectionDescription,
    partitions: Vec<PartitionInfo>,
    flush: FlushResult,
    segments: Vec<SegmentInfo>,
    /// Segments that become visible only after a flush was issued,
    /// simulating data arriving while a snapshot is in flight.
    late_segments: Vec<SegmentInfo>,
    flushed: bool,
}

#[derive(Debug, Default)]
struct MockState {
    collections: BTreeMap<String, MockCollection>,
    bulkload_script: Vec<BulkloadStatus>,
    tasks: BTreeMap<i64, VecDeque<BulkloadStatus>>,
    next_task_id: i64,
    next_collection_id: i64,
    next_partition_id: i64,
    created_collections: Vec<CreatedCollection>,
    created_partitions: Vec<(String, String)>,
    bulkloads: Vec<BulkloadRequest>,
}

/// A scriptable in-memory [`DataEngineClient`].
///
/// Collections are registered up front; mutating calls are recorded so tests
/// can assert on exactly what the engines asked the cluster to do.
#[derive(Debug)]
pub struct MockDataEngine {
    state: Mutex<MockState>,
}

impl MockDataEngine {
    /// An empty cluster.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_task_id: 1,
                next_collection_id: 1000,
                next_partition_id: 5000,
                ..Default::default()
            }),
        }
    }

    /// Register a pre-existing collection.
    ///
    /// # Panics
    ///
    /// When a collection with this name was already registered.
    pub fn register_collection(
        &self,
        description: CollectionDescription,
        partitions: Vec<PartitionInfo>,
    ) {
        let mut state = self.state.lock();
        let name = description.name.clone();
        let existing = state.collections.insert(
            name.clone(),
            MockCollection {
                description,
                partitions,
                flush: FlushResult {
                    new_sealed: vec![],
                    already_sealed: vec![],
                    seal_time: 0,
                },
                segments: vec![],
                late_segments: vec![],
                flushed: false,
            },
        );
        assert!(existing.is_none(), "collection {} already registered", name);
    }

    /// Script the result of the next flushes of `collection`.
    pub fn set_flush_result(&self, collection: &str, flush: FlushResult) {
        self.with_collection(collection, |c| c.flush = flush);
    }

    /// Set the persisted segments of `collection`.
    pub fn set_persistent_segments(&self, collection: &str, segments: Vec<SegmentInfo>) {
        self.with_collection(collection, |c| c.segments = segments);
    }

    /// Add a segment that becomes visible only after `collection` was
    /// flushed.
    pub fn add_segment_after_flush(&self, collection: &str, segment: SegmentInfo) {
        self.with_collection(collection, |c| c.late_segments.push(segment));
    }

    /// Script the status sequence handed out to each subsequently created
    /// bulk-ingest task; the last entry repeats. An empty script means
    /// immediate completion.
    pub fn script_bulkload_states(&self, states: Vec<BulkloadStatus>) {
        self.state.lock().bulkload_script = states;
    }

    /// All recorded collection creations, in call order.
    pub fn created_collections(&self) -> Vec<CreatedCollection> {
        self.state.lock().created_collections.clone()
    }

    /// All recorded partition creations, in call order.
    pub fn created_partitions(&self) -> Vec<(String, String)> {
        self.state.lock().created_partitions.clone()
    }

    /// All recorded bulk-ingest submissions, in call order.
    pub fn bulkload_requests(&self) -> Vec<BulkloadRequest> {
        self.state.lock().bulkloads.clone()
    }

    fn with_collection(&self, name: &str, f: impl FnOnce(&mut MockCollection)) {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .get_mut(name)
            .unwrap_or_else(|| panic!("collection {} not registered", name));
        f(collection);
    }
}

#[async_trait]
impl DataEngineClient for MockDataEngine {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, EngineError> {
        Ok(self
            .state
            .lock()
            .collections
            .values()
            .map(|c| CollectionInfo {
                id: c.description.id,
                name: c.description.name.clone(),
            })
            .collect())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.state.lock().collections.contains_key(name))
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, EngineError> {
        self.state
            .lock()
            .collections
            .get(name)
            .map(|c| c.description.clone())
            .ok_or_else(|| EngineError::not_found(format!("collection {} does not exist", name)))
    }

    async fn show_partitions(&self, collection: &str) -> Result<Vec<PartitionInfo>, EngineError> {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(|c| c.partitions.clone())
            .ok_or_else(|| {
                EngineError::not_found(format!("collection {} does not exist", collection))
            })
    }

    async fn flush(&self, collection: &str) -> Result<FlushResult, EngineError> {
        let mut state = self.state.lock();
        let entry = state.collections.get_mut(collection).ok_or_else(|| {
            EngineError::not_found(format!("collection {} does not exist", collection))
        })?;
        entry.flushed = true;
        Ok(entry.flush.clone())
    }

    async fn get_persistent_segments(
        &self,
        collection: &str,
    ) -> Result<Vec<SegmentInfo>, EngineError> {
        let state = self.state.lock();
        let entry = state.collections.get(collection).ok_or_else(|| {
            EngineError::not_found(format!("collection {} does not exist", collection))
        })?;
        let mut segments = entry.segments.clone();
        if entry.flushed {
            segments.extend(entry.late_segments.iter().copied());
        }
        Ok(segments)
    }

    async fn create_collection(
        &self,
        schema: &CollectionSchema,
        shards_num: i32,
        consistency_level: ConsistencyLevel,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.collections.contains_key(&schema.name) {
            return Err(EngineError::request(format!(
                "collection {} already exists",
                schema.name
            )));
        }
        state.created_collections.push(CreatedCollection {
            schema: schema.clone(),
            shards_num,
            consistency_level,
        });
        let collection_id = state.next_collection_id;
        state.next_collection_id += 1;
        let partition_id = state.next_partition_id;
        state.next_partition_id += 1;
        state.collections.insert(
            schema.name.clone(),
            MockCollection {
                description: CollectionDescription {
                    id: collection_id,
                    name: schema.name.clone(),
                    schema: schema.clone(),
                    shards_num,
                    consistency_level,
                },
                partitions: vec![PartitionInfo {
                    id: partition_id,
                    name: DEFAULT_PARTITION.to_string(),
                }],
                flush: FlushResult {
                    new_sealed: vec![],
                    already_sealed: vec![],
                    seal_time: 0,
                },
                segments: vec![],
                late_segments: vec![],
                flushed: false,
            },
        );
        Ok(())
    }

    async fn has_partition(
        &self,
        collection: &str,
        partition: &str,
    ) -> Result<bool, EngineError> {
        let state = self.state.lock();
        let entry = state.collections.get(collection).ok_or_else(|| {
            EngineError::not_found(format!("collection {} does not exist", collection))
        })?;
        Ok(entry.partitions.iter().any(|p| p.name == partition))
    }

    async fn create_partition(
        &self,
        collection: &str,
        partition: &str,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let partition_id = state.next_partition_id;
        state.next_partition_id += 1;
        let entry = state.collections.get_mut(collection).ok_or_else(|| {
            EngineError::not_found(format!("collection {} does not exist", collection))
        })?;
        if entry.partitions.iter().any(|p| p.name == partition) {
            return Err(EngineError::request(format!(
                "partition {} already exists",
                partition
            )));
        }
        entry.partitions.push(PartitionInfo {
            id: partition_id,
            name: partition.to_string(),
        });
        state
            .created_partitions
            .push((collection.to_string(), partition.to_string()));
        Ok(())
    }

    async fn bulkload(
        &self,
        collection: &str,
        partition: &str,
        row_based: bool,
        files: &[String],
        options: &[(&str, String)],
    ) -> Result<Vec<i64>, EngineError> {
        let mut state = self.state.lock();
        if !state.collections.contains_key(collection) {
            return Err(EngineError::not_found(format!(
                "collection {} does not exist",
                collection
            )));
        }
        let task_id = state.next_task_id;
        state.next_task_id += 1;

        let script: VecDeque<BulkloadStatus> = if state.bulkload_script.is_empty() {
            VecDeque::from([BulkloadStatus::new(BulkloadState::Completed)])
        } else {
            state.bulkload_script.iter().cloned().collect()
        };
        state.tasks.insert(task_id, script);

        state.bulkloads.push(BulkloadRequest {
            collection: collection.to_string(),
            partition: partition.to_string(),
            row_based,
            files: files.to_vec(),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            task_ids: vec![task_id],
        });
        Ok(vec![task_id])
    }

    async fn bulkload_state(&self, task_id: i64) -> Result<BulkloadStatus, EngineError> {
        let mut state = self.state.lock();
        let script = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| EngineError::not_found(format!("unknown bulkload task {}", task_id)))?;
        if script.len() > 1 {
            Ok(script.pop_front().expect("script is non-empty"))
        } else {
            Ok(script.front().expect("script is non-empty").clone())
        }
    }

    fn type_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_types::{DataType, FieldSchema};

    fn description(name: &str, id: i64) -> CollectionDescription {
        CollectionDescription {
            id,
            name: name.into(),
            schema: CollectionSchema {
                name: name.into(),
                description: String::new(),
                auto_id: false,
                fields: vec![FieldSchema {
                    field_id: 100,
                    name: "pk".into(),
                    is_primary_key: true,
                    auto_id: false,
                    description: String::new(),
                    data_type: DataType::Int64,
                    type_params: vec![],
                    index_params: vec![],
                }],
            },
            shards_num: 2,
            consistency_level: ConsistencyLevel::Bounded,
        }
    }

    #[tokio::test]
    async fn late_segments_show_up_only_after_flush() {
        let engine = MockDataEngine::new();
        engine.register_collection(description("c", 1), vec![]);
        engine.set_persistent_segments(
            "c",
            vec![SegmentInfo {
                id: 101,
                collection_id: 1,
                partition_id: 10,
                num_rows: 10,
            }],
        );
        engine.add_segment_after_flush(
            "c",
            SegmentInfo {
                id: 103,
                collection_id: 1,
                partition_id: 10,
                num_rows: 1,
            },
        );

        assert_eq!(engine.get_persistent_segments("c").await.unwrap().len(), 1);
        engine.flush("c").await.unwrap();
        assert_eq!(engine.get_persistent_segments("c").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bulkload_states_follow_the_script_and_repeat_the_tail() {
        let engine = MockDataEngine::new();
        engine.register_collection(description("c", 1), vec![]);
        engine.script_bulkload_states(vec![
            BulkloadStatus::new(BulkloadState::Running),
            BulkloadStatus::new(BulkloadState::Completed),
        ]);

        let tasks = engine
            .bulkload("c", "_default", false, &["a/".to_string()], &[])
            .await
            .unwrap();
        let task = tasks[0];
        assert_eq!(
            engine.bulkload_state(task).await.unwrap().state,
            BulkloadState::Running
        );
        assert_eq!(
            engine.bulkload_state(task).await.unwrap().state,
            BulkloadState::Completed
        );
        assert_eq!(
            engine.bulkload_state(task).await.unwrap().state,
            BulkloadState::Completed
        );
    }

    #[tokio::test]
    async fn created_collections_are_visible_and_recorded() {
        let engine = MockDataEngine::new();
        let desc = description("c_r", 0);
        engine
            .create_collection(&desc.schema, 2, ConsistencyLevel::Bounded)
            .await
            .unwrap();

        assert!(engine.has_collection("c_r").await.unwrap());
        assert!(engine.has_partition("c_r", DEFAULT_PARTITION).await.unwrap());
        assert_eq!(engine.created_collections().len(), 1);

        // creating the default partition again is rejected
        let err = engine
            .create_partition("c_r", DEFAULT_PARTITION)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::EngineErrorKind::Request);
    }
}

pub mod records;
pub mod trendlog;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    DeviceRecord, DeviceUpdate, NewDevice, NewTagSet, Sample, TagSetRecord, TagSetUpdate,
};

/// Keyed-record store for device and tag-set definitions. Consulted only
/// when assembling start parameters, never from inside a running job.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>>;
    async fn get_device(&self, id: Uuid) -> Result<Option<DeviceRecord>>;
    async fn create_device(&self, new: NewDevice) -> Result<DeviceRecord>;
    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> Result<DeviceRecord>;
    async fn delete_device(&self, id: Uuid) -> Result<()>;

    async fn list_tag_sets(&self) -> Result<Vec<TagSetRecord>>;
    async fn get_tag_set(&self, id: Uuid) -> Result<Option<TagSetRecord>>;
    async fn create_tag_set(&self, new: NewTagSet) -> Result<TagSetRecord>;
    async fn update_tag_set(&self, id: Uuid, update: TagSetUpdate) -> Result<TagSetRecord>;
    async fn delete_tag_set(&self, id: Uuid) -> Result<()>;
}

/// Append-only trend log sink. Paths are relative to the store's root; each
/// job owns exactly one path for its lifetime.
#[async_trait]
pub trait TrendLogStore: Send + Sync {
    /// Write the header row exactly once: only if the sink does not exist
    /// yet or is empty.
    async fn ensure_header(&self, rel_path: &Path, columns: &[String]) -> Result<()>;

    /// Append rows to the sink. The file handle is held only for the
    /// duration of the call and released on every exit path. Previously
    /// flushed rows are never rewritten.
    async fn append_rows(&self, rel_path: &Path, rows: &[Sample]) -> Result<()>;
}

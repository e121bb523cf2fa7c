use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::TrendError;
use crate::models::records::{
    validate_device_update, validate_new_device, validate_new_tag_set, validate_tag_set_update,
};
use crate::models::{
    DeviceRecord, DeviceUpdate, NewDevice, NewTagSet, TagSetRecord, TagSetUpdate,
};
use crate::storage::RecordStore;

/// JSON-file-backed record store: `devices.json` and `tag_sets.json` in the
/// data directory, cached in memory and rewritten atomically on mutation.
pub struct JsonRecordStore {
    devices_path: PathBuf,
    tag_sets_path: PathBuf,
    devices: RwLock<Vec<DeviceRecord>>,
    tag_sets: RwLock<Vec<TagSetRecord>>,
}

/// Load a record file, backing up and starting empty if it is corrupted.
async fn load_or_reset<T: DeserializeOwned>(path: &PathBuf) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str::<Vec<T>>(&content) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            tracing::warn!(
                "{} is corrupted ({}), creating backup and starting empty",
                path.display(),
                e
            );
            let backup = path.with_extension("json.bak");
            if let Err(backup_err) = tokio::fs::copy(path, &backup).await {
                tracing::error!(
                    "Failed to back up corrupted {}: {}",
                    path.display(),
                    backup_err
                );
            }
            Ok(Vec::new())
        }
    }
}

/// Write to a temp file next to the target, then rename into place.
async fn persist<T: Serialize>(path: &PathBuf, records: &[T]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(records).context("Failed to serialize records")?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .context("Failed to write temporary record file")?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .context("Failed to rename temporary record file")?;

    Ok(())
}

impl JsonRecordStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let devices_path = data_dir.join("devices.json");
        let tag_sets_path = data_dir.join("tag_sets.json");

        let devices = load_or_reset::<DeviceRecord>(&devices_path).await?;
        let tag_sets = load_or_reset::<TagSetRecord>(&tag_sets_path).await?;

        Ok(Self {
            devices_path,
            tag_sets_path,
            devices: RwLock::new(devices),
            tag_sets: RwLock::new(tag_sets),
        })
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn list_devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.devices.read().await.clone())
    }

    async fn get_device(&self, id: Uuid) -> Result<Option<DeviceRecord>> {
        Ok(self.devices.read().await.iter().find(|d| d.id == id).cloned())
    }

    async fn create_device(&self, new: NewDevice) -> Result<DeviceRecord> {
        validate_new_device(&new)?;

        let mut devices = self.devices.write().await;
        if devices
            .iter()
            .any(|d| d.device_identifier == new.device_identifier)
        {
            return Err(TrendError::Conflict(format!(
                "A device with identifier '{}' already exists",
                new.device_identifier
            ))
            .into());
        }

        let now = Utc::now();
        let record = DeviceRecord {
            id: Uuid::now_v7(),
            device_identifier: new.device_identifier,
            description: new.description,
            address: new.address,
            subnet: new.subnet,
            created_at: now,
            updated_at: now,
        };

        devices.push(record.clone());
        persist(&self.devices_path, &devices).await?;

        Ok(record)
    }

    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> Result<DeviceRecord> {
        validate_device_update(&update)?;

        let mut devices = self.devices.write().await;
        let idx = devices
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| TrendError::NotFound(format!("Device with id '{}' not found", id)))?;

        if let Some(ref ident) = update.device_identifier {
            if devices
                .iter()
                .any(|d| d.device_identifier == *ident && d.id != id)
            {
                return Err(TrendError::Conflict(format!(
                    "A device with identifier '{}' already exists",
                    ident
                ))
                .into());
            }
        }

        let record = &mut devices[idx];
        if let Some(ident) = update.device_identifier {
            record.device_identifier = ident;
        }
        if let Some(description) = update.description {
            record.description = Some(description);
        }
        if let Some(address) = update.address {
            record.address = address;
        }
        if let Some(subnet) = update.subnet {
            record.subnet = Some(subnet);
        }
        record.updated_at = Utc::now();

        let updated = record.clone();
        persist(&self.devices_path, &devices).await?;

        Ok(updated)
    }

    async fn delete_device(&self, id: Uuid) -> Result<()> {
        let mut devices = self.devices.write().await;
        let idx = devices
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| TrendError::NotFound(format!("Device with id '{}' not found", id)))?;

        devices.remove(idx);
        persist(&self.devices_path, &devices).await?;

        Ok(())
    }

    async fn list_tag_sets(&self) -> Result<Vec<TagSetRecord>> {
        Ok(self.tag_sets.read().await.clone())
    }

    async fn get_tag_set(&self, id: Uuid) -> Result<Option<TagSetRecord>> {
        Ok(self.tag_sets.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn create_tag_set(&self, new: NewTagSet) -> Result<TagSetRecord> {
        validate_new_tag_set(&new)?;

        let mut tag_sets = self.tag_sets.write().await;
        if tag_sets.iter().any(|t| t.name == new.name) {
            return Err(TrendError::Conflict(format!(
                "A tag set named '{}' already exists",
                new.name
            ))
            .into());
        }

        let now = Utc::now();
        let record = TagSetRecord {
            id: Uuid::now_v7(),
            name: new.name,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };

        tag_sets.push(record.clone());
        persist(&self.tag_sets_path, &tag_sets).await?;

        Ok(record)
    }

    async fn update_tag_set(&self, id: Uuid, update: TagSetUpdate) -> Result<TagSetRecord> {
        validate_tag_set_update(&update)?;

        let mut tag_sets = self.tag_sets.write().await;
        let idx = tag_sets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TrendError::NotFound(format!("Tag set with id '{}' not found", id)))?;

        if let Some(ref name) = update.name {
            if tag_sets.iter().any(|t| t.name == *name && t.id != id) {
                return Err(TrendError::Conflict(format!(
                    "A tag set named '{}' already exists",
                    name
                ))
                .into());
            }
        }

        let record = &mut tag_sets[idx];
        if let Some(name) = update.name {
            record.name = name;
        }
        if let Some(tags) = update.tags {
            record.tags = tags;
        }
        record.updated_at = Utc::now();

        let updated = record.clone();
        persist(&self.tag_sets_path, &tag_sets).await?;

        Ok(updated)
    }

    async fn delete_tag_set(&self, id: Uuid) -> Result<()> {
        let mut tag_sets = self.tag_sets.write().await;
        let idx = tag_sets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TrendError::NotFound(format!("Tag set with id '{}' not found", id)))?;

        tag_sets.remove(idx);
        persist(&self.tag_sets_path, &tag_sets).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_new_device(ident: &str) -> NewDevice {
        NewDevice {
            device_identifier: ident.to_string(),
            description: Some("line".to_string()),
            address: "192.168.0.1".to_string(),
            subnet: None,
        }
    }

    fn make_new_tag_set(name: &str) -> NewTagSet {
        NewTagSet {
            name: name.to_string(),
            tags: vec!["T1".to_string(), "T2".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_and_get_device() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let created = store
            .create_device(make_new_device("BlendB"))
            .await
            .expect("create");
        let fetched = store.get_device(created.id).await.expect("get");

        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn test_duplicate_device_identifier_conflicts() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        store
            .create_device(make_new_device("BlendB"))
            .await
            .expect("first");
        let result = store.create_device(make_new_device("BlendB")).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_device_persists_across_reload() {
        let tmp = TempDir::new().expect("tempdir");
        let created = {
            let store = JsonRecordStore::new(tmp.path().to_path_buf())
                .await
                .expect("store");
            store
                .create_device(make_new_device("BlendB"))
                .await
                .expect("create")
        };

        let reloaded = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("reload");
        let devices = reloaded.list_devices().await.expect("list");
        assert_eq!(devices, vec![created]);
    }

    #[tokio::test]
    async fn test_update_device_partial() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let created = store
            .create_device(make_new_device("BlendB"))
            .await
            .expect("create");
        let updated = store
            .update_device(
                created.id,
                DeviceUpdate {
                    address: Some("10.0.0.2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.address, "10.0.0.2");
        assert_eq!(updated.device_identifier, "BlendB");
    }

    #[tokio::test]
    async fn test_update_unknown_device_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let result = store
            .update_device(Uuid::now_v7(), DeviceUpdate::default())
            .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_delete_device() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let created = store
            .create_device(make_new_device("BlendB"))
            .await
            .expect("create");
        store.delete_device(created.id).await.expect("delete");

        assert!(store.get_device(created.id).await.expect("get").is_none());
        assert!(store.delete_device(created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_tag_set_crud_roundtrip() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let created = store
            .create_tag_set(make_new_tag_set("pressures"))
            .await
            .expect("create");
        assert_eq!(created.tags.len(), 2);

        let updated = store
            .update_tag_set(
                created.id,
                TagSetUpdate {
                    tags: Some(vec!["T9".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.tags, vec!["T9".to_string()]);
        assert_eq!(updated.name, "pressures");

        store.delete_tag_set(created.id).await.expect("delete");
        assert!(store.list_tag_sets().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_tag_set_name_conflicts() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        store
            .create_tag_set(make_new_tag_set("pressures"))
            .await
            .expect("first");
        assert!(store.create_tag_set(make_new_tag_set("pressures")).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupted_file_backed_up_and_reset() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join("devices.json"), "not json").expect("write");

        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");
        assert!(store.list_devices().await.expect("list").is_empty());
        assert!(tmp.path().join("devices.json.bak").exists());
    }

    #[tokio::test]
    async fn test_invalid_new_device_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let store = JsonRecordStore::new(tmp.path().to_path_buf())
            .await
            .expect("store");

        let mut bad = make_new_device("BlendB");
        bad.address = "".to_string();
        assert!(store.create_device(bad).await.is_err());
    }
}

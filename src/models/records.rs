use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TrendError;

// ---------------------------------------------------------------------------
// Device records
// ---------------------------------------------------------------------------

/// A known controller, as managed by the record store. Supplies the address
/// used when assembling start parameters for a trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub device_identifier: String,
    pub description: Option<String>,
    pub address: String,
    pub subnet: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub device_identifier: String,
    pub description: Option<String>,
    pub address: String,
    pub subnet: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub device_identifier: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub subnet: Option<String>,
}

pub fn validate_new_device(device: &NewDevice) -> Result<(), TrendError> {
    if device.device_identifier.trim().is_empty() {
        return Err(TrendError::Validation(
            "device_identifier cannot be empty".to_string(),
        ));
    }
    if device.address.trim().is_empty() {
        return Err(TrendError::Validation("address cannot be empty".to_string()));
    }
    Ok(())
}

pub fn validate_device_update(update: &DeviceUpdate) -> Result<(), TrendError> {
    if let Some(ref ident) = update.device_identifier {
        if ident.trim().is_empty() {
            return Err(TrendError::Validation(
                "device_identifier cannot be empty".to_string(),
            ));
        }
    }
    if let Some(ref address) = update.address {
        if address.trim().is_empty() {
            return Err(TrendError::Validation("address cannot be empty".to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tag-set records
// ---------------------------------------------------------------------------

/// A named, ordered list of point identifiers. The order here is the column
/// order of any trend log produced from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSetRecord {
    pub id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTagSet {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSetUpdate {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

pub fn validate_new_tag_set(tag_set: &NewTagSet) -> Result<(), TrendError> {
    if tag_set.name.trim().is_empty() {
        return Err(TrendError::Validation(
            "tag set name cannot be empty".to_string(),
        ));
    }
    validate_tags(&tag_set.tags)
}

pub fn validate_tag_set_update(update: &TagSetUpdate) -> Result<(), TrendError> {
    if let Some(ref name) = update.name {
        if name.trim().is_empty() {
            return Err(TrendError::Validation(
                "tag set name cannot be empty".to_string(),
            ));
        }
    }
    if let Some(ref tags) = update.tags {
        validate_tags(tags)?;
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), TrendError> {
    if tags.is_empty() {
        return Err(TrendError::Validation(
            "tag set must contain at least one tag".to_string(),
        ));
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(TrendError::Validation(
            "tag set cannot contain empty tags".to_string(),
        ));
    }
    Ok(())
}

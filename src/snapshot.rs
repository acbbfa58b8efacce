//! The record store boundary.
//!
//! The store exports its device allocations as JSON arrays. The scheduler
//! never owns these records: every refresh loads a fresh snapshot, merges the
//! exports, and converts them into [`Allocation`]s.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::*;
use crate::timestamp::parse_start;

/// One allocation as the record store writes it.
///
/// The store is loose with types: ids and timestamps show up as strings or
/// numbers, and any field may be `null`. Numbers are kept as their decimal
/// text so `parse_start` reads them as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Device category, e.g. `ECG` or `HA`.
    #[serde(rename = "type", default)]
    pub category: String,
    #[serde(default = "other_status", deserialize_with = "lenient_status")]
    pub status: AllocationStatus,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub install_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub end_time: Option<String>,
}

fn other_status() -> AllocationStatus {
    AllocationStatus::Other
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.as_i64().map_or_else(|| n.to_string(), |v| v.to_string())),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    scalar_text(Value::deserialize(d)?)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

/// Unrecognised, `null` or non-string statuses hold no device.
fn lenient_status<'de, D: Deserializer<'de>>(d: D) -> Result<AllocationStatus, D::Error> {
    Ok(AllocationStatus::deserialize(Value::deserialize(d)?).unwrap_or(AllocationStatus::Other))
}

/// Parse one exported JSON array, dropping elements that are not records.
///
/// Only a document that is not an array at all is an error.
pub fn parse_export(bytes: &[u8]) -> Result<Vec<AllocationRecord>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_slice(bytes)?;
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match AllocationRecord::deserialize(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                metrics::counter!(crate::observability::MALFORMED_RECORDS_TOTAL).increment(1);
                tracing::debug!(index, error = %e, "skipping malformed allocation record");
            }
        }
    }
    Ok(records)
}

impl AllocationRecord {
    pub fn to_allocation(&self, offset: FixedOffset) -> Allocation {
        let start = self
            .install_date
            .as_deref()
            .and_then(|raw| parse_start(raw, offset));
        if start.is_none() && self.status.participates() {
            metrics::counter!(crate::observability::MALFORMED_RECORDS_TOTAL).increment(1);
            tracing::debug!(
                id = %self.id,
                raw = ?self.install_date,
                "allocation start missing or unparseable"
            );
        }
        Allocation {
            id: self.id.clone(),
            category: self.category.trim().to_string(),
            start,
            status: self.status,
        }
    }
}

/// Merge exports, later records replacing earlier ones with the same id.
/// First-seen order is kept so summaries are stable across refreshes.
pub fn merge_records(exports: impl IntoIterator<Item = Vec<AllocationRecord>>) -> Vec<AllocationRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<AllocationRecord> = Vec::new();
    for record in exports.into_iter().flatten() {
        match index.get(&record.id) {
            Some(&pos) => merged[pos] = record,
            None => {
                index.insert(record.id.clone(), merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

/// Anything that can hand over the current allocation snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Vec<AllocationRecord>, SnapshotError>;
}

/// One or more JSON array files written by the record store.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    paths: Vec<PathBuf>,
}

impl JsonFileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

#[async_trait]
impl SnapshotSource for JsonFileSource {
    async fn load(&self) -> Result<Vec<AllocationRecord>, SnapshotError> {
        let mut exports = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| SnapshotError::Io(path.clone(), e))?;
            let records = parse_export(&bytes).map_err(|e| SnapshotError::Json(path.clone(), e))?;
            exports.push(records);
        }
        Ok(merge_records(exports))
    }
}

/// Fixed in-memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<AllocationRecord>,
}

impl StaticSource {
    pub fn new(records: Vec<AllocationRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn load(&self) -> Result<Vec<AllocationRecord>, SnapshotError> {
        Ok(self.records.clone())
    }
}

#[derive(Debug)]
pub enum SnapshotError {
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io(path, e) => write!(f, "cannot read {}: {e}", path.display()),
            SnapshotError::Json(path, e) => write!(f, "bad snapshot {}: {e}", path.display()),
        }
    }
}

impl std::error::Error for SnapshotError {}

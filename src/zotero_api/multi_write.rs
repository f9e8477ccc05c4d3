//! Reconciliation of batch writes.
//!
//! A batch `POST`/`PATCH` answers with a report that partitions the indices of
//! the submitted entities into three groups:
//!
//! ```json
//! {
//!   "successful": { "0": { "key": "ABCD1111", "version": 1337, "data": { ... } } },
//!   "success":    { "0": "ABCD1111" },
//!   "unchanged":  { "4": "ABCD3333" },
//!   "failed":     { "1": { "key": "ABCD4444", "code": 400, "message": "Bad input" } }
//! }
//! ```
//!
//! [`MultiWriteResponse`] lines this report up with the submitted batch so
//! callers can look entities up by position or by key.

use std::collections::{BTreeMap, HashMap};

use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::zotero_api::{response::ResponseHead, types::ResponseError};

/// Why the server rejected one entity of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    #[serde(default)]
    pub key: Option<String>,
    pub code: u16,
    pub message: String,
}

/// Outcome of a single index of a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Successful,
    Unchanged,
    Failed(WriteFailure),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityLookupError {
    #[error("Entity at index {index} failed with {}: {}", .failure.code, .failure.message)]
    Failed { index: usize, failure: WriteFailure },

    #[error("Index {index} is not present in the response of {len} entities")]
    OutOfRange { index: usize, len: usize },

    #[error("Key {0} is not present in the request")]
    UnknownKey(String),
}

#[derive(Debug, Default, Deserialize)]
struct WriteReport {
    #[serde(default)]
    successful: BTreeMap<String, Value>,
    #[serde(default)]
    success: BTreeMap<String, Value>,
    #[serde(default)]
    unchanged: BTreeMap<String, Value>,
    #[serde(default)]
    failed: BTreeMap<String, WriteFailure>,
}

/// A batch write, reconciled against the batch that was submitted.
#[derive(Debug, Clone)]
pub struct MultiWriteResponse {
    head: ResponseHead,
    entities: Vec<Value>,
    statuses: Vec<EntryStatus>,
    submitted_keys: Vec<Option<String>>,
}

impl MultiWriteResponse {
    pub(crate) fn reconcile(
        head: ResponseHead,
        submitted: Vec<Value>,
        body: Option<Value>,
    ) -> Result<Self, ResponseError> {
        let report: WriteReport = match body {
            Some(body) => serde_json::from_value(body).map_err(ResponseError::InvalidWriteReport)?,
            None => WriteReport::default(),
        };
        let len = submitted.len();
        let mut statuses: Vec<Option<EntryStatus>> = vec![None; len];
        let mut updates = HashMap::new();

        for (raw, update) in report.successful {
            let index = parse_index(&raw, len)?;
            assign(&mut statuses, index, EntryStatus::Successful)?;
            updates.insert(index, update);
        }
        // `success` repeats the indices of `successful` (index -> key only)
        for raw in report.success.keys() {
            let index = parse_index(raw, len)?;
            if statuses[index] != Some(EntryStatus::Successful) {
                assign(&mut statuses, index, EntryStatus::Successful)?;
            }
        }
        for raw in report.unchanged.keys() {
            let index = parse_index(raw, len)?;
            assign(&mut statuses, index, EntryStatus::Unchanged)?;
        }
        for (raw, failure) in report.failed {
            let index = parse_index(&raw, len)?;
            assign(&mut statuses, index, EntryStatus::Failed(failure))?;
        }

        let version = head.last_modified_version();
        let submitted_keys = submitted
            .iter()
            .map(|entity| entity.get("key").and_then(Value::as_str).map(str::to_owned))
            .collect();
        let statuses: Vec<EntryStatus> = statuses
            .into_iter()
            .enumerate()
            .map(|(index, status)| {
                status.unwrap_or_else(|| {
                    log::warn!("Write report does not mention index {}, treating it as unchanged", index);
                    EntryStatus::Unchanged
                })
            })
            .collect();
        let entities = submitted
            .into_iter()
            .zip(&statuses)
            .enumerate()
            .map(|(index, (original, status))| match status {
                EntryStatus::Successful => apply_update(original, updates.remove(&index), version),
                EntryStatus::Unchanged | EntryStatus::Failed(_) => original,
            })
            .collect();

        let response = Self {
            head,
            entities,
            statuses,
            submitted_keys,
        };
        log::debug!(
            "Reconciled batch of {} entities, {} failed",
            response.len(),
            response.errors().len()
        );
        Ok(response)
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// `true` if no entity of the batch failed.
    pub fn is_success(&self) -> bool {
        !self
            .statuses
            .iter()
            .any(|status| matches!(status, EntryStatus::Failed(_)))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// One entity per submitted entity, in submission order.
    ///
    /// Successful entries carry the server's data and the new library version,
    /// unchanged and failed ones are returned exactly as submitted.
    pub fn data(&self) -> &[Value] {
        &self.entities
    }

    pub fn into_data(self) -> Vec<Value> {
        self.entities
    }

    pub fn statuses(&self) -> &[EntryStatus] {
        &self.statuses
    }

    /// Failures by batch index.
    pub fn errors(&self) -> BTreeMap<usize, &WriteFailure> {
        self.statuses
            .iter()
            .enumerate()
            .filter_map(|(index, status)| match status {
                EntryStatus::Failed(failure) => Some((index, failure)),
                _ => None,
            })
            .collect()
    }

    pub fn entity_by_index(&self, index: usize) -> Result<&Value, EntityLookupError> {
        match self.statuses.get(index) {
            None => Err(EntityLookupError::OutOfRange {
                index,
                len: self.len(),
            }),
            Some(EntryStatus::Failed(failure)) => Err(EntityLookupError::Failed {
                index,
                failure: failure.clone(),
            }),
            Some(_) => Ok(&self.entities[index]),
        }
    }

    /// Looks the key up in the submitted batch, not in the response.
    pub fn entity_by_key(&self, key: &str) -> Result<&Value, EntityLookupError> {
        let index = self
            .submitted_keys
            .iter()
            .position(|submitted| submitted.as_deref() == Some(key))
            .ok_or_else(|| EntityLookupError::UnknownKey(key.into()))?;
        self.entity_by_index(index)
    }
}

fn parse_index(raw: &str, len: usize) -> Result<usize, ResponseError> {
    let index = raw
        .parse::<usize>()
        .map_err(|_| ResponseError::InvalidIndex(raw.into()))?;
    if index >= len {
        return Err(ResponseError::IndexOutOfBatch { index, len });
    }
    Ok(index)
}

fn assign(
    statuses: &mut [Option<EntryStatus>],
    index: usize,
    status: EntryStatus,
) -> Result<(), ResponseError> {
    let slot = &mut statuses[index];
    if slot.is_some() {
        return Err(ResponseError::OverlappingIndex(index));
    }
    *slot = Some(status);
    Ok(())
}

/// Overlays the server's view of a written entity onto the submitted one.
fn apply_update(original: Value, update: Option<Value>, version: Option<u64>) -> Value {
    let mut entity = match original {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let mut entry_version = None;
    if let Some(Value::Object(mut update)) = update {
        entry_version = update.get("version").and_then(Value::as_u64);
        let fields = match update.remove("data") {
            Some(Value::Object(data)) => data,
            _ => update,
        };
        entity.extend(fields);
    }
    if let Some(version) = version.or(entry_version) {
        entity.insert("version".into(), version.into());
    }
    Value::Object(entity)
}

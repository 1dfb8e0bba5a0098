//! Property-path evaluation for result records.
//!
//! Paths use a deliberately small JSONPath subset: dotted member access
//! (`$.a.b` or a bare `a.b`) with optional numeric indexes
//! (`$.items[0].name`). Wildcards, filters, slices, quoted keys and
//! recursive descent are rejected, so a path outside the subset resolves to
//! nothing instead of to the wrong field. Scalars are rendered as strings;
//! objects and arrays are rejected.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CollectError;
use crate::orchestrator::{ResourceRecord, ResultBatch};
use crate::platform::Dimension;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment<'_>>> {
    let trimmed = path.trim();
    let body = trimmed
        .strip_prefix("$.")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    if body.is_empty() {
        return Some(Vec::new());
    }

    let mut segments = Vec::new();
    for part in body.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return None;
        }
        if key.contains(['*', '?', '@', '\'', '"', ']']) {
            return None;
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']')?;
            segments.push(Segment::Index(inner[..end].trim().parse().ok()?));
            rest = &inner[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(segments)
}

/// Whether `path` lies inside the supported subset.
pub fn is_supported_path(path: &str) -> bool {
    parse_path(path).is_some()
}

/// Evaluate `path` against `value`, returning a non-empty scalar as text.
pub fn json_path_value(value: &Value, path: &str) -> Option<String> {
    let segments = parse_path(path)?;
    let mut current = value;
    for segment in segments {
        current = match segment {
            Segment::Key(key) => current.get(key)?,
            Segment::Index(i) => current.get(i)?,
        };
    }

    let text = match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// A record with its identity fields resolved, as persisted downstream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    pub platform: String,
    pub account_id: String,
    pub region: String,
    pub resource_type: String,
    pub resource_type_name: String,
    pub group: String,
    pub resource_id: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub trace_id: String,
    pub payload: Value,
}

impl ResourceInstance {
    /// Resolve the identity of one record of `batch`.
    ///
    /// Global resources fall back to the account id for a missing id or
    /// name; a regional record without an id is rejected.
    pub fn from_record(batch: &ResultBatch, record: &ResourceRecord) -> Result<Self, CollectError> {
        let paths = &batch.field_paths;
        let global = batch.dimension == Dimension::Global;
        let fallback = || global.then(|| batch.labels.account_id.clone());

        let resource_id = json_path_value(&record.payload, &paths.resource_id)
            .or_else(fallback)
            .ok_or_else(|| CollectError::MissingResourceId {
                path: paths.resource_id.clone(),
            })?;
        let resource_name = json_path_value(&record.payload, &paths.resource_name)
            .or_else(fallback)
            .unwrap_or_else(|| resource_id.clone());
        let address = paths
            .address
            .as_deref()
            .and_then(|p| json_path_value(&record.payload, p));

        Ok(Self {
            platform: batch.platform.clone(),
            account_id: batch.labels.account_id.clone(),
            region: batch.labels.region.clone(),
            resource_type: record.resource_type.clone(),
            resource_type_name: batch.resource_type_name.clone(),
            group: batch.group.clone(),
            resource_id,
            resource_name,
            address,
            trace_id: batch.labels.trace_id.clone(),
            payload: record.payload.clone(),
        })
    }
}

/// Resolve every record of a batch, dropping (and logging) the ones
/// without an id.
pub fn resolve_batch(batch: &ResultBatch) -> Vec<ResourceInstance> {
    batch
        .records
        .iter()
        .filter_map(|record| match ResourceInstance::from_record(batch, record) {
            Ok(instance) => Some(instance),
            Err(e) => {
                warn!("{} dropping record: {}", batch.labels, e);
                None
            }
        })
        .collect()
}

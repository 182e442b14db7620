//! Chunk records and the ingestion contract.
//!
//! Chunks are produced by an external extraction step and arrive as a JSON
//! array (`all_chunks.json`). Every record is validated up front so that a
//! malformed entry never reaches the vocabulary or the graph.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};

/// Section id used when no heading could be found for a chunk.
pub const UNKNOWN_SECTION: &str = "UNKNOWN_SECTION";

/// Unique chunk identifier.
pub type ChunkId = String;

/// One unit of manual text with its structural and domain metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable id derived from page ordering (e.g. `ch_00042`)
    pub chunk_id: ChunkId,
    /// Raw extracted text
    pub text: String,
    /// Dotted section path or [`UNKNOWN_SECTION`]
    pub section_id: String,
    /// Engineering identifiers mentioned in the text
    pub signal_ids: BTreeSet<String>,
    /// Normalized change-order tags (`ECO-0105`)
    pub eco_ids: BTreeSet<String>,
    /// Associated image files
    pub image_paths: Vec<String>,
}

impl ChunkRecord {
    pub fn new(
        chunk_id: impl Into<String>,
        text: impl Into<String>,
        section_id: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            text: text.into(),
            section_id: section_id.into(),
            signal_ids: BTreeSet::new(),
            eco_ids: BTreeSet::new(),
            image_paths: Vec::new(),
        }
    }

    pub fn with_signals<I, S>(mut self, signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signal_ids.extend(signals.into_iter().map(Into::into));
        self
    }

    pub fn with_ecos<I, S>(mut self, ecos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eco_ids.extend(ecos.into_iter().map(Into::into));
        self
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_paths.extend(images.into_iter().map(Into::into));
        self
    }

    /// Check the invariants a record must satisfy regardless of where it came from.
    pub fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidRecord { index, reason };

        if self.chunk_id.trim().is_empty() {
            return Err(invalid("chunk_id is blank".to_string()));
        }
        if self.section_id.trim().is_empty() {
            return Err(invalid("section_id is blank".to_string()));
        }
        if let Some(blank) = self
            .signal_ids
            .iter()
            .chain(self.eco_ids.iter())
            .find(|id| id.trim().is_empty())
        {
            return Err(invalid(format!("blank identifier {:?}", blank)));
        }
        Ok(())
    }
}

/// Validate a whole corpus: per-record invariants plus unique chunk ids.
pub fn validate_records(records: &[ChunkRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        record.validate(index)?;
        if !seen.insert(record.chunk_id.as_str()) {
            return Err(Error::InvalidRecord {
                index,
                reason: format!("duplicate chunk_id {}", record.chunk_id),
            });
        }
    }
    Ok(())
}

/// Parse and validate an `all_chunks.json` document.
pub fn parse_records(json: &str) -> Result<Vec<ChunkRecord>> {
    let value: Value = serde_json::from_str(json)?;
    let items = value.as_array().ok_or_else(|| Error::InvalidRecord {
        index: 0,
        reason: "expected a JSON array of chunk records".to_string(),
    })?;

    let records = items
        .iter()
        .enumerate()
        .map(|(index, item)| record_from_value(index, item))
        .collect::<Result<Vec<_>>>()?;

    validate_records(&records)?;
    Ok(records)
}

/// Load chunk records from disk.
pub fn load_chunks<P: AsRef<Path>>(path: P) -> Result<Vec<ChunkRecord>> {
    let content = fs::read_to_string(path.as_ref())?;
    let records = parse_records(&content)?;
    info!(
        "Loaded {} chunk records from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}

fn record_from_value(index: usize, item: &Value) -> Result<ChunkRecord> {
    let object = item.as_object().ok_or_else(|| Error::InvalidRecord {
        index,
        reason: "record is not a JSON object".to_string(),
    })?;

    Ok(ChunkRecord {
        chunk_id: required_string(object, index, "chunk_id")?,
        text: required_string(object, index, "text")?,
        section_id: required_string(object, index, "section_id")?,
        signal_ids: string_list(object, index, "signal_ids")?
            .ok_or(Error::MissingField {
                index,
                field: "signal_ids",
            })?
            .into_iter()
            .collect(),
        eco_ids: string_list(object, index, "eco_ids")?
            .ok_or(Error::MissingField {
                index,
                field: "eco_ids",
            })?
            .into_iter()
            .collect(),
        image_paths: string_list(object, index, "image_paths")?.unwrap_or_default(),
    })
}

fn required_string(object: &Map<String, Value>, index: usize, field: &'static str) -> Result<String> {
    match object.get(field) {
        None | Some(Value::Null) => Err(Error::MissingField { index, field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::InvalidRecord {
            index,
            reason: format!("`{}` must be a string, got {}", field, type_name(other)),
        }),
    }
}

fn string_list(
    object: &Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<Option<Vec<String>>> {
    let items = match object.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(Error::InvalidRecord {
                index,
                reason: format!("`{}` must be an array, got {}", field, type_name(other)),
            })
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            other => Err(Error::InvalidRecord {
                index,
                reason: format!(
                    "`{}` entries must be strings, got {}",
                    field,
                    type_name(other)
                ),
            }),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

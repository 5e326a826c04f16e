//! Record store: the loaded founder records, replaced wholesale on every load.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::models::{FieldValue, Record};

/// A record as handed over by the ingestion pipeline, before validation.
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub id: Option<String>,
    pub fields: Vec<(String, FieldValue)>,
}

impl RecordInput {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldValue::Text(value.into()))
    }
}

/// One load generation of the store. Never mutated once published.
#[derive(Debug, Default)]
pub struct StoreSnapshot {
    generation: u64,
    records: Vec<Arc<Record>>,
    by_id: HashMap<String, usize>,
}

impl StoreSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<Arc<Record>> {
        self.by_id
            .get(id)
            .map(|&i| Arc::clone(&self.records[i]))
            .ok_or_else(|| RagError::NotFound(id.to_string()))
    }

    /// Records in load order. Can be called any number of times.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.iter().map(|r| r.as_ref())
    }
}

/// Holds the current [`StoreSnapshot`] behind a swappable handle.
#[derive(Debug, Default)]
pub struct RecordStore {
    current: RwLock<Arc<StoreSnapshot>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `inputs` and replace the whole store. Returns the new
    /// generation. On error the previous contents stay visible.
    pub fn load(&self, inputs: Vec<RecordInput>) -> Result<u64> {
        let snapshot = Arc::new(self.prepare(inputs)?);
        let generation = snapshot.generation;
        self.publish(snapshot);
        Ok(generation)
    }

    /// Validate `inputs` into the next generation without making it
    /// visible. Ids must be non-blank and unique, and may not contain
    /// whitespace, commas or brackets since answers cite them as `[id]`.
    pub fn prepare(&self, inputs: Vec<RecordInput>) -> Result<StoreSnapshot> {
        let mut records = Vec::with_capacity(inputs.len());
        let mut by_id = HashMap::with_capacity(inputs.len());

        for (position, input) in inputs.into_iter().enumerate() {
            let id = match input.id.map(|s| s.trim().to_string()) {
                Some(id) if !id.is_empty() => id,
                _ => {
                    return Err(RagError::InvalidRecord(format!(
                        "record at position {position} has no identifier"
                    )))
                }
            };
            if id.contains(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']')) {
                return Err(RagError::InvalidRecord(format!(
                    "identifier '{id}' cannot be used as a citation marker"
                )));
            }
            if by_id.insert(id.clone(), records.len()).is_some() {
                return Err(RagError::InvalidRecord(format!("duplicate identifier '{id}'")));
            }
            records.push(Arc::new(Record::new(id, input.fields)));
        }

        Ok(StoreSnapshot {
            generation: self.generation() + 1,
            records,
            by_id,
        })
    }

    /// Make `snapshot` the current generation. Older snapshots never
    /// replace newer ones.
    pub fn publish(&self, snapshot: Arc<StoreSnapshot>) {
        let mut current = self.current.write();
        if snapshot.generation < current.generation {
            tracing::warn!(
                "Ignoring store generation {} older than current {}",
                snapshot.generation,
                current.generation
            );
            return;
        }
        *current = snapshot;
        tracing::info!(
            "Record store published {} records (generation {})",
            current.len(),
            current.generation
        );
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn get(&self, id: &str) -> Result<Arc<Record>> {
        self.snapshot().get(id)
    }

    /// All records of the current generation, in load order.
    pub fn all(&self) -> Records {
        Records(self.snapshot())
    }
}

/// Restartable view over one store generation.
#[derive(Debug, Clone)]
pub struct Records(Arc<StoreSnapshot>);

impl From<Arc<StoreSnapshot>> for Records {
    fn from(snapshot: Arc<StoreSnapshot>) -> Self {
        Self(snapshot)
    }
}

impl Records {
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        self.0.iter()
    }

    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read a JSON array of objects. Each object needs an `id` (string or
/// integer); other values must be strings, numbers, booleans or null
/// (nulls are skipped).
pub fn read_records_file(path: &Path) -> Result<Vec<RecordInput>> {
    let data = std::fs::read_to_string(path)?;
    parse_records_json(&data)
}

pub fn parse_records_json(data: &str) -> Result<Vec<RecordInput>> {
    let rows: Vec<Value> = serde_json::from_str(data)?;
    rows.into_iter()
        .enumerate()
        .map(|(position, row)| {
            let Value::Object(map) = row else {
                return Err(RagError::InvalidRecord(format!(
                    "row {position} is not a JSON object"
                )));
            };

            let mut input = RecordInput::default();
            for (key, value) in map {
                if key == "id" {
                    input.id = match value {
                        Value::String(s) => Some(s),
                        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                        other => {
                            return Err(RagError::InvalidRecord(format!(
                                "row {position} has an unusable id: {other}"
                            )))
                        }
                    };
                    continue;
                }
                let value = match value {
                    Value::Null => continue,
                    Value::String(s) => FieldValue::Text(s),
                    Value::Bool(b) => FieldValue::Text(b.to_string()),
                    Value::Number(n) => match n.as_f64() {
                        Some(f) => FieldValue::Number(f),
                        None => FieldValue::Text(n.to_string()),
                    },
                    Value::Array(_) | Value::Object(_) => {
                        return Err(RagError::InvalidRecord(format!(
                            "row {position} field '{key}' is not a scalar"
                        )))
                    }
                };
                input.fields.push((key, value));
            }
            Ok(input)
        })
        .collect()
}

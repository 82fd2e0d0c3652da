//! Physical → internal page mapping produced at ingestion time

use genesis_common::errors::Result;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Maps a printed (physical) page number to the internal page index used
/// by the page markers in the extracted text.
///
/// Keys are normalised to `u32` at construction; the ingestion artifact may
/// carry them as JSON strings or integers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMapping {
    entries: HashMap<u32, u32>,
}

impl PageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `page_mapping.json` artifact.
    ///
    /// Entries whose key or value is not a non-negative integer (or a string
    /// holding one) are skipped with a warning rather than failing the load.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            warn!("Page mapping is not a JSON object, ignoring it");
            return Ok(Self::default());
        };

        let mut entries = HashMap::with_capacity(map.len());
        for (key, value) in map {
            match (key.trim().parse::<u32>().ok(), as_page_index(&value)) {
                (Some(physical), Some(internal)) => {
                    entries.insert(physical, internal);
                }
                _ => warn!(key = %key, value = %value, "Skipping malformed page mapping entry"),
            }
        }

        Ok(Self { entries })
    }

    pub fn insert(&mut self, physical: u32, internal: u32) {
        self.entries.insert(physical, internal);
    }

    /// Internal index for a printed page number
    pub fn get(&self, physical: u32) -> Option<u32> {
        self.entries.get(&physical).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u32, u32)> for PageMapping {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn as_page_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

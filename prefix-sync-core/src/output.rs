//! Reshapes NetBox prefix listings into Terraform-friendly JSON documents.
//!
//! An input descriptor names a set of lookups, each a NetBox filter map:
//!
//! ```json
//! { "lookup_prefixes": { "core": { "site": "dc1", "role": "core" } } }
//! ```
//!
//! [`build_list_output`] queries each lookup and produces
//!
//! ```json
//! { "output": { "<file>_core": { "value": [ { "prefix": "...", "description": "..." } ] } } }
//! ```
//!
//! Lookups with no results produce no key at all.

use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::contract::{Filters, Inventory};
use crate::error::OutputError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Lookup name to NetBox filter map. Every value must be a JSON object.
    #[serde(deserialize_with = "filter_maps")]
    pub lookup_prefixes: Map<String, Value>,
}

fn filter_maps<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let lookups = Map::<String, Value>::deserialize(deserializer)?;
    if let Some((lookup, _)) = lookups.iter().find(|(_, filters)| !filters.is_object()) {
        return Err(D::Error::custom(format!(
            "filters for lookup '{lookup}' must be a JSON object"
        )));
    }
    Ok(lookups)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixEntry {
    pub prefix: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupOutput {
    pub value: Vec<PrefixEntry>,
}

/// `{ "output": { key: { "value": [...] } } }` with keys in lookup order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    #[serde(with = "ordered_entries")]
    output: Vec<(String, LookupOutput)>,
}

impl OutputDocument {
    /// Insert or replace `key`. A new key goes last.
    pub fn insert(&mut self, key: String, lookup: LookupOutput) {
        match self.output.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = lookup,
            None => self.output.push((key, lookup)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&LookupOutput> {
        self.output.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.output.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}

/// JSON object <-> ordered `(key, LookupOutput)` pairs.
mod ordered_entries {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    use super::LookupOutput;

    pub fn serialize<S>(entries: &[(String, LookupOutput)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, LookupOutput)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, LookupOutput)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of lookup outputs")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, LookupOutput>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Shape of a NetBox prefix listing that the builder relies on.
#[derive(Debug, Deserialize)]
struct PrefixListing {
    results: Vec<PrefixEntry>,
}

/// Result count of a listing payload. Anything but a JSON object is an error;
/// HTTP failures from NetBox decode to the empty string.
fn result_count(lookup: &str, payload: &Value) -> Result<u64, OutputError> {
    match payload {
        Value::Object(listing) => Ok(listing.get("count").and_then(Value::as_u64).unwrap_or(0)),
        other => Err(OutputError::UnexpectedPayload {
            lookup: lookup.to_string(),
            payload: other.to_string(),
        }),
    }
}

pub async fn build_list_output<I>(
    inventory: &I,
    input: &InputDescriptor,
    filename_key: &str,
) -> Result<OutputDocument, OutputError>
where
    I: Inventory + ?Sized,
{
    let mut document = OutputDocument::default();

    for (lookup, filters) in &input.lookup_prefixes {
        let filters: Filters = match filters {
            Value::Object(map) => map.clone(),
            _ => {
                return Err(OutputError::InvalidFilters {
                    lookup: lookup.clone(),
                })
            }
        };
        let payload = inventory
            .get_prefixes(&filters)
            .await
            .map_err(|source| OutputError::Inventory {
                lookup: lookup.clone(),
                source,
            })?;

        let count = result_count(lookup, &payload)?;
        if count == 0 {
            debug!(lookup = %lookup, "No prefixes matched, skipping lookup");
            continue;
        }

        let listing: PrefixListing =
            serde_json::from_value(payload).map_err(|source| OutputError::MalformedResult {
                lookup: lookup.clone(),
                source,
            })?;
        if listing.results.is_empty() {
            warn!(lookup = %lookup, count, "Listing reports matches but carries no results, skipping lookup");
            continue;
        }

        let key = format!("{filename_key}_{lookup}");
        info!(key = %key, count, results = listing.results.len(), "Built lookup output");
        document.insert(
            key,
            LookupOutput {
                value: listing.results,
            },
        );
    }

    Ok(document)
}

pub fn read_input(path: &Path) -> Result<InputDescriptor, OutputError> {
    let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| OutputError::InvalidInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty JSON with four-space indentation and no trailing newline.
pub fn render_output(document: &OutputDocument) -> Result<Vec<u8>, OutputError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    Ok(buf)
}

pub fn write_output(path: &Path, document: &OutputDocument) -> Result<Vec<u8>, OutputError> {
    let rendered = render_output(document)?;
    fs::write(path, &rendered).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rendered)
}

pub fn read_output(path: &Path) -> Result<OutputDocument, OutputError> {
    let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

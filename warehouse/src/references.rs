use crate::errors::{Result, WarehouseError};
use crate::session::SessionProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One externally granted object visible to this service.
///
/// `identifier` is the opaque token used to address the object in later
/// statements. The three metadata fields are either all present (details
/// query variant) or all absent (ids-only variant).
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ReferenceDescriptor {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
}

impl ReferenceDescriptor {
    pub fn bare(identifier: String) -> Self {
        ReferenceDescriptor {
            identifier,
            owning_database: None,
            owning_schema: None,
            object_name: None,
        }
    }
}

/// Cardinality of a reference, derived purely from the grant count.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    None,
    SingleValued,
    MultiValued,
}

/// All grants for one reference name at one point in time.
///
/// Never cached: grants can change between calls, so the cardinality is
/// recomputed on every resolution.
#[derive(Clone, Debug, Serialize)]
pub struct ReferenceSet {
    reference_name: String,
    descriptors: Vec<ReferenceDescriptor>,
}

impl ReferenceSet {
    pub fn new(reference_name: String, descriptors: Vec<ReferenceDescriptor>) -> Self {
        ReferenceSet {
            reference_name,
            descriptors,
        }
    }

    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    pub fn descriptors(&self) -> &[ReferenceDescriptor] {
        &self.descriptors
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.descriptors
            .iter()
            .map(|d| d.identifier.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.descriptors.len() {
            0 => Cardinality::None,
            1 => Cardinality::SingleValued,
            _ => Cardinality::MultiValued,
        }
    }
}

/// Shape of one record in the details variant of the introspection payload.
#[derive(Deserialize)]
struct DetailRecord {
    alias: String,
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Resolves a symbolic reference name into the current set of granted
/// object identifiers via the warehouse's reference system function.
///
/// One introspection call per invocation, no retries; the caller decides
/// whether to retry.
pub struct ReferenceResolver {
    provider: Arc<SessionProvider>,
}

impl ReferenceResolver {
    pub fn new(provider: Arc<SessionProvider>) -> Self {
        ReferenceResolver { provider }
    }

    /// Resolves with per-identifier metadata (owning database/schema/name).
    pub async fn resolve(&self, reference_name: &str) -> Result<ReferenceSet> {
        validate_reference_name(reference_name)?;
        let payload = self
            .fetch_payload(&format!(
                "SELECT SYSTEM$GET_ALL_REFERENCES('{reference_name}', TRUE)"
            ))
            .await?;

        let descriptors = match payload {
            None => Vec::new(),
            Some(payload) => {
                let records: Vec<DetailRecord> = serde_json::from_str(&payload)
                    .map_err(|source| WarehouseError::ReferenceResolution { payload, source })?;
                records
                    .into_iter()
                    .map(|r| ReferenceDescriptor {
                        identifier: r.alias,
                        owning_database: r.database,
                        owning_schema: r.schema,
                        object_name: r.name,
                    })
                    .collect()
            }
        };

        Ok(ReferenceSet::new(reference_name.to_string(), descriptors))
    }

    /// Resolves identifiers only, without metadata.
    pub async fn resolve_ids(&self, reference_name: &str) -> Result<ReferenceSet> {
        validate_reference_name(reference_name)?;
        let payload = self
            .fetch_payload(&format!(
                "SELECT SYSTEM$GET_ALL_REFERENCES('{reference_name}')"
            ))
            .await?;

        let descriptors = match payload {
            None => Vec::new(),
            Some(payload) => {
                let identifiers: Vec<String> = serde_json::from_str(&payload)
                    .map_err(|source| WarehouseError::ReferenceResolution { payload, source })?;
                identifiers
                    .into_iter()
                    .map(ReferenceDescriptor::bare)
                    .collect()
            }
        };

        Ok(ReferenceSet::new(reference_name.to_string(), descriptors))
    }

    /// Runs the introspection statement and extracts the single text cell.
    ///
    /// A NULL or blank cell is the normal "nothing granted yet" state and
    /// comes back as `None`, never as an error.
    async fn fetch_payload(&self, statement: &str) -> Result<Option<String>> {
        let result = self.provider.execute(statement).await?;

        let payload = match result.single_cell() {
            Some(serde_json::Value::String(text)) => text.trim().to_string(),
            Some(serde_json::Value::Null) | None => return Ok(None),
            Some(other) => other.to_string(),
        };

        if payload.is_empty() {
            return Ok(None);
        }
        Ok(Some(payload))
    }
}

/// Reference names are interpolated into statements, so they are held to
/// plain identifier characters before any statement is built.
pub fn validate_reference_name(reference_name: &str) -> Result<()> {
    let valid = !reference_name.is_empty()
        && reference_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidReferenceName(
            reference_name.to_string(),
        ))
    }
}

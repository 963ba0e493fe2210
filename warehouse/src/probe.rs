use crate::errors::Result;
use crate::references::{ReferenceResolver, ReferenceSet};
use crate::session::{ColumnInfo, SessionProvider, StatementResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of probing one granted table.
///
/// Exactly one of the two shapes holds: `accessible=true` with row count,
/// columns, and sample rows populated, or `accessible=false` with `error`
/// populated. Values are never mutated after construction.
#[derive(Clone, Debug, Serialize)]
pub struct TableProbeResult {
    pub identifier: String,
    pub accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnInfo>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sample_rows: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableProbeResult {
    fn accessible(
        identifier: &str,
        row_count: u64,
        columns: Vec<ColumnInfo>,
        sample_rows: Vec<Map<String, Value>>,
    ) -> Self {
        TableProbeResult {
            identifier: identifier.to_string(),
            accessible: true,
            row_count: Some(row_count),
            columns: Some(columns),
            sample_rows,
            error: None,
        }
    }

    fn failed(identifier: &str, error: String) -> Self {
        TableProbeResult {
            identifier: identifier.to_string(),
            accessible: false,
            row_count: None,
            columns: None,
            sample_rows: Vec::new(),
            error: Some(error),
        }
    }
}

/// One resolve-then-probe-everything pass over a reference.
#[derive(Debug, Serialize)]
pub struct BatchProbe {
    pub reference: ReferenceSet,
    pub results: Vec<TableProbeResult>,
}

impl BatchProbe {
    /// Connected means "something is granted", not "every probe worked".
    /// Partial accessibility is a valid, reportable state.
    pub fn connected(&self) -> bool {
        !self.reference.is_empty()
    }

    pub fn accessible_count(&self) -> usize {
        self.results.iter().filter(|r| r.accessible).count()
    }
}

/// Probes granted tables through the `REFERENCE('<name>', '<id>')`
/// addressing form: row count, a bounded row sample, then a describe for
/// column name/type/nullability.
pub struct TableProber {
    provider: Arc<SessionProvider>,
    resolver: ReferenceResolver,
}

impl TableProber {
    pub fn new(provider: Arc<SessionProvider>) -> Self {
        let resolver = ReferenceResolver::new(provider.clone());
        TableProber { provider, resolver }
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    /// Probes one identifier. Every failure past this point is captured in
    /// the result record; a revoked or renamed grant must not take down
    /// the probing of its siblings.
    pub async fn probe(
        &self,
        reference_name: &str,
        identifier: &str,
        sample_limit: usize,
    ) -> TableProbeResult {
        match self.try_probe(reference_name, identifier, sample_limit).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    reference = %reference_name,
                    identifier = %identifier,
                    error = %e,
                    "table probe failed"
                );
                TableProbeResult::failed(identifier, e.to_string())
            }
        }
    }

    /// Resolves the reference and probes every identifier in resolved
    /// order. Individual probe failures are entries in the result list,
    /// never errors; only resolution itself can fail here.
    pub async fn probe_all(
        &self,
        reference_name: &str,
        sample_limit: usize,
    ) -> Result<BatchProbe> {
        let reference = self.resolver.resolve(reference_name).await?;

        let mut results = Vec::with_capacity(reference.len());
        for descriptor in reference.descriptors() {
            results.push(
                self.probe(reference_name, &descriptor.identifier, sample_limit)
                    .await,
            );
        }

        Ok(BatchProbe { reference, results })
    }

    async fn try_probe(
        &self,
        reference_name: &str,
        identifier: &str,
        sample_limit: usize,
    ) -> Result<TableProbeResult> {
        crate::references::validate_reference_name(reference_name)?;
        let table = reference_expr(reference_name, identifier);

        let count_result = self
            .provider
            .execute(&format!("SELECT COUNT(*) FROM {table}"))
            .await?;
        let row_count = parse_count(&count_result);

        let sample = self
            .provider
            .execute(&format!("SELECT * FROM {table} LIMIT {sample_limit}"))
            .await?;
        let sample_rows = sample.row_maps();

        let described = self
            .provider
            .execute(&format!("DESCRIBE TABLE {table}"))
            .await?;
        let columns = parse_describe(&described);

        Ok(TableProbeResult::accessible(
            identifier,
            row_count,
            columns,
            sample_rows,
        ))
    }
}

fn reference_expr(reference_name: &str, identifier: &str) -> String {
    // Identifiers come from the warehouse but are still quoted: the
    // warehouse treats backslashes as escapes inside string literals, so
    // both backslashes and quotes must be doubled or a stray character
    // would break out of the literal.
    let escaped = identifier.replace('\\', "\\\\").replace('\'', "''");
    format!("REFERENCE('{reference_name}', '{escaped}')")
}

/// The statements API returns count cells as JSON strings or numbers
/// depending on the result serialization; accept both.
fn parse_count(result: &StatementResult) -> u64 {
    match result.single_cell() {
        Some(Value::String(text)) => text.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Extracts column triples from a DESCRIBE result, keeping only real
/// columns (`kind == COLUMN`) and dropping the synthetic comment
/// pseudo-column some describe variants emit.
fn parse_describe(result: &StatementResult) -> Vec<ColumnInfo> {
    result
        .row_maps()
        .into_iter()
        .filter_map(|row| {
            let field = |key: &str| {
                row.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            if let Some(kind) = field("kind")
                && !kind.eq_ignore_ascii_case("COLUMN")
            {
                return None;
            }

            let name = field("name")?;
            if name.eq_ignore_ascii_case("comment") {
                return None;
            }

            Some(ColumnInfo {
                nullable: field("null?").is_none_or(|n| n.eq_ignore_ascii_case("Y")),
                data_type: field("type").unwrap_or_default(),
                name,
            })
        })
        .collect()
}

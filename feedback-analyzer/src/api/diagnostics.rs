//! Diagnostic endpoints reporting warehouse connectivity and grant state.
//!
//! Every endpoint answers 200 with a `{connected, message, ...}` envelope;
//! a warehouse problem shows up as `connected: false`, never as a crash.

use crate::metrics_defs::PROBE_FAILURES;
use crate::service::{AppState, ResponseBody};
use hyper::{Response, StatusCode};
use serde_json::{Value, json};
use shared::http::json_response;
use warehouse::{BatchProbe, TableProbeResult, WarehouseError};

fn disconnected(e: &WarehouseError) -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "connected": false,
            "message": e.to_string(),
        }),
    )
}

/// `GET /test-db-connection`
pub async fn db_connection(state: &AppState) -> Response<ResponseBody> {
    match state.provider.execute("SELECT CURRENT_VERSION()").await {
        Ok(result) => {
            let version = result
                .single_cell()
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            json_response(
                StatusCode::OK,
                &json!({
                    "connected": true,
                    "message": "database connection successful",
                    "version": version,
                }),
            )
        }
        Err(e) => disconnected(&e),
    }
}

/// `GET /test-consumer-tables`
///
/// Uses the ids-only resolution variant: identifiers without owning
/// database/schema metadata.
pub async fn consumer_tables(state: &AppState) -> Response<ResponseBody> {
    let reference_name = &state.settings.consumer_reference;
    let reference = match state.prober.resolver().resolve_ids(reference_name).await {
        Ok(reference) => reference,
        Err(e) => return disconnected(&e),
    };

    let mut results = Vec::with_capacity(reference.len());
    for descriptor in reference.descriptors() {
        results.push(
            state
                .prober
                .probe(
                    reference_name,
                    &descriptor.identifier,
                    state.settings.sample_limit,
                )
                .await,
        );
    }

    let batch = BatchProbe { reference, results };
    count_failures(&batch.results);
    json_response(StatusCode::OK, &envelope(&batch, Vec::new()))
}

/// `GET /test-multi-consumer-tables`
///
/// The richer variant: resolution with details, so each table also
/// reports its owning database, schema, and name.
pub async fn multi_consumer_tables(state: &AppState) -> Response<ResponseBody> {
    let batch = match state
        .prober
        .probe_all(
            &state.settings.consumer_reference,
            state.settings.sample_limit,
        )
        .await
    {
        Ok(batch) => batch,
        Err(e) => return disconnected(&e),
    };

    count_failures(&batch.results);

    // Fold the descriptor metadata into each probe entry.
    let tables: Vec<Value> = batch
        .reference
        .descriptors()
        .iter()
        .zip(batch.results.iter())
        .map(|(descriptor, result)| {
            let mut entry = serde_json::to_value(result).unwrap_or_default();
            if let (Value::Object(map), Some(database)) =
                (&mut entry, &descriptor.owning_database)
            {
                map.insert("owning_database".to_string(), json!(database));
                map.insert("owning_schema".to_string(), json!(descriptor.owning_schema));
                map.insert("object_name".to_string(), json!(descriptor.object_name));
            }
            entry
        })
        .collect();

    json_response(StatusCode::OK, &envelope(&batch, tables))
}

/// `GET /test-feedback-history-table`
pub async fn feedback_history(state: &AppState) -> Response<ResponseBody> {
    match state.store.snapshot(state.settings.sample_limit).await {
        Ok(snapshot) => json_response(
            StatusCode::OK,
            &json!({
                "connected": true,
                "message": format!("{} holds {} rows", state.store.table(), snapshot.row_count),
                "row_count": snapshot.row_count,
                "columns": snapshot.columns,
                "sample_rows": snapshot.sample_rows,
            }),
        ),
        Err(e) => disconnected(&e),
    }
}

fn count_failures(results: &[TableProbeResult]) {
    let failures = results.iter().filter(|r| !r.accessible).count();
    if failures > 0 {
        metrics::counter!(PROBE_FAILURES.name).increment(failures as u64);
    }
}

fn envelope(batch: &BatchProbe, merged_tables: Vec<Value>) -> Value {
    let message = if batch.reference.is_empty() {
        format!(
            "no tables granted under reference {}",
            batch.reference.reference_name()
        )
    } else {
        format!(
            "resolved {} table(s), {} accessible",
            batch.results.len(),
            batch.accessible_count(),
        )
    };

    let tables = if merged_tables.is_empty() && !batch.results.is_empty() {
        serde_json::to_value(&batch.results).unwrap_or_default()
    } else {
        Value::Array(merged_tables)
    };

    json!({
        "connected": batch.connected(),
        "message": message,
        "reference_name": batch.reference.reference_name(),
        "cardinality": batch.reference.cardinality(),
        "table_count": batch.results.len(),
        "tables": tables,
    })
}

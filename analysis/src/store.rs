use crate::analyzer::Sentiment;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use warehouse::{ColumnInfo, SessionProvider, WarehouseError};

/// Count and bounded sample of the feedback-history table, for the
/// diagnostic endpoint.
#[derive(Debug, Serialize)]
pub struct HistorySnapshot {
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Map<String, Value>>,
}

/// Append-only store over the app-owned feedback-history table
/// `(id, customer_feedback, sentiment, summary, created_at)`.
pub struct FeedbackStore {
    provider: Arc<SessionProvider>,
    table: String,
}

impl FeedbackStore {
    pub fn new(provider: Arc<SessionProvider>, table: String) -> Self {
        FeedbackStore { provider, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Appends one analysis result. The id and timestamp come from the
    /// table's own defaults.
    pub async fn record(
        &self,
        text: &str,
        sentiment: Sentiment,
        summary: &str,
    ) -> warehouse::Result<()> {
        let statement = format!(
            "INSERT INTO {} (CUSTOMER_FEEDBACK, SENTIMENT, SUMMARY) VALUES ('{}', '{}', '{}')",
            self.table,
            escape(text),
            sentiment.as_str(),
            escape(summary),
        );

        self.provider.execute(&statement).await?;
        Ok(())
    }

    /// Counts and samples the history table directly by name.
    pub async fn snapshot(&self, sample_limit: usize) -> warehouse::Result<HistorySnapshot> {
        let count_result = self
            .provider
            .execute(&format!("SELECT COUNT(*) FROM {}", self.table))
            .await?;
        let row_count = match count_result.single_cell() {
            Some(Value::String(text)) => text.parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        };

        let sample = self
            .provider
            .execute(&format!(
                "SELECT * FROM {} ORDER BY CREATED_AT DESC LIMIT {sample_limit}",
                self.table
            ))
            .await?;

        Ok(HistorySnapshot {
            row_count,
            columns: sample.columns.clone(),
            sample_rows: sample.row_maps(),
        })
    }
}

/// Validates a table name before it is interpolated into statements.
/// Dotted qualification (`DB.SCHEMA.TABLE`) is allowed.
pub fn validate_table_name(table: &str) -> Result<(), WarehouseError> {
    let valid = !table.is_empty()
        && !table.starts_with('.')
        && !table.ends_with('.')
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(WarehouseError::InvalidReferenceName(table.to_string()))
    }
}

// The warehouse treats backslashes as escapes inside string literals, so
// they must be doubled before quotes are; a trailing backslash would
// otherwise swallow the closing quote and truncate the statement.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "''")
}

use crate::config::WarehouseConfig;
use crate::errors::{Result, WarehouseError};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// One column of a statement result: name, declared type, nullability.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

/// Parsed result of one executed statement.
#[derive(Clone, Debug, Default)]
pub struct StatementResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

impl StatementResult {
    /// First cell of the first row, for single-value results like
    /// `SELECT COUNT(*)` or system function calls.
    pub fn single_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Rows as column-name → value maps, in result order.
    pub fn row_maps(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

#[derive(Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    metadata: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<ColumnInfo>,
}

/// An authenticated session against the warehouse's statements API.
///
/// Holds no server-side state; the HTTP client pools connections
/// internally, so a `Session` is cheap to share and safe to drop at any
/// point without corrupting anything on the warehouse side.
pub struct Session {
    client: reqwest::Client,
    statements_url: url::Url,
    token: String,
    database: Option<String>,
    schema: Option<String>,
    timeout_secs: u64,
}

impl Session {
    fn new(config: &WarehouseConfig, token: String) -> Result<Self> {
        let statements_url = config
            .account_url
            .join(STATEMENTS_PATH)
            .map_err(|e| WarehouseError::Connection(format!("invalid account URL: {e}")))?;

        Ok(Session {
            client: reqwest::Client::new(),
            statements_url,
            token,
            database: config.database.clone(),
            schema: config.schema.clone(),
            timeout_secs: config.statement_timeout_secs,
        })
    }

    /// Executes one SQL statement and collects the full result.
    ///
    /// Transport failures and auth rejections map to
    /// [`WarehouseError::Connection`]; any other non-success status maps to
    /// [`WarehouseError::Statement`] with the warehouse's message.
    pub async fn execute(&self, statement: &str) -> Result<StatementResult> {
        let request = StatementRequest {
            statement,
            timeout: self.timeout_secs,
            database: self.database.as_deref(),
            schema: self.schema.as_deref(),
        };

        let response = self
            .client
            .post(self.statements_url.clone())
            .bearer_auth(&self.token)
            .header(TOKEN_TYPE_HEADER, "OAUTH")
            .json(&request)
            .send()
            .await
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;

        let status = response.status();
        let body: StatementResponse = match status {
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| WarehouseError::Statement(format!("unparseable result: {e}")))?,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(WarehouseError::Connection(format!(
                    "warehouse rejected credentials ({status})"
                )));
            }
            _ => {
                let message = response
                    .json::<StatementResponse>()
                    .await
                    .ok()
                    .and_then(|r| r.message)
                    .unwrap_or_else(|| format!("status {status}"));
                return Err(WarehouseError::Statement(message));
            }
        };

        Ok(StatementResult {
            columns: body.metadata.map(|m| m.row_type).unwrap_or_default(),
            rows: body.data.unwrap_or_default(),
        })
    }
}

/// Owns the process-wide warehouse session.
///
/// Policy: one session per process, created lazily on first `acquire` and
/// reused until `invalidate` drops it (after an auth-class failure). The
/// mutex is held only long enough to clone the `Arc`, so concurrent
/// requests share the handle without serializing their statements.
pub struct SessionProvider {
    config: WarehouseConfig,
    cached: Mutex<Option<Arc<Session>>>,
}

impl SessionProvider {
    pub fn new(config: WarehouseConfig) -> Self {
        SessionProvider {
            config,
            cached: Mutex::new(None),
        }
    }

    /// Returns the shared session, creating it if none is cached.
    ///
    /// Fails with [`WarehouseError::Connection`] when no credential is
    /// available from either the token file or the environment.
    pub async fn acquire(&self) -> Result<Arc<Session>> {
        let mut cached = self.cached.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }

        let token = self.read_token()?;
        let session = Arc::new(Session::new(&self.config, token)?);
        *cached = Some(session.clone());
        tracing::debug!(url = %self.config.account_url, "created warehouse session");
        Ok(session)
    }

    /// Executes one statement on the shared session.
    ///
    /// On a connection-class failure the cached session is dropped, so the
    /// next call re-reads the (possibly rotated) token instead of keeping a
    /// dead credential wedged for the rest of the process.
    pub async fn execute(&self, statement: &str) -> Result<StatementResult> {
        let session = self.acquire().await?;
        match session.execute(statement).await {
            Err(e @ WarehouseError::Connection(_)) => {
                tracing::warn!(error = %e, "dropping warehouse session after connection failure");
                self.invalidate().await;
                Err(e)
            }
            other => other,
        }
    }

    /// Drops the cached session so the next `acquire` re-reads the token.
    /// Called after the warehouse reports the session as stale.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;
    }

    fn read_token(&self) -> Result<String> {
        if let Ok(token) = std::fs::read_to_string(&self.config.token_path) {
            let token = token.trim();
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }

        match std::env::var(&self.config.token_env) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(WarehouseError::Connection(format!(
                "no session token at {} and ${} is unset",
                self.config.token_path.display(),
                self.config.token_env,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockWarehouse, count_reply, mock_config, token_file};
    use serde_json::json;

    #[test]
    fn row_maps_zip_columns_and_values() {
        let result = StatementResult {
            columns: vec![
                ColumnInfo {
                    name: "ID".into(),
                    data_type: "NUMBER".into(),
                    nullable: false,
                },
                ColumnInfo {
                    name: "NOTE".into(),
                    data_type: "TEXT".into(),
                    nullable: true,
                },
            ],
            rows: vec![vec![json!("1"), json!("hello")], vec![json!("2"), json!(null)]],
        };

        let maps = result.row_maps();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0]["ID"], json!("1"));
        assert_eq!(maps[1]["NOTE"], json!(null));
    }

    #[tokio::test]
    async fn acquire_reuses_the_cached_session() {
        let token = token_file("secret-token");
        let mock = MockWarehouse::start(|_| count_reply(0)).await;
        let provider = SessionProvider::new(mock_config(&mock, &token));

        let first = provider.acquire().await.unwrap();
        let second = provider.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        provider.invalidate().await;
        let third = provider.acquire().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn acquire_fails_without_any_credential() {
        let mock = MockWarehouse::start(|_| count_reply(0)).await;
        let token = token_file("x");
        let mut config = mock_config(&mock, &token);
        config.token_path = std::path::PathBuf::from("/nonexistent/token");
        config.token_env = "FEEDBACK_ANALYZER_TEST_NO_SUCH_VAR".to_string();

        let provider = SessionProvider::new(config);
        let result = provider.acquire().await;
        assert!(matches!(result, Err(WarehouseError::Connection(_))));
    }

    #[tokio::test]
    async fn execute_surfaces_statement_rejection() {
        let token = token_file("secret-token");
        let mock = MockWarehouse::start(|_| {
            crate::testutils::MockReply::Error {
                status: 422,
                message: "SQL compilation error".to_string(),
            }
        })
        .await;
        let provider = SessionProvider::new(mock_config(&mock, &token));

        let session = provider.acquire().await.unwrap();
        let result = session.execute("SELECT 1").await;
        match result {
            Err(WarehouseError::Statement(message)) => {
                assert!(message.contains("SQL compilation error"))
            }
            other => panic!("expected statement error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_rotated_token_recovers_after_a_connection_failure() {
        let token = token_file("stale-token");
        let mock = MockWarehouse::start_with_token("fresh-token", |_| count_reply(1)).await;
        let provider = SessionProvider::new(mock_config(&mock, &token));

        assert!(matches!(
            provider.execute("SELECT 1").await,
            Err(WarehouseError::Connection(_))
        ));

        // The platform rotates the mounted token file in place; the next
        // statement must pick up the new credential without a restart.
        std::fs::write(token.path(), "fresh-token").unwrap();
        let result = provider.execute("SELECT 1").await.unwrap();
        assert_eq!(result.single_cell(), Some(&json!("1")));
    }

    #[tokio::test]
    async fn execute_maps_auth_rejection_to_connection_error() {
        let token = token_file("expired");
        let mock = MockWarehouse::start(|_| crate::testutils::MockReply::Error {
            status: 401,
            message: "token expired".to_string(),
        })
        .await;
        let provider = SessionProvider::new(mock_config(&mock, &token));

        let session = provider.acquire().await.unwrap();
        assert!(matches!(
            session.execute("SELECT 1").await,
            Err(WarehouseError::Connection(_))
        ));
    }
}

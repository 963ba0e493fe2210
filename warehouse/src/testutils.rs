//! In-process mock of the warehouse statements API for tests.
//!
//! Tests hand `MockWarehouse::start` a function from statement text to a
//! [`MockReply`]; the mock answers every POST by running the incoming
//! statement through it and records the statements it saw.

use crate::config::WarehouseConfig;
use crate::session::ColumnInfo;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// What the mock warehouse should answer for one statement.
pub enum MockReply {
    /// A successful result with metadata and rows.
    Result {
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Value>>,
    },
    /// A successful result whose single cell is NULL.
    NullCell,
    /// An HTTP error with the warehouse's message shape.
    Error { status: u16, message: String },
}

/// Single text cell, as returned by system function calls.
pub fn single_cell_reply(text: &str) -> MockReply {
    MockReply::Result {
        columns: vec![ColumnInfo {
            name: "SYSTEM$GET_ALL_REFERENCES".to_string(),
            data_type: "VARCHAR".to_string(),
            nullable: true,
        }],
        rows: vec![vec![Value::String(text.to_string())]],
    }
}

/// `SELECT COUNT(*)` style result. Counts come back as text cells.
pub fn count_reply(count: u64) -> MockReply {
    MockReply::Result {
        columns: vec![ColumnInfo {
            name: "COUNT(*)".to_string(),
            data_type: "NUMBER(38,0)".to_string(),
            nullable: false,
        }],
        rows: vec![vec![Value::String(count.to_string())]],
    }
}

/// A sample-rows result with the given column names and text cells.
pub fn sample_reply(columns: &[&str], rows: &[&[&str]]) -> MockReply {
    MockReply::Result {
        columns: columns
            .iter()
            .map(|name| ColumnInfo {
                name: name.to_string(),
                data_type: "VARCHAR".to_string(),
                nullable: true,
            })
            .collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| Value::String(cell.to_string())).collect())
            .collect(),
    }
}

/// A `DESCRIBE TABLE` result for `(name, type, nullable)` triples.
pub fn describe_reply(columns: &[(&str, &str, bool)]) -> MockReply {
    let describe_columns = ["name", "type", "kind", "null?"]
        .iter()
        .map(|name| ColumnInfo {
            name: name.to_string(),
            data_type: "VARCHAR".to_string(),
            nullable: true,
        })
        .collect();

    MockReply::Result {
        columns: describe_columns,
        rows: columns
            .iter()
            .map(|(name, data_type, nullable)| {
                vec![
                    Value::String(name.to_string()),
                    Value::String(data_type.to_string()),
                    Value::String("COLUMN".to_string()),
                    Value::String(if *nullable { "Y" } else { "N" }.to_string()),
                ]
            })
            .collect(),
    }
}

pub struct MockWarehouse {
    port: u16,
    statements: Arc<Mutex<Vec<String>>>,
}

impl MockWarehouse {
    /// Binds a throwaway port and serves the statements API from it.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        Self::serve(handler, None).await
    }

    /// Like `start`, but rejects any request whose bearer token does not
    /// match `expected_token` with a 401, before the handler runs.
    pub async fn start_with_token<F>(expected_token: &str, handler: F) -> Self
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        Self::serve(handler, Some(expected_token.to_string())).await
    }

    async fn serve<F>(handler: F, expected_token: Option<String>) -> Self
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock warehouse");
        let port = listener.local_addr().expect("local addr").port();

        let handler = Arc::new(handler);
        let expected_token = Arc::new(expected_token);
        let statements: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let statements_log = statements.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = hyper_util::rt::TokioIo::new(stream);
                let handler = handler.clone();
                let expected_token = expected_token.clone();
                let statements = statements_log.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        answer(req, handler.clone(), expected_token.clone(), statements.clone())
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(
                        hyper_util::rt::TokioExecutor::new(),
                    )
                    .serve_connection(io, service)
                    .await;
                });
            }
        });

        MockWarehouse { port, statements }
    }

    pub fn base_url(&self) -> url::Url {
        url::Url::parse(&format!("http://127.0.0.1:{}", self.port)).expect("mock url")
    }

    /// Statements received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.statements.lock().expect("statements lock").clone()
    }
}

async fn answer<F>(
    req: Request<hyper::body::Incoming>,
    handler: Arc<F>,
    expected_token: Arc<Option<String>>,
    statements: Arc<Mutex<Vec<String>>>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    F: Fn(&str) -> MockReply + Send + Sync,
{
    if let Some(expected) = expected_token.as_ref() {
        let presented = req
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if presented != format!("Bearer {expected}") {
            let response = Response::builder()
                .status(401)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(
                    json!({ "message": "invalid token" }).to_string(),
                )))
                .expect("build mock response");
            return Ok(response);
        }
    }

    let body = req
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let statement = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("statement").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();

    statements.lock().expect("statements lock").push(statement.clone());

    let reply = handler(&statement);
    let (status, payload) = match reply {
        MockReply::Result { columns, rows } => (
            200,
            json!({
                "resultSetMetaData": { "rowType": columns },
                "data": rows,
            }),
        ),
        MockReply::NullCell => (
            200,
            json!({
                "resultSetMetaData": { "rowType": [
                    { "name": "CELL", "type": "VARCHAR", "nullable": true }
                ] },
                "data": [[null]],
            }),
        ),
        MockReply::Error { status, message } => (status, json!({ "message": message })),
    };

    let response = Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(payload.to_string())))
        .expect("build mock response");
    Ok(response)
}

/// Writes a token to a temp file; keep the handle alive for the test's
/// duration.
pub fn token_file(token: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().expect("create token file");
    write!(file, "{token}").expect("write token");
    file
}

/// A config pointing at the mock, authenticated by the given token file.
pub fn mock_config(mock: &MockWarehouse, token: &tempfile::NamedTempFile) -> WarehouseConfig {
    WarehouseConfig {
        account_url: mock.base_url(),
        token_path: token.path().to_path_buf(),
        token_env: "WAREHOUSE_TOKEN".to_string(),
        database: None,
        schema: None,
        statement_timeout_secs: 5,
    }
}

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderMap, HeaderValue};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_http_service<S, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let service_arc = Arc::new(service);

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            let _ = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await;
        });
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("failed to parse request body as JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Collects a request body and deserializes it as JSON.
pub async fn deserialize_body<T: DeserializeOwned, B>(body: B) -> Result<T, BodyError>
where
    B: hyper::body::Body,
    B::Error: std::error::Error,
{
    let bytes = body
        .collect()
        .await
        .map_err(|e| BodyError::Read(e.to_string()))?
        .to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builds a JSON response with permissive CORS headers.
///
/// Serialization of a value we constructed ourselves cannot fail for the
/// payload types used here; if it somehow does, the caller gets a 500 with
/// a plain-text body rather than a panic.
pub fn json_response<T: Serialize, E>(status: StatusCode, value: &T) -> Response<BoxBody<Bytes, E>> {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            return plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "response serialization failed\n",
            );
        }
    };

    let mut response = Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(bytes).map_err(|e| match e {}).boxed())
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()).map_err(|e| match e {}).boxed()));

    apply_cors_headers(response.headers_mut());
    response
}

/// Builds a JSON error response of the shape `{"error": "..."}`.
pub fn error_response<E>(status: StatusCode, message: &str) -> Response<BoxBody<Bytes, E>> {
    json_response(
        status,
        &serde_json::json!({
            "error": message,
        }),
    )
}

fn plain_response<E>(status: StatusCode, message: &'static str) -> Response<BoxBody<Bytes, E>> {
    let mut response = Response::new(
        Full::new(Bytes::from_static(message.as_bytes()))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    apply_cors_headers(response.headers_mut());
    response
}

/// Adds permissive CORS headers. The service sits behind the platform's
/// ingress and serves a first-party frontend, so any origin is accepted.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type, authorization"),
    );
}

/// Empty 204 response for CORS preflight requests.
pub fn preflight_response<E>() -> Response<BoxBody<Bytes, E>> {
    let mut response = Response::new(Full::new(Bytes::new()).map_err(|e| match e {}).boxed());
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::convert::Infallible;

    #[derive(Deserialize, Serialize, PartialEq, Debug)]
    struct Payload {
        text: String,
    }

    #[tokio::test]
    async fn deserialize_body_parses_json() {
        let body = Full::new(Bytes::from_static(br#"{"text":"hello"}"#));
        let parsed: Payload = deserialize_body(body).await.unwrap();
        assert_eq!(parsed.text, "hello");
    }

    #[tokio::test]
    async fn deserialize_body_rejects_invalid_json() {
        let body = Full::new(Bytes::from_static(b"not json"));
        let result: Result<Payload, _> = deserialize_body(body).await;
        assert!(matches!(result, Err(BodyError::Parse(_))));
    }

    #[test]
    fn json_response_sets_cors_and_content_type() {
        let response: Response<BoxBody<Bytes, Infallible>> = json_response(
            StatusCode::OK,
            &Payload {
                text: "ok".to_string(),
            },
        );

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
    }

    #[test]
    fn error_response_wraps_message() {
        let response: Response<BoxBody<Bytes, Infallible>> =
            error_response(StatusCode::NOT_FOUND, "no such route");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn preflight_is_no_content() {
        let response: Response<BoxBody<Bytes, Infallible>> = preflight_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-methods")
        );
    }
}

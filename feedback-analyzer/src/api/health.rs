use crate::service::ResponseBody;
use hyper::{Response, StatusCode};
use serde_json::json;
use shared::http::json_response;

pub const SERVICE_NAME: &str = "feedback-analyzer";

pub fn root() -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({ "message": "Feedback Analyzer API" }),
    )
}

pub fn health() -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "service": SERVICE_NAME,
        }),
    )
}

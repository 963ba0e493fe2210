use crate::metrics_defs::ANALYSES;
use crate::service::{AppState, ResponseBody};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use shared::http::{deserialize_body, error_response, json_response};

#[derive(Deserialize)]
struct FeedbackRequest {
    text: String,
}

/// `POST /analyze-feedback`
///
/// Classification failures are server errors; a failed history write is
/// already swallowed inside the analyzer and never reaches this layer.
pub async fn analyze<B>(state: &AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body,
    B::Error: std::error::Error,
{
    let request: FeedbackRequest = match deserialize_body(req.into_body()).await {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid request: {e}"));
        }
    };

    if request.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }

    match state.analyzer.analyze(&request.text).await {
        Ok(analysis) => {
            metrics::counter!(ANALYSES.name, "sentiment" => analysis.sentiment.as_str())
                .increment(1);
            json_response(StatusCode::OK, &analysis)
        }
        Err(e) => {
            tracing::error!(error = %e, "feedback analysis failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("error analyzing feedback: {e}"),
            )
        }
    }
}

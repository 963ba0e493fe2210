use crate::api;
use crate::config::AppSettings;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS};
use analysis::{Classifier, FeedbackAnalyzer, FeedbackStore};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{error_response, preflight_response};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use warehouse::{SessionProvider, TableProber, WarehouseConfig};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ResponseBody = BoxBody<Bytes, ServiceError>;

const KNOWN_PATHS: &[&str] = &[
    "/",
    "/health",
    "/analyze-feedback",
    "/test-db-connection",
    "/test-consumer-tables",
    "/test-multi-consumer-tables",
    "/test-feedback-history-table",
];

/// Everything the handlers need, shared across requests.
pub struct AppState {
    pub provider: Arc<SessionProvider>,
    pub prober: TableProber,
    pub analyzer: FeedbackAnalyzer,
    pub store: Arc<FeedbackStore>,
    pub settings: AppSettings,
}

impl AppState {
    pub fn new(
        warehouse: WarehouseConfig,
        classifier: Arc<dyn Classifier>,
        settings: AppSettings,
    ) -> Self {
        let provider = Arc::new(SessionProvider::new(warehouse));
        let prober = TableProber::new(provider.clone());
        let store = Arc::new(FeedbackStore::new(
            provider.clone(),
            settings.history_table.clone(),
        ));
        let persist_to = settings.persist_feedback.then(|| store.clone());
        let analyzer = FeedbackAnalyzer::new(classifier, persist_to);

        AppState {
            provider,
            prober,
            analyzer,
            store,
            settings,
        }
    }
}

/// Dispatches one request to its handler.
pub async fn route<B>(state: &AppState, req: Request<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body,
    B::Error: std::error::Error,
{
    if req.method() == Method::OPTIONS {
        return preflight_response();
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, "/") => api::health::root(),
        (Method::GET, "/health") => api::health::health(),
        (Method::POST, "/analyze-feedback") => api::feedback::analyze(state, req).await,
        (Method::GET, "/test-db-connection") => api::diagnostics::db_connection(state).await,
        (Method::GET, "/test-consumer-tables") => api::diagnostics::consumer_tables(state).await,
        (Method::GET, "/test-multi-consumer-tables") => {
            api::diagnostics::multi_consumer_tables(state).await
        }
        (Method::GET, "/test-feedback-history-table") => {
            api::diagnostics::feedback_history(state).await
        }
        (_, path) if KNOWN_PATHS.contains(&path) => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        (method, path) => {
            tracing::debug!(method = %method, path = %path, "no route matched");
            error_response(StatusCode::NOT_FOUND, "no such route")
        }
    }
}

#[derive(Clone)]
pub struct AppService {
    state: Arc<AppState>,
}

impl AppService {
    pub fn new(state: Arc<AppState>) -> Self {
        AppService { state }
    }
}

impl Service<Request<Incoming>> for AppService {
    type Response = Response<ResponseBody>;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();

        Box::pin(async move {
            let started = Instant::now();
            let response = route(&state, req).await;

            metrics::counter!(
                REQUESTS.name,
                "status" => response.status().as_u16().to_string()
            )
            .increment(1);
            metrics::histogram!(REQUEST_DURATION.name).record(started.elapsed().as_secs_f64());

            Ok(response)
        })
    }
}

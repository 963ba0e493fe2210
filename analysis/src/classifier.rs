use crate::credentials::ApiKeySource;
use crate::errors::{AnalysisError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// The collaborator is asked for this JSON shape, but its output is free
/// text and the caller must tolerate anything.
const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes customer feedback. \
Please respond in the following JSON format:\n\
{\n  \"sentiment\": \"positive/negative/neutral\",\n  \
\"summary\": \"brief summary of the feedback\",\n  \
\"suggestions\": [\"suggestion 1\", \"suggestion 2\"]\n}";

const MAX_TOKENS: u32 = 300;

/// External text-classification collaborator: free text in, raw response
/// text out. No retries at this seam; the caller decides what a failure
/// means.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String>;
}

/// Classifier configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: Url,
    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,
    /// Path to the mounted API key secret
    #[serde(default = "default_api_key_path")]
    pub api_key_path: std::path::PathBuf,
    /// Environment variable holding the API key when no file is mounted
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Generous bound on the whole request/response cycle, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> Url {
    Url::parse("https://api.openai.com/v1/chat/completions").expect("static URL")
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_path() -> std::path::PathBuf {
    std::path::PathBuf::from("/run/secrets/openai_api_key")
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    30
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Production classifier speaking the chat-completions protocol.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    config: ClassifierConfig,
    key_source: ApiKeySource,
}

impl ChatCompletionClient {
    pub fn new(config: ClassifierConfig) -> Self {
        let key_source = ApiKeySource::new(&config.api_key_path, &config.api_key_env);
        ChatCompletionClient {
            client: reqwest::Client::new(),
            config,
            key_source,
        }
    }
}

#[async_trait]
impl Classifier for ChatCompletionClient {
    async fn classify(&self, text: &str) -> Result<String> {
        let api_key = self.key_source.resolve()?;
        let user_prompt = format!("Analyze this customer feedback: {text}");

        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
        };

        // The timeout bounds the whole cycle: connect, send, headers, and
        // the body read. A collaborator that stalls mid-body must not hang
        // the request.
        let exchange = async {
            let response = self
                .client
                .post(self.config.endpoint.clone())
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| AnalysisError::CollaboratorUnreachable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AnalysisError::CollaboratorUnreachable(format!(
                    "status {status}"
                )));
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| AnalysisError::CollaboratorUnreachable(e.to_string()))
        };

        let body = timeout(Duration::from_secs(self.config.timeout_secs), exchange)
            .await
            .map_err(|_| AnalysisError::CollaboratorTimeout(self.config.timeout_secs))??;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(AnalysisError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use serde_json::{Value, json};
    use std::convert::Infallible;
    use std::io::Write;
    use tokio::net::TcpListener;

    async fn start_collaborator(reply: Value) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = hyper_util::rt::TokioIo::new(stream);
                let reply = reply.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let reply = reply.clone();
                        async move {
                            // The request must carry the expected prompt
                            // structure; assert on it here so every test
                            // exercises the wire shape.
                            let body = req.into_body().collect().await.unwrap().to_bytes();
                            let parsed: Value = serde_json::from_slice(&body).unwrap();
                            assert_eq!(parsed["max_tokens"], 300);
                            assert_eq!(parsed["messages"][0]["role"], "system");

                            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(
                                reply.to_string(),
                            ))))
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(
                        hyper_util::rt::TokioExecutor::new(),
                    )
                    .serve_connection(io, service)
                    .await;
                });
            }
        });

        port
    }

    fn client_for(port: u16, key_file: &tempfile::NamedTempFile) -> ChatCompletionClient {
        ChatCompletionClient::new(ClassifierConfig {
            endpoint: Url::parse(&format!("http://127.0.0.1:{port}/v1/chat/completions"))
                .unwrap(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_path: key_file.path().to_path_buf(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 5,
        })
    }

    fn key_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "sk-test").unwrap();
        file
    }

    #[tokio::test]
    async fn classify_returns_the_raw_content() {
        let port = start_collaborator(json!({
            "choices": [{ "message": { "content": "raw collaborator text" } }]
        }))
        .await;
        let key = key_file();

        let raw = client_for(port, &key).classify("great product").await.unwrap();
        assert_eq!(raw, "raw collaborator text");
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let port = start_collaborator(json!({
            "choices": [{ "message": { "content": "" } }]
        }))
        .await;
        let key = key_file();

        assert!(matches!(
            client_for(port, &key).classify("text").await,
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn a_stalled_body_trips_the_timeout() {
        use tokio::io::AsyncWriteExt;

        // Raw TCP server: answers with complete headers, then never sends
        // the promised body.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\n")
                        .await;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                });
            }
        });

        let key = key_file();
        let mut client = client_for(port, &key);
        client.config.timeout_secs = 1;

        let result = tokio::time::timeout(Duration::from_secs(3), client.classify("text"))
            .await
            .expect("classify must resolve well before the outer bound");
        assert!(matches!(result, Err(AnalysisError::CollaboratorTimeout(1))));
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_network_call() {
        let client = ChatCompletionClient::new(ClassifierConfig {
            endpoint: Url::parse("http://127.0.0.1:1/unreachable").unwrap(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_path: std::path::PathBuf::from("/nonexistent/key"),
            api_key_env: "ANALYSIS_TEST_CLASSIFIER_NO_KEY".to_string(),
            timeout_secs: 5,
        });

        assert!(matches!(
            client.classify("text").await,
            Err(AnalysisError::MissingCredential(_))
        ));
    }

    #[test]
    fn config_defaults_point_at_openai() {
        let config: ClassifierConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.api_key_env, "OPENAI_API_KEY");
    }
}

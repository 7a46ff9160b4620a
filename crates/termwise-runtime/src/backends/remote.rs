//! Hosted text-generation backend.
//!
//! One POST per request with a bearer credential; no retries here. The wire
//! format is the text-generation inference API:
//!
//! ```json
//! {"inputs": "...", "parameters": {"max_new_tokens": 2048, "return_full_text": false}}
//! ```
//!
//! answered by `[{"generated_text": "..."}]`.
//!
//! ## Security
//!
//! The token is read from the environment variable named in
//! [`BackendConfig::api_token_env`] and held as an [`ApiCredential`]. It is
//! only exposed when the Authorization header is set.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use termwise_core::{Prompt, PromptDialect};

use super::secrets::ApiCredential;
use super::{BackendError, InferenceBackend};
use crate::config::BackendConfig;

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    return_full_text: bool,
}

/// Client for a hosted inference endpoint.
pub struct RemoteBackend {
    credential: ApiCredential,
    endpoint: String,
    max_new_tokens: u32,
    timeout: std::time::Duration,
    #[cfg(feature = "remote")]
    client: reqwest::Client,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteBackend {
    /// Build from config, reading the credential from the environment.
    ///
    /// A missing credential is not an error here; `generate` reports it.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let credential = ApiCredential::from_env(&config.api_token_env, "Inference API token");
        Self::new(config, credential)
    }

    /// Build with an explicit credential.
    pub fn new(config: &BackendConfig, credential: ApiCredential) -> Result<Self, BackendError> {
        #[cfg(feature = "remote")]
        let client = reqwest::Client::builder()
            .timeout(config.generation_timeout)
            .build()
            .map_err(|e| BackendError::unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            credential,
            endpoint: config.remote_endpoint(),
            max_new_tokens: config.max_new_tokens,
            timeout: config.generation_timeout,
            #[cfg(feature = "remote")]
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body<'a>(&self, inputs: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            inputs,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                return_full_text: false,
            },
        }
    }

    #[cfg(feature = "remote")]
    async fn post(&self, prompt: &Prompt) -> Result<String, BackendError> {
        if self.credential.is_empty() {
            return Err(BackendError::unavailable(format!(
                "{} is not set ({})",
                self.credential.name(),
                self.credential.source()
            )));
        }

        let inputs = prompt.flatten();

        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose())
            .json(&self.request_body(&inputs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::GenerationTimeout(self.timeout)
                } else {
                    BackendError::failure(format!("request to inference endpoint failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::GenerationTimeout(self.timeout)
            } else {
                BackendError::failure(format!("reading inference response failed: {}", e))
            }
        })?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                endpoint = %self.endpoint,
                "Inference endpoint returned an error"
            );
            return Err(BackendError::http_failure(status.as_u16(), body));
        }

        parse_envelope(&body)
    }

    #[cfg(not(feature = "remote"))]
    async fn post(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        Err(BackendError::unavailable(
            "remote inference is not compiled in (enable the `remote` feature)",
        ))
    }
}

/// Extract `[0].generated_text` from a response body.
pub fn parse_envelope(body: &str) -> Result<String, BackendError> {
    let value: JsonValue = serde_json::from_str(body).map_err(|e| BackendError::GenerationFailure {
        message: format!("inference response is not JSON: {}", e),
        status: None,
        body: Some(body.to_string()),
    })?;

    value
        .get(0)
        .and_then(|first| first.get("generated_text"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::GenerationFailure {
            message: "inference response lacks [0].generated_text".to_string(),
            status: None,
            body: Some(body.to_string()),
        })
}

#[async_trait]
impl InferenceBackend for RemoteBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.post(prompt).await
    }

    fn dialect(&self) -> PromptDialect {
        PromptDialect::SingleTurn
    }

    async fn health_check(&self) -> bool {
        // Credential presence only; never spends a generation
        cfg!(feature = "remote") && !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::secrets::CredentialSource;

    fn credential(value: &str) -> ApiCredential {
        ApiCredential::new(value, CredentialSource::Programmatic, "Test token")
    }

    #[test]
    fn test_parse_envelope() {
        let text = parse_envelope(r#"[{"generated_text": "{\"document_type\": \"Policy\"}"}]"#)
            .unwrap();
        assert_eq!(text, "{\"document_type\": \"Policy\"}");
    }

    #[test]
    fn test_parse_envelope_rejects_malformed() {
        for body in [
            "not json",
            "[]",
            r#"{"generated_text": "flat object"}"#,
            r#"[{"text": "wrong key"}]"#,
            r#"[{"generated_text": 42}]"#,
        ] {
            let err = parse_envelope(body).unwrap_err();
            assert!(
                matches!(err, BackendError::GenerationFailure { .. }),
                "body {:?} gave {:?}",
                body,
                err
            );
        }
    }

    #[test]
    fn test_request_body_shape() {
        let config = BackendConfig {
            max_new_tokens: 512,
            ..BackendConfig::default()
        };
        let backend = RemoteBackend::new(&config, credential("hf_x")).unwrap();
        let body = serde_json::to_value(backend.request_body("analyze this")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "inputs": "analyze this",
                "parameters": {"max_new_tokens": 512, "return_full_text": false}
            })
        );
    }

    #[test]
    fn test_debug_redacts_credential() {
        let backend =
            RemoteBackend::new(&BackendConfig::default(), credential("hf_secret_value")).unwrap();
        let debug = format!("{:?}", backend);
        assert!(!debug.contains("hf_secret_value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_reflects_credential() {
        let config = BackendConfig::default();
        assert!(!RemoteBackend::new(&config, credential("")).unwrap().health_check().await);
        assert_eq!(
            RemoteBackend::new(&config, credential("hf_x"))
                .unwrap()
                .health_check()
                .await,
            cfg!(feature = "remote")
        );
    }

    #[cfg(feature = "remote")]
    mod http {
        use super::*;
        use std::time::Duration;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::task::JoinHandle;

        /// Accept one connection, capture the request, reply with `status` and `body`.
        async fn stub_server(
            status: &'static str,
            body: &'static str,
            delay: Duration,
        ) -> (String, JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/generate", listener.local_addr().unwrap());

            let handle = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                request
            });

            (url, handle)
        }

        async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            String::from_utf8_lossy(&buf).into_owned()
        }

        fn config_for(url: &str, timeout: Duration) -> BackendConfig {
            BackendConfig {
                remote_url: Some(url.to_string()),
                generation_timeout: timeout,
                max_new_tokens: 256,
                ..BackendConfig::default()
            }
        }

        fn prompt() -> Prompt {
            Prompt {
                system: None,
                user: "Please analyze the following document".to_string(),
            }
        }

        #[tokio::test]
        async fn test_successful_generation() {
            let (url, server) = stub_server(
                "200 OK",
                r#"[{"generated_text": "{\"document_type\": \"Terms\"}"}]"#,
                Duration::ZERO,
            )
            .await;
            let backend =
                RemoteBackend::new(&config_for(&url, Duration::from_secs(5)), credential("hf_abc"))
                    .unwrap();

            let text = backend.generate(&prompt()).await.unwrap();
            assert_eq!(text, "{\"document_type\": \"Terms\"}");

            let request = server.await.unwrap();
            assert!(request.starts_with("POST /generate"));
            assert!(request
                .to_ascii_lowercase()
                .contains("authorization: bearer hf_abc"));
            assert!(request.contains("\"max_new_tokens\":256"));
            assert!(request.contains("\"return_full_text\":false"));
            assert!(request.contains("Please analyze the following document"));
        }

        #[tokio::test]
        async fn test_error_status_keeps_status_and_body() {
            let (url, _server) = stub_server(
                "503 Service Unavailable",
                r#"{"error": "Model is currently loading"}"#,
                Duration::ZERO,
            )
            .await;
            let backend =
                RemoteBackend::new(&config_for(&url, Duration::from_secs(5)), credential("hf_abc"))
                    .unwrap();

            match backend.generate(&prompt()).await.unwrap_err() {
                BackendError::GenerationFailure { status, body, .. } => {
                    assert_eq!(status, Some(503));
                    assert!(body.unwrap().contains("currently loading"));
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_malformed_envelope_is_failure() {
            let (url, _server) =
                stub_server("200 OK", r#"{"unexpected": true}"#, Duration::ZERO).await;
            let backend =
                RemoteBackend::new(&config_for(&url, Duration::from_secs(5)), credential("hf_abc"))
                    .unwrap();

            let err = backend.generate(&prompt()).await.unwrap_err();
            assert!(matches!(err, BackendError::GenerationFailure { status: None, .. }));
        }

        #[tokio::test]
        async fn test_slow_endpoint_times_out() {
            let (url, _server) =
                stub_server("200 OK", r#"[{"generated_text": "late"}]"#, Duration::from_secs(5))
                    .await;
            let backend = RemoteBackend::new(
                &config_for(&url, Duration::from_millis(200)),
                credential("hf_abc"),
            )
            .unwrap();

            let err = backend.generate(&prompt()).await.unwrap_err();
            assert!(matches!(err, BackendError::GenerationTimeout(_)));
        }

        #[tokio::test]
        async fn test_connection_refused_is_failure() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/generate", listener.local_addr().unwrap());
            drop(listener);

            let backend =
                RemoteBackend::new(&config_for(&url, Duration::from_secs(5)), credential("hf_abc"))
                    .unwrap();
            let err = backend.generate(&prompt()).await.unwrap_err();
            assert!(matches!(err, BackendError::GenerationFailure { status: None, .. }));
        }

        #[tokio::test]
        async fn test_missing_credential_makes_no_request() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/generate", listener.local_addr().unwrap());

            let backend =
                RemoteBackend::new(&config_for(&url, Duration::from_secs(5)), credential(""))
                    .unwrap();
            let err = backend.generate(&prompt()).await.unwrap_err();
            assert!(matches!(err, BackendError::BackendUnavailable(_)));

            let accepted =
                tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
            assert!(accepted.is_err(), "backend connected without a credential");
        }
    }
}

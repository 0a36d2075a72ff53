use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::Config;
use crate::models::InferenceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    TransportFailure(TransportFailure),
    Response { status: u16, body: Vec<u8> },
}

/// Pooled HTTP client for the inference service.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.upstream.pool_max_idle_per_host)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http })
    }

    /// One POST, no retries. Any status code comes back as a `Response`.
    pub async fn generate(&self, config: &Config, message: &str) -> UpstreamOutcome {
        let payload = InferenceRequest::single_turn(message);
        let mut request = self
            .http
            .post(config.inference_url())
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);
        if let Some(token) = config.credential() {
            request = request.bearer_auth(token);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(err) => return UpstreamOutcome::TransportFailure(transport_failure(&err)),
        };
        let status = resp.status().as_u16();
        match resp.bytes().await {
            Ok(body) => UpstreamOutcome::Response {
                status,
                body: body.to_vec(),
            },
            Err(err) => UpstreamOutcome::TransportFailure(transport_failure(&err)),
        }
    }
}

fn transport_failure(err: &reqwest::Error) -> TransportFailure {
    debug!(
        is_timeout = err.is_timeout(),
        is_connect = err.is_connect(),
        "upstream transport error: {}",
        err
    );
    // A connect timeout means the host never answered.
    if err.is_timeout() && !err.is_connect() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use serde_json::{Value, json};
    use std::time::Duration;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/models/test", addr)
    }

    #[tokio::test]
    async fn sends_prompt_and_bearer_token() {
        let app = Router::new().route(
            "/models/test",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"auth": auth, "inputs": body["inputs"]}))
            }),
        );
        let url = spawn(app).await;
        let config = Config::for_tests(&url);
        let client = UpstreamClient::new(&config).expect("client");

        let (status, body) = match client.generate(&config, "ping").await {
            UpstreamOutcome::Response { status, body } => (status, body),
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(status, 200);
        let echoed: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(echoed["auth"], "Bearer hf_test_token");
        assert_eq!(echoed["inputs"], "User: ping\nAssistant:");
    }

    #[tokio::test]
    async fn omits_authorization_without_credential() {
        let app = Router::new().route(
            "/models/test",
            post(|headers: HeaderMap| async move {
                Json(json!({"has_auth": headers.contains_key("authorization")}))
            }),
        );
        let url = spawn(app).await;
        let mut config = Config::for_tests(&url);
        config.upstream.api_key = None;
        let client = UpstreamClient::new(&config).expect("client");

        let UpstreamOutcome::Response { body, .. } = client.generate(&config, "hi").await else {
            panic!("expected response");
        };
        let echoed: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(echoed["has_auth"], false);
    }

    #[tokio::test]
    async fn non_success_status_is_still_a_response() {
        let app = Router::new().route(
            "/models/test",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let url = spawn(app).await;
        let config = Config::for_tests(&url);
        let client = UpstreamClient::new(&config).expect("client");

        assert_eq!(
            client.generate(&config, "hi").await,
            UpstreamOutcome::Response {
                status: 429,
                body: b"slow down".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let app = Router::new().route(
            "/models/test",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let url = spawn(app).await;
        let mut config = Config::for_tests(&url);
        config.upstream.timeout_ms = 100;
        let client = UpstreamClient::new(&config).expect("client");

        assert_eq!(
            client.generate(&config, "hi").await,
            UpstreamOutcome::TransportFailure(TransportFailure::Timeout)
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let config = Config::for_tests(&format!("http://{}/models/test", addr));
        let client = UpstreamClient::new(&config).expect("client");

        assert_eq!(
            client.generate(&config, "hi").await,
            UpstreamOutcome::TransportFailure(TransportFailure::Unreachable)
        );
    }
}

//! HTTP verification backend for block-explorer source verification

use crate::error::CliResult;
use async_trait::async_trait;
use chainstep_deployment::{
    VerificationBackend, VerificationError, VerificationOutcome, VerificationRequest,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Header carrying the explorer API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Client for an explorer verification endpoint
pub struct ExplorerVerifier {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl ExplorerVerifier {
    pub fn new(endpoint: &str, api_key: Option<String>, name: &str, timeout_secs: u64) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_key,
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl VerificationBackend for ExplorerVerifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError> {
        let url = format!("{}/v1/verify", self.base_url);
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| VerificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VerificationError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerificationError::Decode(e.to_string()))?;
        match body.status.as_str() {
            "verified" | "already_verified" => Ok(VerificationOutcome::Verified),
            "mismatch" => Ok(VerificationOutcome::Mismatch {
                reason: body
                    .message
                    .unwrap_or_else(|| "source does not match deployed bytecode".to_string()),
            }),
            other => Err(VerificationError::Decode(format!(
                "unknown verification status {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstep_types::Address;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> VerificationRequest {
        VerificationRequest {
            address: Address::from_low_u64(0x1000),
            contract: "MasterRegistry".into(),
            constructor_args: vec![json!("https://example.org/entities/")],
        }
    }

    async fn respond(status: u16, body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/verify"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_verified_statuses() {
        for status in ["verified", "already_verified"] {
            let server = respond(200, json!({ "status": status })).await;
            let verifier = ExplorerVerifier::new(&server.uri(), None, "Polygonscan", 5).unwrap();
            assert_eq!(verifier.submit(&request()).await.unwrap(), VerificationOutcome::Verified);
        }
    }

    #[tokio::test]
    async fn test_mismatch() {
        let server = respond(200, json!({ "status": "mismatch", "message": "bytecode differs" })).await;
        let verifier = ExplorerVerifier::new(&server.uri(), None, "Etherscan", 5).unwrap();
        assert_eq!(
            verifier.submit(&request()).await.unwrap(),
            VerificationOutcome::Mismatch {
                reason: "bytecode differs".into()
            }
        );
    }

    #[tokio::test]
    async fn test_api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/verify"))
            .and(header(API_KEY_HEADER, "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "verified" })))
            .expect(1)
            .mount(&server)
            .await;

        let verifier =
            ExplorerVerifier::new(&server.uri(), Some("secret".into()), "Etherscan", 5).unwrap();
        assert!(verifier.submit(&request()).await.unwrap().is_verified());
    }

    #[tokio::test]
    async fn test_service_error() {
        let server = respond(503, json!({ "error": "busy" })).await;
        let verifier = ExplorerVerifier::new(&server.uri(), None, "Etherscan", 5).unwrap();
        assert!(matches!(
            verifier.submit(&request()).await,
            Err(VerificationError::Service { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // nothing listens on the discard port
        let verifier = ExplorerVerifier::new("http://127.0.0.1:9", None, "Etherscan", 2).unwrap();
        assert!(matches!(
            verifier.submit(&request()).await,
            Err(VerificationError::Transport(_))
        ));
    }
}

//! HTTP chain client for the transaction-signing gateway
//!
//! The gateway holds the operator keys, signs and broadcasts transactions,
//! and reports receipts. This client only speaks JSON to it.

use crate::config::EnvironmentConfig;
use crate::error::CliResult;
use async_trait::async_trait;
use chainstep_deployment::{
    AccountInfo, CallRequest, ChainClient, ChainError, DeployRequest, PendingTransaction,
    ReadQuery, Receipt,
};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP client for communicating with the signing gateway
pub struct GatewayClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    progress: bool,
}

/// Read-only call result
#[derive(Debug, Deserialize)]
struct CallResponse {
    value: Value,
}

impl GatewayClient {
    /// Create a new gateway client
    pub fn new(endpoint: &str, settings: &EnvironmentConfig) -> CliResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            confirmation_timeout: Duration::from_secs(settings.confirmation_timeout_secs),
            progress: true,
        })
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Disable the receipt spinner
    pub fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a receipt; `None` while the transaction is pending
    async fn fetch_receipt(&self, pending: &PendingTransaction) -> Result<Option<Receipt>, ChainError> {
        let url = format!("{}/v1/transactions/{}/receipt", self.base_url, pending.tx_hash);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    fn spinner(&self, pending: &PendingTransaction) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Waiting for {}...", pending.tx_hash));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    // ========== Internal HTTP helpers ==========

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await.map_err(transport)?;
        handle_response(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        handle_response(response).await
    }
}

fn transport(e: reqwest::Error) -> ChainError {
    ChainError::Transport(e.to_string())
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChainError> {
    let status = response.status();

    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))
    } else if status.is_client_error() {
        let message = response.text().await.unwrap_or_default();
        Err(ChainError::Rejected(format!("{} - {}", status.as_u16(), message)))
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(ChainError::Transport(format!("{} - {}", status.as_u16(), message)))
    }
}

#[async_trait]
impl ChainClient for GatewayClient {
    async fn account(&self) -> Result<AccountInfo, ChainError> {
        self.get("/v1/account").await
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<PendingTransaction, ChainError> {
        self.post("/v1/deployments", request).await
    }

    async fn send(&self, request: &CallRequest) -> Result<PendingTransaction, ChainError> {
        self.post("/v1/transactions", request).await
    }

    async fn wait_for_receipt(&self, pending: &PendingTransaction) -> Result<Receipt, ChainError> {
        let started = Instant::now();
        let pb = self.spinner(pending);

        loop {
            match self.fetch_receipt(pending).await {
                Ok(Some(receipt)) => {
                    pb.finish_and_clear();
                    return Ok(receipt);
                }
                Ok(None) => {
                    debug!(tx_hash = %pending.tx_hash, elapsed_ms = started.elapsed().as_millis() as u64, "Receipt pending");
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e);
                }
            }

            if started.elapsed() >= self.confirmation_timeout {
                pb.finish_and_clear();
                return Err(ChainError::Timeout {
                    tx_hash: pending.tx_hash.clone(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn query(&self, query: &ReadQuery) -> Result<Value, ChainError> {
        let response: CallResponse = self.post("/v1/calls", query).await?;
        Ok(response.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstep_deployment::TxHash;
    use chainstep_types::{Address, Wei};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> EnvironmentConfig {
        EnvironmentConfig {
            chain_id: 137,
            gateway: "http://unused".into(),
            verifier: None,
            verifier_api_key: None,
            currency: "MATIC".into(),
            confirmation_timeout_secs: 5,
            poll_interval_ms: 10,
            request_timeout_secs: 5,
        }
    }

    fn client(server: &MockServer) -> GatewayClient {
        GatewayClient::new(&server.uri(), &settings()).unwrap().quiet()
    }

    #[test]
    fn test_client_endpoint_normalization() {
        let client = GatewayClient::new("http://localhost:8545/", &settings()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8545");
    }

    #[tokio::test]
    async fn test_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "0x00000000000000000000000000000000000000aa",
                "balance": "2500000000000000000",
            })))
            .mount(&server)
            .await;

        let account = client(&server).account().await.unwrap();
        assert_eq!(account.address, Address::from_low_u64(0xaa));
        assert_eq!(account.balance, Wei(2_500_000_000_000_000_000));
    }

    #[tokio::test]
    async fn test_deploy_then_poll_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/deployments"))
            .and(body_json(json!({ "contract": "MasterRegistry", "constructor_args": [] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tx_hash": "0xabc" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions/0xabc/receipt"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions/0xabc/receipt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tx_hash": "0xabc",
                "success": true,
                "contract_address": "0x0000000000000000000000000000000000001000",
                "gas_used": 1200000,
                "effective_gas_price": "30000000000",
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let pending = client
            .deploy(&DeployRequest {
                contract: "MasterRegistry".into(),
                constructor_args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(pending.tx_hash, TxHash("0xabc".into()));

        let receipt = client.wait_for_receipt(&pending).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.contract_address, Some(Address::from_low_u64(0x1000)));
        assert_eq!(receipt.effective_gas_price, Some(Wei::from_gwei(30)));
    }

    #[tokio::test]
    async fn test_receipt_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/transactions/0xdef/receipt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server).with_confirmation_timeout(Duration::from_millis(50));
        let err = client
            .wait_for_receipt(&PendingTransaction {
                tx_hash: TxHash("0xdef".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_rejected_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/transactions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("insufficient funds"))
            .mount(&server)
            .await;

        let err = client(&server)
            .send(&CallRequest {
                target: Address::from_low_u64(0x1000),
                method: "createBatchSeries".into(),
                args: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Rejected(ref m) if m.contains("insufficient funds")));
    }

    #[tokio::test]
    async fn test_query_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "250" })))
            .mount(&server)
            .await;

        let value = client(&server)
            .query(&ReadQuery {
                target: Address::from_low_u64(0x1000),
                method: "seriesCount".into(),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(value, json!("250"));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/account"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server).account().await.unwrap_err();
        assert!(matches!(err, ChainError::Transport(_)));
    }
}

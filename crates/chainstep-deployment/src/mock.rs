//! Mock chain client for testing
//!
//! Deterministic in-process ledger network. Deployed contracts get sequential
//! addresses, batch submissions advance an authoritative entity counter, and
//! every request is recorded so tests can assert exactly which external calls
//! were made.

use async_trait::async_trait;
use chainstep_types::{Address, Wei};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::chain::{
    AccountInfo, CallRequest, ChainClient, ChainError, DeployRequest, PendingTransaction,
    ReadQuery, Receipt, TxHash,
};

const FIRST_CONTRACT_ADDRESS: u64 = 0x1000;
const DEPLOY_GAS: u64 = 1_200_000;
const CALL_GAS: u64 = 60_000;
const BATCH_BASE_GAS: u64 = 50_000;
const BATCH_GAS_PER_RECORD: u64 = 25_000;

#[derive(Default)]
struct MockChainState {
    next_contract: u64,
    next_tx: u64,
    receipts: HashMap<TxHash, Receipt>,
    deployments: Vec<DeployRequest>,
    sends: Vec<CallRequest>,
    queries: Vec<ReadQuery>,
    values: HashMap<(Address, String), Value>,
    entity_count: u64,
    timed_out: HashSet<TxHash>,
}

/// In-memory [`ChainClient`] with call spies and failure injection
pub struct MockChainClient {
    account: Address,
    balance: Wei,
    gas_price: Option<Wei>,
    batch_method: String,
    count_method: String,
    setters: HashMap<String, String>,
    failing_contracts: HashSet<String>,
    reject_send_at: Option<usize>,
    revert_send_at: Option<usize>,
    timeout_receipt_at: Option<usize>,
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            account: Address::from_low_u64(0xdead),
            balance: Wei(10 * 1_000_000_000_000_000_000),
            gas_price: Some(Wei::from_gwei(30)),
            batch_method: "createBatchSeries".to_string(),
            count_method: "seriesCount".to_string(),
            setters: HashMap::new(),
            failing_contracts: HashSet::new(),
            reject_send_at: None,
            revert_send_at: None,
            timeout_receipt_at: None,
            state: Mutex::new(MockChainState::default()),
        }
    }

    /// Methods that submit a record batch and report the entity count
    pub fn with_batch_methods(mut self, submit: &str, count: &str) -> Self {
        self.batch_method = submit.to_string();
        self.count_method = count.to_string();
        self
    }

    /// Calls to `setter` store their first argument as the result of `getter`
    pub fn with_setter(mut self, setter: &str, getter: &str) -> Self {
        self.setters.insert(setter.to_string(), getter.to_string());
        self
    }

    /// Receipts carry no effective gas price
    pub fn without_gas_price(mut self) -> Self {
        self.gas_price = None;
        self
    }

    /// Entities already present before any batch is submitted
    pub fn with_entity_count(self, count: u64) -> Self {
        self.state.lock().entity_count = count;
        self
    }

    /// Deployments of `contract` are rejected at submission
    pub fn fail_deploy(mut self, contract: &str) -> Self {
        self.failing_contracts.insert(contract.to_string());
        self
    }

    /// The `index`-th call (zero-based) is rejected at submission
    pub fn reject_send_at(mut self, index: usize) -> Self {
        self.reject_send_at = Some(index);
        self
    }

    /// The `index`-th call (zero-based) is mined but reverts
    pub fn revert_send_at(mut self, index: usize) -> Self {
        self.revert_send_at = Some(index);
        self
    }

    /// The `index`-th call (zero-based) takes effect but its receipt never arrives
    pub fn timeout_receipt_at(mut self, index: usize) -> Self {
        self.timeout_receipt_at = Some(index);
        self
    }

    /// Set the value a read-only query returns
    pub fn set_value(&self, target: &Address, method: &str, value: Value) {
        self.state
            .lock()
            .values
            .insert((target.clone(), method.to_string()), value);
    }

    pub fn deploy_count(&self) -> usize {
        self.state.lock().deployments.len()
    }

    pub fn deployments(&self) -> Vec<DeployRequest> {
        self.state.lock().deployments.clone()
    }

    /// Number of calls submitted, including rejected ones
    pub fn send_count(&self) -> usize {
        self.state.lock().sends.len()
    }

    pub fn sends(&self) -> Vec<CallRequest> {
        self.state.lock().sends.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    /// Total external interactions (deployments plus calls)
    pub fn submission_count(&self) -> usize {
        let state = self.state.lock();
        state.deployments.len() + state.sends.len()
    }

    pub fn entity_count(&self) -> u64 {
        self.state.lock().entity_count
    }

    fn issue(&self, state: &mut MockChainState, receipt: impl FnOnce(TxHash) -> Receipt) -> PendingTransaction {
        state.next_tx += 1;
        let tx_hash = TxHash(format!("0x{:064x}", state.next_tx));
        state.receipts.insert(tx_hash.clone(), receipt(tx_hash.clone()));
        PendingTransaction { tx_hash }
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn account(&self) -> Result<AccountInfo, ChainError> {
        Ok(AccountInfo {
            address: self.account.clone(),
            balance: self.balance,
        })
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<PendingTransaction, ChainError> {
        let mut state = self.state.lock();
        state.deployments.push(request.clone());
        if self.failing_contracts.contains(&request.contract) {
            return Err(ChainError::Rejected(format!(
                "deployment of {} rejected",
                request.contract
            )));
        }

        let address = Address::from_low_u64(FIRST_CONTRACT_ADDRESS + state.next_contract);
        state.next_contract += 1;
        let gas_price = self.gas_price;
        Ok(self.issue(&mut state, |tx_hash| Receipt {
            tx_hash,
            success: true,
            contract_address: Some(address),
            gas_used: DEPLOY_GAS,
            effective_gas_price: gas_price,
        }))
    }

    async fn send(&self, request: &CallRequest) -> Result<PendingTransaction, ChainError> {
        let mut state = self.state.lock();
        let index = state.sends.len();
        state.sends.push(request.clone());
        if self.reject_send_at == Some(index) {
            return Err(ChainError::Rejected(format!(
                "call {} rejected",
                request.method
            )));
        }

        let reverted = self.revert_send_at == Some(index);
        let mut gas_used = CALL_GAS;
        if !reverted {
            if request.method == self.batch_method {
                let records = request
                    .args
                    .first()
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len) as u64;
                state.entity_count += records;
                gas_used = BATCH_BASE_GAS + BATCH_GAS_PER_RECORD * records;
            } else if let Some(getter) = self.setters.get(&request.method) {
                let value = request.args.first().cloned().unwrap_or(Value::Null);
                state
                    .values
                    .insert((request.target.clone(), getter.clone()), value);
            }
        }

        let gas_price = self.gas_price;
        let pending = self.issue(&mut state, |tx_hash| Receipt {
            tx_hash,
            success: !reverted,
            contract_address: None,
            gas_used,
            effective_gas_price: gas_price,
        });
        if self.timeout_receipt_at == Some(index) {
            state.timed_out.insert(pending.tx_hash.clone());
        }
        Ok(pending)
    }

    async fn wait_for_receipt(&self, pending: &PendingTransaction) -> Result<Receipt, ChainError> {
        let state = self.state.lock();
        if state.timed_out.contains(&pending.tx_hash) {
            return Err(ChainError::Timeout {
                tx_hash: pending.tx_hash.clone(),
                waited_secs: 120,
            });
        }
        state
            .receipts
            .get(&pending.tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::Transport(format!("unknown transaction {}", pending.tx_hash)))
    }

    async fn query(&self, query: &ReadQuery) -> Result<Value, ChainError> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        if query.method == self.count_method {
            return Ok(Value::from(state.entity_count));
        }
        Ok(state
            .values
            .get(&(query.target.clone(), query.method.clone()))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_deploy_assigns_sequential_addresses() {
        let chain = MockChainClient::new();
        let request = DeployRequest {
            contract: "Master".into(),
            constructor_args: vec![],
        };

        let first = chain.deploy(&request).await.unwrap();
        let second = chain.deploy(&request).await.unwrap();
        let a = chain.wait_for_receipt(&first).await.unwrap();
        let b = chain.wait_for_receipt(&second).await.unwrap();

        assert_eq!(a.contract_address, Some(Address::from_low_u64(0x1000)));
        assert_eq!(b.contract_address, Some(Address::from_low_u64(0x1001)));
        assert_eq!(chain.deploy_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_submission_advances_count() {
        let chain = MockChainClient::new().with_entity_count(5);
        let target = Address::from_low_u64(1);
        let pending = chain
            .send(&CallRequest {
                target: target.clone(),
                method: "createBatchSeries".into(),
                args: vec![json!([0, 1, 2]), json!([]), json!([]), json!([])],
            })
            .await
            .unwrap();
        let receipt = chain.wait_for_receipt(&pending).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 50_000 + 3 * 25_000);

        let count = chain
            .query(&ReadQuery {
                target,
                method: "seriesCount".into(),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(count, json!(8));
    }

    #[tokio::test]
    async fn test_setter_feeds_getter() {
        let chain = MockChainClient::new().with_setter("changeURISources", "entitiesURI");
        let target = Address::from_low_u64(7);
        let pending = chain
            .send(&CallRequest {
                target: target.clone(),
                method: "changeURISources".into(),
                args: vec![json!("https://example.org/entities/")],
            })
            .await
            .unwrap();
        chain.wait_for_receipt(&pending).await.unwrap();

        let value = chain
            .query(&ReadQuery {
                target,
                method: "entitiesURI".into(),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(value, json!("https://example.org/entities/"));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let chain = MockChainClient::new().reject_send_at(0).revert_send_at(1);
        let call = CallRequest {
            target: Address::from_low_u64(1),
            method: "noop".into(),
            args: vec![],
        };
        assert!(matches!(chain.send(&call).await, Err(ChainError::Rejected(_))));

        let pending = chain.send(&call).await.unwrap();
        let receipt = chain.wait_for_receipt(&pending).await.unwrap();
        assert!(!receipt.success);
        assert_eq!(chain.send_count(), 2);
    }
}

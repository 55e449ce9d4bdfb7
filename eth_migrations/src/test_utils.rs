use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::{
    accounts::AccountProvider,
    config::{Config, NetworkConfig, NetworkId},
    error::{AccountsError, StepError},
    transport::{CallRequest, ContractTransport, CreateRequest, Deployment},
};

pub fn accounts(count: u64) -> Vec<Address> {
    (1..=count).map(Address::from_low_u64_be).collect()
}

pub fn local_network() -> NetworkConfig {
    NetworkConfig {
        name: "local".to_owned(),
        host: Some("127.0.0.1".to_owned()),
        port: Some(8545),
        network_id: NetworkId::Any,
        gas: None,
        gas_price: None,
        confirmations: 1,
        provider: None,
    }
}

pub fn test_config() -> Config {
    Config::from_toml_str(
        r#"
        [networks.local]
        host = "127.0.0.1"
        port = 8545
        network_id = "*"

        [networks.ropsten]
        network_id = 3

        [networks.ropsten.provider]
        rpc_url = "https://ropsten.example.org"
        mnemonic_env = "MNEMONIC"
        num_addresses = 2
        "#,
    )
    .unwrap()
}

/// Hands out a fixed account list and counts how often it was asked.
#[derive(Debug, Default)]
pub struct StaticAccounts {
    accounts: Vec<Address>,
    requests: AtomicUsize,
}

impl StaticAccounts {
    pub fn new(count: u64) -> Self {
        Self {
            accounts: accounts(count),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountProvider for StaticAccounts {
    async fn accounts(&self, _network: &NetworkConfig) -> Result<Vec<Address>, AccountsError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }
}

/// In-memory transport recording every request, failing for chosen contracts.
#[derive(Debug, Default)]
pub struct FakeTransport {
    executed: Mutex<Vec<String>>,
    creates: Mutex<Vec<CreateRequest>>,
    calls: Mutex<Vec<CallRequest>>,
    failing_creates: Mutex<HashSet<String>>,
    failing_calls: Mutex<HashSet<String>>,
}

impl FakeTransport {
    pub fn fail_create(&self, contract: &str) {
        self.failing_creates.lock().unwrap().insert(contract.to_owned());
    }

    pub fn fail_call(&self, contract: &str) {
        self.failing_calls.lock().unwrap().insert(contract.to_owned());
    }

    pub fn heal(&self) {
        self.failing_creates.lock().unwrap().clear();
        self.failing_calls.lock().unwrap().clear();
    }

    /// Deterministic per contract name, so separate fakes agree.
    pub fn deployment_for(&self, contract: &str) -> Deployment {
        let seed = contract
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        Deployment {
            address: Some(Address::from_low_u64_be(seed)),
            tx_hash: Some(H256::from_low_u64_be(seed)),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<CreateRequest> {
        self.creates.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn failure(contract: &str) -> StepError {
        StepError::CommandFailed {
            program: "zos".to_owned(),
            code: Some(1),
            stderr: format!("{contract} failed"),
        }
    }
}

#[async_trait]
impl ContractTransport for FakeTransport {
    async fn create(
        &self,
        _network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Deployment, StepError> {
        self.executed
            .lock()
            .unwrap()
            .push(format!("create {}", request.contract));
        self.creates.lock().unwrap().push(request.clone());
        if self.failing_creates.lock().unwrap().contains(&request.contract) {
            return Err(Self::failure(&request.contract));
        }
        Ok(self.deployment_for(&request.contract))
    }

    async fn call(
        &self,
        _network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<Option<H256>, StepError> {
        self.executed
            .lock()
            .unwrap()
            .push(format!("call {}.{}", request.contract, request.method));
        self.calls.lock().unwrap().push(request.clone());
        if self.failing_calls.lock().unwrap().contains(&request.contract) {
            return Err(Self::failure(&request.contract));
        }
        Ok(Some(H256::from_low_u64_be(request.args.len() as u64 + 1)))
    }
}

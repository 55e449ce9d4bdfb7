use async_trait::async_trait;
use ethers::types::{Address, H256};

use crate::{config::NetworkConfig, error::StepError};

pub mod rpc;
pub mod zos;

pub use rpc::{ContractBindings, EthersTransport};
pub use zos::ZosCli;

/// Where a create step left its contract instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deployment {
    pub address: Option<Address>,
    pub tx_hash: Option<H256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub contract: String,
    pub initializer: String,
    pub args: Vec<String>,
    pub from: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    pub contract: String,
    pub address: Address,
    pub method: String,
    pub args: Vec<String>,
    pub from: Address,
}

/// Anything able to create contract instances and call methods on them.
///
/// Implementations only return once the remote side reported a terminal
/// outcome (process exit, mined transaction, or timeout).
#[async_trait]
pub trait ContractTransport: Send + Sync {
    async fn create(
        &self,
        network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Deployment, StepError>;

    async fn call(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<Option<H256>, StepError>;
}

#[async_trait]
impl<T: ContractTransport + ?Sized> ContractTransport for Box<T> {
    async fn create(
        &self,
        network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Deployment, StepError> {
        (**self).create(network, request).await
    }

    async fn call(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<Option<H256>, StepError> {
        (**self).call(network, request).await
    }
}

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::{
        parse_abi,
        token::{LenientTokenizer, Tokenizer},
        Abi, Token,
    },
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    types::{Bytes, TransactionRequest, H256, U64},
};
use tokio::time::timeout;
use tracing::debug;

use super::{zos::ZosCli, CallRequest, ContractTransport, CreateRequest, Deployment};
use crate::{
    accounts::wallet_for,
    config::{NetworkConfig, NetworkId},
    error::{ConfigError, StepError},
};

/// Human readable ABIs of the contracts call steps talk to, keyed by contract name.
#[derive(Clone, Debug, Default)]
pub struct ContractBindings {
    abis: HashMap<String, Abi>,
}

impl ContractBindings {
    pub fn insert(&mut self, contract: &str, signatures: &[String]) -> Result<(), ConfigError> {
        let signatures: Vec<&str> = signatures.iter().map(String::as_str).collect();
        let abi = parse_abi(&signatures).map_err(|e| ConfigError::Abi {
            contract: contract.to_owned(),
            reason: e.to_string(),
        })?;
        self.abis.insert(contract.to_owned(), abi);
        Ok(())
    }

    pub fn contains(&self, contract: &str) -> bool {
        self.abis.contains_key(contract)
    }

    /// Calldata for `request`, picking the overload whose arity matches.
    pub fn encode_call(&self, request: &CallRequest) -> Result<Bytes, StepError> {
        let invalid = |reason: String| StepError::InvalidArguments(reason);

        let abi = self
            .abis
            .get(&request.contract)
            .ok_or_else(|| invalid(format!("no ABI known for `{}`", request.contract)))?;
        let function = abi
            .functions_by_name(&request.method)
            .map_err(|e| invalid(format!("{}.{}: {e}", request.contract, request.method)))?
            .iter()
            .find(|function| function.inputs.len() == request.args.len())
            .ok_or_else(|| {
                invalid(format!(
                    "{}.{} does not take {} arguments",
                    request.contract,
                    request.method,
                    request.args.len()
                ))
            })?;

        let tokens = function
            .inputs
            .iter()
            .zip(&request.args)
            .map(|(param, value)| {
                LenientTokenizer::tokenize(&param.kind, value)
                    .map_err(|e| invalid(format!("`{value}` is not a valid {}: {e}", param.kind)))
            })
            .collect::<Result<Vec<Token>, _>>()?;

        function
            .encode_input(&tokens)
            .map(Bytes::from)
            .map_err(|e| invalid(e.to_string()))
    }
}

/// Calls deployed contracts over JSON-RPC. Instance creation still goes
/// through zos, which owns the proxy and initializer logic.
#[derive(Clone, Debug)]
pub struct EthersTransport {
    creator: ZosCli,
    bindings: ContractBindings,
    timeout: Duration,
}

async fn send_and_confirm<M: Middleware>(
    client: &M,
    tx: TransactionRequest,
    confirmations: usize,
) -> Result<H256, StepError> {
    let pending = client
        .send_transaction(tx, None)
        .await
        .map_err(|e| StepError::Unreachable(e.to_string()))?;
    let tx_hash = pending.tx_hash();
    debug!(tx = ?tx_hash, "transaction sent, awaiting receipt");

    let receipt = pending
        .confirmations(confirmations.max(1))
        .await
        .map_err(|e| StepError::Unreachable(e.to_string()))?
        .ok_or(StepError::Dropped)?;

    if receipt.status == Some(U64::zero()) {
        return Err(StepError::Reverted(tx_hash));
    }
    Ok(tx_hash)
}

impl EthersTransport {
    pub fn new(creator: ZosCli, bindings: ContractBindings) -> Self {
        let timeout = creator.timeout();
        Self {
            creator,
            bindings,
            timeout,
        }
    }

    async fn check_network_id(provider: &Provider<Http>, network: &NetworkConfig) -> Result<(), StepError> {
        let NetworkId::Id(expected) = network.network_id else {
            return Ok(());
        };
        let actual = provider
            .get_net_version()
            .await
            .map_err(|e| StepError::Unreachable(e.to_string()))?;
        if actual.parse::<u64>().ok() != Some(expected) {
            return Err(StepError::WrongNetwork { expected, actual });
        }
        Ok(())
    }

    async fn send_call(&self, network: &NetworkConfig, request: &CallRequest) -> Result<H256, StepError> {
        let data = self.bindings.encode_call(request)?;

        let provider = Provider::<Http>::try_from(network.rpc_url().as_str())
            .map_err(|e| StepError::Unreachable(e.to_string()))?;
        Self::check_network_id(&provider, network).await?;

        let mut tx = TransactionRequest::new()
            .from(request.from)
            .to(request.address)
            .data(data);
        if let Some(gas) = network.gas {
            tx = tx.gas(gas);
        }
        if let Some(gas_price) = network.gas_price {
            tx = tx.gas_price(gas_price);
        }

        match &network.provider {
            Some(remote) => {
                let wallet = wallet_for(remote, request.from)?
                    .ok_or(StepError::UnknownSigner(request.from))?;
                let client = SignerMiddleware::new_with_provider_chain(provider, wallet)
                    .await
                    .map_err(|e| StepError::Unreachable(e.to_string()))?;
                send_and_confirm(&client, tx, network.confirmations).await
            }
            // the node signs with its own unlocked account
            None => send_and_confirm(&provider, tx, network.confirmations).await,
        }
    }
}

#[async_trait]
impl ContractTransport for EthersTransport {
    async fn create(
        &self,
        network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Deployment, StepError> {
        self.creator.create(network, request).await
    }

    async fn call(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<Option<H256>, StepError> {
        let tx_hash = timeout(self.timeout, self.send_call(network, request))
            .await
            .map_err(|_| StepError::Timeout(self.timeout))??;
        Ok(Some(tx_hash))
    }
}

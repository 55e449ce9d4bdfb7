use std::env;

use async_trait::async_trait;
use ethers::{
    core::k256::ecdsa::SigningKey,
    providers::{Http, Middleware, Provider},
    signers::{coins_bip39::English, MnemonicBuilder, Signer, Wallet},
    types::Address,
};
use tracing::debug;

use crate::{
    config::{NetworkConfig, RemoteProvider},
    error::AccountsError,
};

pub type LocalWallet = Wallet<SigningKey>;

/// Source of the ordered account list steps refer to by index.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn accounts(&self, network: &NetworkConfig) -> Result<Vec<Address>, AccountsError>;
}

/// Derives accounts from the provider's mnemonic, or asks the node for its
/// unlocked accounts when the network is reached directly by host/port.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetworkAccounts;

#[async_trait]
impl AccountProvider for NetworkAccounts {
    async fn accounts(&self, network: &NetworkConfig) -> Result<Vec<Address>, AccountsError> {
        let accounts = match &network.provider {
            Some(remote) => {
                let phrase = read_mnemonic(remote)?;
                derive_wallets(&phrase, remote.address_index, remote.num_addresses)?
                    .iter()
                    .map(|wallet| wallet.address())
                    .collect()
            }
            None => {
                let provider = Provider::<Http>::try_from(network.rpc_url().as_str())
                    .map_err(|e| AccountsError::Node(e.to_string()))?;
                provider
                    .get_accounts()
                    .await
                    .map_err(|e| AccountsError::Node(e.to_string()))?
            }
        };

        if accounts.is_empty() {
            return Err(AccountsError::Empty(network.name.clone()));
        }
        debug!(network = %network.name, count = accounts.len(), "accounts resolved");
        Ok(accounts)
    }
}

pub fn read_mnemonic(remote: &RemoteProvider) -> Result<String, AccountsError> {
    env::var(&remote.mnemonic_env)
        .map_err(|_| AccountsError::MissingSecret(remote.mnemonic_env.clone()))
}

/// Wallets `offset..offset + count` on the default ethereum derivation path.
pub fn derive_wallets(
    phrase: &str,
    offset: u32,
    count: u32,
) -> Result<Vec<LocalWallet>, AccountsError> {
    let end = offset.checked_add(count).ok_or_else(|| AccountsError::Derivation {
        index: offset,
        reason: format!("{count} accounts from index {offset} overflow the index range"),
    })?;
    (offset..end)
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|e| AccountsError::Derivation {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// The wallet able to sign for `address` on a remote-provider network.
pub fn wallet_for(remote: &RemoteProvider, address: Address) -> Result<Option<LocalWallet>, AccountsError> {
    let phrase = read_mnemonic(remote)?;
    Ok(derive_wallets(&phrase, remote.address_index, remote.num_addresses)?
        .into_iter()
        .find(|wallet| wallet.address() == address))
}

use std::{path::PathBuf, time::Duration};

use ethers::types::{Address, H256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network `{0}`")]
    UnknownNetwork(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("network `{network}`: {reason}")]
    Invalid { network: String, reason: String },
    #[error("bad ABI for `{contract}`: {reason}")]
    Abi { contract: String, reason: String },
    #[error("plan step {ordinal}: {reason}")]
    InvalidStep { ordinal: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("environment variable `{0}` holding the mnemonic is not set")]
    MissingSecret(String),
    #[error("failed to derive account {index}: {reason}")]
    Derivation { index: u32, reason: String },
    #[error("node did not return its accounts: {0}")]
    Node(String),
    #[error("no accounts available on network `{0}`")]
    Empty(String),
}

/// Failure of a single deploy step. Always fatal to the current run.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("contract `{0}` has not been deployed on this network")]
    NotDeployed(String),
    #[error("contract `{0}` was deployed but its address is unknown")]
    UnknownAddress(String),
    #[error("account #{index} requested but only {available} unlocked")]
    MissingAccount { index: usize, available: usize },
    #[error("invalid call arguments: {0}")]
    InvalidArguments(String),
    #[error("`{program}` exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("transaction {0:?} reverted")]
    Reverted(H256),
    #[error("transaction dropped from the mempool")]
    Dropped,
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("connected to network id {actual}, expected {expected}")]
    WrongNetwork { expected: u64, actual: String },
    #[error("gave up after {0:?}")]
    Timeout(Duration),
    #[error("account {0:?} cannot sign on this network")]
    UnknownSigner(Address),
    #[error(transparent)]
    Signer(#[from] AccountsError),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("record for `{network}` is corrupt: {reason}")]
    Corrupt { network: String, reason: String },
    #[error("another migration holds the lock for `{0}`")]
    Locked(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no configuration for network `{0}`")]
    ConfigNotFound(String),
    #[error(transparent)]
    Config(ConfigError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("step {ordinal} failed: {cause}")]
    StepFailed { ordinal: usize, cause: StepError },
}

impl From<ConfigError> for MigrationError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownNetwork(name) => MigrationError::ConfigNotFound(name),
            other => MigrationError::Config(other),
        }
    }
}

impl MigrationError {
    /// Ordinal of the step that failed, if the run got that far.
    pub fn failed_ordinal(&self) -> Option<usize> {
        match self {
            MigrationError::StepFailed { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }
}

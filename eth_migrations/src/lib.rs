pub mod accounts;
pub mod config;
pub mod error;
pub mod plan;
pub mod record;
pub mod runner;
pub mod step;
pub mod transport;

pub use accounts::{AccountProvider, NetworkAccounts};
pub use config::{Config, NetworkConfig, NetworkId, RemoteProvider};
pub use error::{AccountsError, ConfigError, MigrationError, RecordError, StepError};
pub use plan::MigrationPlan;
pub use record::{FileRecordStore, MemoryRecordStore, MigrationRecord, RecordStore};
pub use runner::{MigrationRunner, RunSummary, RunnerState};
pub use step::{DeployStep, StepArg, StepKind};

#[cfg(test)]
pub mod test_utils;

use ethers::types::Address;
use tracing::{debug, info, warn};

use crate::{
    accounts::AccountProvider,
    config::{Config, NetworkConfig},
    error::MigrationError,
    record::{MigrationRecord, RecordStore},
    step::DeployStep,
    transport::ContractTransport,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running(usize),
    Completed,
    Failed(usize),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// ordinals executed by this run
    pub applied: Vec<usize>,
    /// ordinals found already applied
    pub skipped: Vec<usize>,
}

/// Applies a list of deploy steps to one network at a time, in order,
/// stopping at the first failure. Progress is persisted after every step,
/// so a rerun resumes with the first step that has not been applied.
pub struct MigrationRunner<T, A, S> {
    config: Config,
    transport: T,
    accounts: A,
    store: S,
    state: RunnerState,
}

fn warn_on_divergence(record: &MigrationRecord, steps: &[DeployStep]) {
    for applied in &record.applied {
        match steps.get(applied.ordinal) {
            None => warn!(
                ordinal = applied.ordinal,
                contract = %applied.contract,
                "record holds a step the plan no longer declares"
            ),
            Some(step) if step.kind != applied.kind || step.contract != applied.contract => warn!(
                ordinal = applied.ordinal,
                recorded = %format!("{} {}", applied.kind, applied.contract),
                declared = %format!("{} {}", step.kind, step.contract),
                "plan changed for an applied step, it will not run again"
            ),
            Some(_) => {}
        }
    }
}

impl<T, A, S> MigrationRunner<T, A, S>
where
    T: ContractTransport,
    A: AccountProvider,
    S: RecordStore,
{
    pub fn new(config: Config, transport: T, accounts: A, store: S) -> Self {
        Self {
            config,
            transport,
            accounts,
            store,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, MigrationError> {
        Ok(self.config.network(name)?)
    }

    /// Ordinals a run on `network_name` would execute, without executing anything.
    pub fn pending(&self, network_name: &str, steps: &[DeployStep]) -> Result<Vec<usize>, MigrationError> {
        self.config.network(network_name)?;
        let record = self.store.load(network_name)?;
        Ok((0..steps.len())
            .filter(|ordinal| !record.is_applied(*ordinal))
            .collect())
    }

    /// Forgets everything applied on `network_name`; the next run starts from step 0.
    pub fn reset(&self, network_name: &str) -> Result<(), MigrationError> {
        self.config.network(network_name)?;
        let _lock = self.store.lock(network_name)?;
        self.store.clear(network_name)?;
        info!(network = network_name, "migration record cleared");
        Ok(())
    }

    pub async fn run(
        &mut self,
        network_name: &str,
        steps: &[DeployStep],
    ) -> Result<RunSummary, MigrationError> {
        self.state = RunnerState::Idle;
        let network = self.config.network(network_name)?;
        let _lock = self.store.lock(network_name)?;
        let mut record = self.store.load(network_name)?;
        warn_on_divergence(&record, steps);

        let mut summary = RunSummary::default();
        let mut accounts: Option<Vec<Address>> = None;

        info!(
            network = network_name,
            steps = steps.len(),
            applied = record.applied.len(),
            "starting migration"
        );
        self.state = RunnerState::Running(record.next_ordinal());

        for (ordinal, step) in steps.iter().enumerate() {
            if record.is_applied(ordinal) {
                debug!(ordinal, contract = %step.contract, "already applied, skipping");
                summary.skipped.push(ordinal);
                continue;
            }
            self.state = RunnerState::Running(ordinal);

            // only bother the signer once there is work to do
            if accounts.is_none() {
                match self.accounts.accounts(network).await {
                    Ok(resolved) => accounts = Some(resolved),
                    Err(e) => {
                        warn!(ordinal, network = network_name, "no signer accounts: {e}");
                        self.state = RunnerState::Failed(ordinal);
                        return Err(MigrationError::StepFailed {
                            ordinal,
                            cause: e.into(),
                        });
                    }
                }
            }
            let accounts = accounts.as_deref().unwrap_or_default();

            info!(ordinal, kind = %step.kind, contract = %step.contract, method = %step.method, "running step");
            let outcome = match step
                .execute(ordinal, network, accounts, &self.transport, &record)
                .await
            {
                Ok(outcome) => outcome,
                Err(cause) => {
                    warn!(ordinal, contract = %step.contract, "step failed: {cause}");
                    self.state = RunnerState::Failed(ordinal);
                    return Err(MigrationError::StepFailed { ordinal, cause });
                }
            };

            if let Err(e) = record
                .mark_applied(ordinal, step, &outcome)
                .and_then(|()| self.store.save(&record))
            {
                self.state = RunnerState::Failed(ordinal);
                return Err(e.into());
            }
            summary.applied.push(ordinal);
        }

        self.state = RunnerState::Completed;
        info!(
            network = network_name,
            applied = summary.applied.len(),
            skipped = summary.skipped.len(),
            "migration complete"
        );
        Ok(summary)
    }
}

use std::fmt;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::NetworkConfig,
    error::StepError,
    record::MigrationRecord,
    transport::{CallRequest, ContractTransport, CreateRequest, Deployment},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Create,
    Call,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Create => write!(f, "create"),
            StepKind::Call => write!(f, "call"),
        }
    }
}

/// A step argument, either literal or one of the unlocked accounts
/// (`{ account = 0 }` in a plan file).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StepArg {
    Account { account: usize },
    Literal(String),
}

impl From<&str> for StepArg {
    fn from(value: &str) -> Self {
        StepArg::Literal(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployStep {
    pub kind: StepKind,
    pub contract: String,
    /// initializer for a create, method for a call
    pub method: String,
    #[serde(default)]
    pub args: Vec<StepArg>,
    /// index of the signing account
    pub from: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Created(Deployment),
    Called { tx_hash: Option<H256> },
    /// the record already holds this step's deployment
    AlreadyApplied,
}

fn account_at(accounts: &[Address], index: usize) -> Result<Address, StepError> {
    accounts
        .get(index)
        .copied()
        .ok_or(StepError::MissingAccount {
            index,
            available: accounts.len(),
        })
}

impl DeployStep {
    pub fn create(contract: &str, initializer: &str, args: Vec<StepArg>, from: usize) -> Self {
        Self {
            kind: StepKind::Create,
            contract: contract.to_owned(),
            method: initializer.to_owned(),
            args,
            from,
        }
    }

    pub fn call(contract: &str, method: &str, args: Vec<StepArg>, from: usize) -> Self {
        Self {
            kind: StepKind::Call,
            contract: contract.to_owned(),
            method: method.to_owned(),
            args,
            from,
        }
    }

    /// Substitutes account references; addresses are rendered as 0x-prefixed hex.
    pub fn resolve_args(&self, accounts: &[Address]) -> Result<Vec<String>, StepError> {
        self.args
            .iter()
            .map(|arg| match arg {
                StepArg::Literal(value) => Ok(value.clone()),
                // debug fmt of an address is the full '0x..' encoding
                StepArg::Account { account } => Ok(format!("{:?}", account_at(accounts, *account)?)),
            })
            .collect()
    }

    pub async fn execute<T: ContractTransport + ?Sized>(
        &self,
        ordinal: usize,
        network: &NetworkConfig,
        accounts: &[Address],
        transport: &T,
        record: &MigrationRecord,
    ) -> Result<StepOutcome, StepError> {
        if self.kind == StepKind::Create && record.created_by(ordinal).is_some() {
            debug!(ordinal, contract = %self.contract, "already created, nothing to do");
            return Ok(StepOutcome::AlreadyApplied);
        }
        let from = account_at(accounts, self.from)?;
        let args = self.resolve_args(accounts)?;

        match self.kind {
            StepKind::Create => {
                let request = CreateRequest {
                    contract: self.contract.clone(),
                    initializer: self.method.clone(),
                    args,
                    from,
                };
                let deployment = transport.create(network, &request).await?;
                info!(
                    ordinal,
                    contract = %self.contract,
                    address = ?deployment.address,
                    "contract created"
                );
                Ok(StepOutcome::Created(deployment))
            }
            StepKind::Call => {
                let deployment = record
                    .deployment_of(&self.contract)
                    .ok_or_else(|| StepError::NotDeployed(self.contract.clone()))?;
                let address = deployment
                    .address
                    .ok_or_else(|| StepError::UnknownAddress(self.contract.clone()))?;

                let request = CallRequest {
                    contract: self.contract.clone(),
                    address,
                    method: self.method.clone(),
                    args,
                    from,
                };
                let tx_hash = transport.call(network, &request).await?;
                info!(
                    ordinal,
                    contract = %self.contract,
                    method = %self.method,
                    tx = ?tx_hash,
                    "method called"
                );
                Ok(StepOutcome::Called { tx_hash })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{accounts, local_network, FakeTransport};

    #[test]
    fn test_resolve_args() {
        let accounts = accounts(2);
        let step = DeployStep::create(
            "CallMeMaybe",
            "init",
            vec![StepArg::Account { account: 0 }, "maybe".into()],
            1,
        );

        let args = step.resolve_args(&accounts).unwrap();
        assert_eq!(args, vec![format!("{:?}", accounts[0]), "maybe".to_owned()]);
        assert!(args[0].starts_with("0x"));
        assert_eq!(args[0].len(), 42);
    }

    #[test]
    fn test_resolve_missing_account() {
        let step = DeployStep::create("Migrations", "initialize", vec![StepArg::Account { account: 3 }], 0);
        let err = step.resolve_args(&accounts(2)).unwrap_err();
        assert!(matches!(err, StepError::MissingAccount { index: 3, available: 2 }));
    }

    #[test]
    fn test_parse_step_from_toml() {
        let step: DeployStep = toml::from_str(
            r#"
            kind = "create"
            contract = "CallMeMaybe"
            method = "init"
            args = [{ account = 0 }, "maybe"]
            from = 1
            "#,
        )
        .unwrap();
        assert_eq!(
            step,
            DeployStep::create(
                "CallMeMaybe",
                "init",
                vec![StepArg::Account { account: 0 }, "maybe".into()],
                1
            )
        );
    }

    #[tokio::test]
    async fn test_create_signs_with_from_account() {
        let transport = FakeTransport::default();
        let accounts = accounts(2);
        let step = DeployStep::create("Migrations", "initialize", vec![StepArg::Account { account: 0 }], 1);

        let outcome = step
            .execute(0, &local_network(), &accounts, &transport, &MigrationRecord::new("local"))
            .await
            .unwrap();

        assert!(matches!(outcome, StepOutcome::Created(_)));
        let creates = transport.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].from, accounts[1]);
        assert_eq!(creates[0].args, vec![format!("{:?}", accounts[0])]);
    }

    #[tokio::test]
    async fn test_create_is_noop_when_recorded() {
        let transport = FakeTransport::default();
        let accounts = accounts(2);
        let step = DeployStep::create("Migrations", "initialize", vec![], 0);

        let mut record = MigrationRecord::new("local");
        record
            .mark_applied(0, &step, &StepOutcome::Created(transport.deployment_for("Migrations")))
            .unwrap();

        let outcome = step
            .execute(0, &local_network(), &accounts, &transport, &record)
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::AlreadyApplied);
        assert!(transport.creates().is_empty());
    }

    #[tokio::test]
    async fn test_recorded_create_needs_no_accounts() {
        let transport = FakeTransport::default();
        let step = DeployStep::create("Migrations", "initialize", vec![StepArg::Account { account: 3 }], 1);

        let mut record = MigrationRecord::new("local");
        record
            .mark_applied(0, &step, &StepOutcome::Created(transport.deployment_for("Migrations")))
            .unwrap();

        let outcome = step
            .execute(0, &local_network(), &[], &transport, &record)
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::AlreadyApplied);
        assert!(transport.executed().is_empty());
    }

    #[tokio::test]
    async fn test_call_requires_deployment() {
        let transport = FakeTransport::default();
        let step = DeployStep::call("CallMeMaybe", "setName", vec!["or not".into()], 0);

        let err = step
            .execute(2, &local_network(), &accounts(2), &transport, &MigrationRecord::new("local"))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::NotDeployed(name) if name == "CallMeMaybe"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_call_targets_recorded_address() {
        let transport = FakeTransport::default();
        let create = DeployStep::create("CallMeMaybe", "init", vec![], 0);
        let deployment = transport.deployment_for("CallMeMaybe");

        let mut record = MigrationRecord::new("local");
        record
            .mark_applied(0, &create, &StepOutcome::Created(deployment.clone()))
            .unwrap();

        let step = DeployStep::call("CallMeMaybe", "setName", vec!["or not".into()], 0);
        step.execute(1, &local_network(), &accounts(2), &transport, &record)
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(Some(calls[0].address), deployment.address);
        assert_eq!(calls[0].args, vec!["or not".to_owned()]);
    }

    #[tokio::test]
    async fn test_call_without_known_address() {
        let transport = FakeTransport::default();
        let create = DeployStep::create("CallMeMaybe", "init", vec![], 0);

        let mut record = MigrationRecord::new("local");
        record.mark_applied(
            0,
            &create,
            &StepOutcome::Created(Deployment {
                address: None,
                tx_hash: None,
            }),
        )
        .unwrap();

        let step = DeployStep::call("CallMeMaybe", "setName", vec![], 0);
        let err = step
            .execute(1, &local_network(), &accounts(1), &transport, &record)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::UnknownAddress(_)));
    }
}

use std::{collections::HashSet, fs, path::Path};

use serde::Deserialize;

use crate::{
    error::ConfigError,
    step::{DeployStep, StepKind},
    transport::ContractBindings,
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractAbi {
    pub name: String,
    /// human readable signatures, e.g. `function setName(string _name)`
    pub abi: Vec<String>,
}

/// The declarative list of steps applied to every network, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationPlan {
    #[serde(default)]
    pub contracts: Vec<ContractAbi>,
    #[serde(default)]
    pub steps: Vec<DeployStep>,
}

impl MigrationPlan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let plan: MigrationPlan = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// A call step may only target a contract some earlier step creates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut created = HashSet::new();
        for (ordinal, step) in self.steps.iter().enumerate() {
            let invalid = |reason: String| ConfigError::InvalidStep { ordinal, reason };

            if step.contract.trim().is_empty() {
                return Err(invalid("contract name is empty".to_owned()));
            }
            if step.method.trim().is_empty() {
                return Err(invalid("method name is empty".to_owned()));
            }
            match step.kind {
                StepKind::Create => {
                    created.insert(step.contract.as_str());
                }
                StepKind::Call if !created.contains(step.contract.as_str()) => {
                    return Err(invalid(format!(
                        "calls `{}` before any step creates it",
                        step.contract
                    )));
                }
                StepKind::Call => {}
            }
        }
        Ok(())
    }

    pub fn bindings(&self) -> Result<ContractBindings, ConfigError> {
        let mut bindings = ContractBindings::default();
        for contract in &self.contracts {
            bindings.insert(&contract.name, &contract.abi)?;
        }
        Ok(bindings)
    }
}

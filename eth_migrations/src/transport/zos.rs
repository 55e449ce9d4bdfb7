use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use ethers::types::{Address, H256};
use tokio::{process::Command, time::timeout};
use tracing::debug;

use super::{CallRequest, ContractTransport, CreateRequest, Deployment};
use crate::{config::NetworkConfig, error::StepError};

pub const DEFAULT_PROGRAM: &str = "zos";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Drives the zos command line tool, one subprocess per step.
#[derive(Clone, Debug)]
pub struct ZosCli {
    program: String,
    /// arguments placed before the zos subcommand, e.g. `zos` for `npx zos`
    base_args: Vec<String>,
    timeout: Duration,
}

impl Default for ZosCli {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

fn joined_args(args: &[String]) -> Result<Option<String>, StepError> {
    if let Some(arg) = args.iter().find(|arg| arg.contains(',')) {
        return Err(StepError::InvalidArguments(format!(
            "`{arg}` contains a comma, which zos uses as argument separator"
        )));
    }
    Ok((!args.is_empty()).then(|| args.join(",")))
}

/// zos prints the address of a created instance; take the last address-like
/// token of stdout, falling back to stderr.
pub fn scrape_address(stdout: &str, stderr: &str) -> Option<Address> {
    let last_address = |text: &str| {
        text.split_whitespace()
            .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
            .filter(|token| token.starts_with("0x") && token.len() == 42)
            .filter_map(|token| token.parse::<Address>().ok())
            .last()
    };
    last_address(stdout).or_else(|| last_address(stderr))
}

impl ZosCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout,
        }
    }

    /// Splits a command line such as `npx zos` into program and leading arguments.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self {
            program,
            base_args: parts.collect(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create_args(
        network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Vec<String>, StepError> {
        let mut args = vec![
            "create".to_owned(),
            request.contract.clone(),
            "--init".to_owned(),
            request.initializer.clone(),
        ];
        if let Some(joined) = joined_args(&request.args)? {
            args.extend(["--args".to_owned(), joined]);
        }
        args.extend([
            "--network".to_owned(),
            network.name.clone(),
            "--from".to_owned(),
            format!("{:?}", request.from),
        ]);
        Ok(args)
    }

    pub fn call_args(network: &NetworkConfig, request: &CallRequest) -> Result<Vec<String>, StepError> {
        let mut args = vec![
            "send-tx".to_owned(),
            "--to".to_owned(),
            format!("{:?}", request.address),
            "--method".to_owned(),
            request.method.clone(),
        ];
        if let Some(joined) = joined_args(&request.args)? {
            args.extend(["--args".to_owned(), joined]);
        }
        args.extend([
            "--network".to_owned(),
            network.name.clone(),
            "--from".to_owned(),
            format!("{:?}", request.from),
        ]);
        Ok(args)
    }

    /// Runs zos to completion; `(stdout, stderr)` on a zero exit status.
    async fn exec(&self, args: Vec<String>) -> Result<(String, String), StepError> {
        debug!(program = %self.program, ?args, "running zos");

        let child = Command::new(&self.program)
            .args(&self.base_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepError::CommandFailed {
                program: self.program.clone(),
                code: None,
                stderr: format!("failed to start: {e}"),
            })?;

        // dropping the child on timeout kills it
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| StepError::Timeout(self.timeout))?
            .map_err(|e| StepError::CommandFailed {
                program: self.program.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(StepError::CommandFailed {
                program: self.program.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_owned(),
            });
        }
        Ok((stdout, stderr))
    }
}

#[async_trait]
impl ContractTransport for ZosCli {
    async fn create(
        &self,
        network: &NetworkConfig,
        request: &CreateRequest,
    ) -> Result<Deployment, StepError> {
        let (stdout, stderr) = self.exec(Self::create_args(network, request)?).await?;
        Ok(Deployment {
            address: scrape_address(&stdout, &stderr),
            tx_hash: None,
        })
    }

    async fn call(
        &self,
        network: &NetworkConfig,
        request: &CallRequest,
    ) -> Result<Option<H256>, StepError> {
        self.exec(Self::call_args(network, request)?).await?;
        Ok(None)
    }
}

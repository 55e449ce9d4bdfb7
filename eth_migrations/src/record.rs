use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::RecordError,
    step::{DeployStep, StepKind, StepOutcome},
    transport::Deployment,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStep {
    pub ordinal: usize,
    pub applied_at: DateTime<Utc>,
    pub kind: StepKind,
    pub contract: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
    // not written by the runner, can be edited by hand in the <network>.json file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Which step ordinals already ran on a network. Applied ordinals always
/// form the prefix `0..applied.len()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub network: String,
    #[serde(default)]
    pub applied: Vec<AppliedStep>,
}

impl MigrationRecord {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_owned(),
            applied: Vec::new(),
        }
    }

    pub fn is_applied(&self, ordinal: usize) -> bool {
        self.applied.iter().any(|step| step.ordinal == ordinal)
    }

    pub fn applied_ordinals(&self) -> Vec<usize> {
        self.applied.iter().map(|step| step.ordinal).collect()
    }

    /// The only ordinal that may be appended next.
    pub fn next_ordinal(&self) -> usize {
        self.applied.len()
    }

    pub fn created_by(&self, ordinal: usize) -> Option<&AppliedStep> {
        self.applied
            .iter()
            .find(|step| step.ordinal == ordinal && step.kind == StepKind::Create)
    }

    /// Latest deployment of `contract`, if any create step for it was applied.
    pub fn deployment_of(&self, contract: &str) -> Option<Deployment> {
        self.applied
            .iter()
            .rev()
            .find(|step| step.kind == StepKind::Create && step.contract == contract)
            .map(|step| Deployment {
                address: step.address,
                tx_hash: step.tx_hash,
            })
    }

    pub fn mark_applied(
        &mut self,
        ordinal: usize,
        step: &DeployStep,
        outcome: &StepOutcome,
    ) -> Result<(), RecordError> {
        if self.is_applied(ordinal) {
            return Ok(());
        }
        if ordinal != self.next_ordinal() {
            return Err(self.corrupt(format!(
                "cannot apply step {ordinal} before step {}",
                self.next_ordinal()
            )));
        }

        let (address, tx_hash) = match outcome {
            StepOutcome::Created(deployment) => (deployment.address, deployment.tx_hash),
            StepOutcome::Called { tx_hash } => (None, *tx_hash),
            StepOutcome::AlreadyApplied => (None, None),
        };
        self.applied.push(AppliedStep {
            ordinal,
            applied_at: Utc::now(),
            kind: step.kind,
            contract: step.contract.clone(),
            method: step.method.clone(),
            address,
            tx_hash,
            comment: None,
        });
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        for (expected, step) in self.applied.iter().enumerate() {
            if step.ordinal != expected {
                return Err(self.corrupt(format!(
                    "entry #{expected} has ordinal {}, applied ordinals must be contiguous from 0",
                    step.ordinal
                )));
            }
        }
        Ok(())
    }

    fn corrupt(&self, reason: String) -> RecordError {
        RecordError::Corrupt {
            network: self.network.clone(),
            reason,
        }
    }
}

/// Held for the duration of a run. File-backed locks are released on drop.
#[derive(Debug)]
pub struct RecordLock {
    path: Option<PathBuf>,
}

impl RecordLock {
    pub fn unlocked() -> Self {
        Self { path: None }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), "failed to release migration lock: {e}");
            }
        }
    }
}

pub trait RecordStore: Send + Sync {
    /// Single writer per network.
    fn lock(&self, network: &str) -> Result<RecordLock, RecordError>;
    /// Empty record when nothing ran on this network yet.
    fn load(&self, network: &str) -> Result<MigrationRecord, RecordError>;
    fn save(&self, record: &MigrationRecord) -> Result<(), RecordError>;
    fn clear(&self, network: &str) -> Result<(), RecordError>;
}

/// Stores `<dir>/<network>.json`.
#[derive(Clone, Debug)]
pub struct FileRecordStore {
    dir: PathBuf,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> RecordError + '_ {
    move |source| RecordError::Io {
        path: path.to_owned(),
        source,
    }
}

impl FileRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, network: &str) -> PathBuf {
        self.dir.join(format!("{network}.json"))
    }

    fn lock_path(&self, network: &str) -> PathBuf {
        self.dir.join(format!("{network}.lock"))
    }

    fn ensure_dir(&self) -> Result<(), RecordError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))
    }
}

impl RecordStore for FileRecordStore {
    fn lock(&self, network: &str) -> Result<RecordLock, RecordError> {
        self.ensure_dir()?;
        let path = self.lock_path(network);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RecordError::Locked(network.to_owned()))
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        // best effort, the lock is the file itself
        let _ = writeln!(file, "{}", std::process::id());
        Ok(RecordLock { path: Some(path) })
    }

    fn load(&self, network: &str) -> Result<MigrationRecord, RecordError> {
        let path = self.record_path(network);
        if !path.exists() {
            return Ok(MigrationRecord::new(network));
        }
        let content = fs::read(&path).map_err(io_error(&path))?;
        let record: MigrationRecord =
            serde_json::from_slice(&content).map_err(|source| RecordError::Malformed {
                path: path.clone(),
                source,
            })?;
        if record.network != network {
            return Err(RecordError::Corrupt {
                network: network.to_owned(),
                reason: format!("{} belongs to network `{}`", path.display(), record.network),
            });
        }
        record.validate()?;
        Ok(record)
    }

    fn save(&self, record: &MigrationRecord) -> Result<(), RecordError> {
        self.ensure_dir()?;
        let path = self.record_path(&record.network);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record).map_err(|source| {
            RecordError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&tmp_path, content).map_err(io_error(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(io_error(&path))
    }

    fn clear(&self, network: &str) -> Result<(), RecordError> {
        let path = self.record_path(network);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

/// Keeps records in process memory, nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, MigrationRecord>>,
}

impl MemoryRecordStore {
    pub fn contains(&self, network: &str) -> bool {
        self.records
            .lock()
            .map(|records| records.contains_key(network))
            .unwrap_or(false)
    }
}

impl RecordStore for MemoryRecordStore {
    fn lock(&self, _network: &str) -> Result<RecordLock, RecordError> {
        Ok(RecordLock::unlocked())
    }

    fn load(&self, network: &str) -> Result<MigrationRecord, RecordError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .get(network)
            .cloned()
            .unwrap_or_else(|| MigrationRecord::new(network)))
    }

    fn save(&self, record: &MigrationRecord) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.network.clone(), record.clone());
        Ok(())
    }

    fn clear(&self, network: &str) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(network);
        Ok(())
    }
}

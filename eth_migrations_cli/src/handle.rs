use std::io::Write;

use anyhow::Context;
use eth_migrations::{
    transport::{ContractTransport, EthersTransport, ZosCli},
    Config, FileRecordStore, MigrationPlan, MigrationRunner, NetworkAccounts,
};

use crate::command::{Cli, TransportKind};

fn transport(cli: &Cli, plan: &MigrationPlan) -> anyhow::Result<Box<dyn ContractTransport>> {
    let zos = ZosCli::from_command_line(&cli.zos_bin, cli.timeout)
        .context("--zos-bin must not be empty")?;
    Ok(match cli.transport {
        TransportKind::Cli => Box::new(zos),
        TransportKind::Rpc => Box::new(EthersTransport::new(zos, plan.bindings()?)),
    })
}

/// Applies, or with `--dry-run` lists, the pending steps of `cli.network`.
/// A failed step comes back as the error, carrying its ordinal.
pub async fn migrate(cli: &Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading networks from {}", cli.config.display()))?;
    let plan = MigrationPlan::load(&cli.plan)
        .with_context(|| format!("loading migration plan from {}", cli.plan.display()))?;

    let mut runner = MigrationRunner::new(
        config,
        transport(cli, &plan)?,
        NetworkAccounts,
        FileRecordStore::new(&cli.records_dir),
    );

    if cli.dry_run {
        let pending = if cli.reset {
            runner.network(&cli.network)?;
            (0..plan.steps.len()).collect()
        } else {
            runner.pending(&cli.network, &plan.steps)?
        };
        if pending.is_empty() {
            writeln!(out, "{}: up to date", cli.network)?;
        }
        for ordinal in pending {
            let step = &plan.steps[ordinal];
            writeln!(
                out,
                "{}: step {ordinal} would {} {}.{}",
                cli.network, step.kind, step.contract, step.method
            )?;
        }
        return Ok(());
    }

    if cli.reset {
        runner.reset(&cli.network)?;
    }
    let summary = runner.run(&cli.network, &plan.steps).await?;
    writeln!(
        out,
        "{}: applied {} step(s), {} already applied",
        cli.network,
        summary.applied.len(),
        summary.skipped.len()
    )?;
    Ok(())
}

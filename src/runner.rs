//! Locked upgrade/downgrade runs driven by the CLI.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use revchain_core::store::sql;
use revchain_core::{plan, Chain, Direction, Executor, Plan, RunLock, RunReport, Target};

use crate::config::Config;

#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing was executed; `sql` is what would have run.
    DryRun { plan: Plan, sql: Vec<String> },
    Ran(RunReport),
}

/// Move the database to `target`, refusing plans that go the other way.
pub fn run(
    config: &Config,
    target: &Target,
    direction: Direction,
    dry_run: bool,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<RunOutcome> {
    let chain = config.load_chain()?;

    if dry_run {
        let plan = checked_plan(config, target, direction, &chain)?;
        let sql = sql::render_plan(&plan)?;
        return Ok(RunOutcome::DryRun { plan, sql });
    }

    let _lock = RunLock::acquire(config.lock_path(), &format!("{} {}", direction, target))?;
    // Plan against the peeked marker so a bad target never creates the database.
    let plan = checked_plan(config, target, direction, &chain)?;
    let mut store = config.open_store()?;

    if plan.is_empty() {
        tracing::info!("already at {}", target);
    } else {
        tracing::info!(
            steps = plan.steps.len(),
            "{} from {} to {}",
            plan.direction,
            display_marker(plan.from.as_ref()),
            display_marker(plan.to.as_ref())
        );
    }

    let report = Executor::new(&mut store).with_cancel(cancel).run_plan(&plan);
    Ok(RunOutcome::Ran(report))
}

fn checked_plan(
    config: &Config,
    target: &Target,
    direction: Direction,
    chain: &Chain,
) -> anyhow::Result<Plan> {
    let marker = config.peek_marker()?;
    let plan = plan(marker.as_ref(), target, chain)?;
    plan.ensure_direction(direction)?;
    Ok(plan)
}

pub fn display_marker(marker: Option<&revchain_core::RevisionId>) -> String {
    marker
        .map(|id| id.to_string())
        .unwrap_or_else(|| "base".to_string())
}

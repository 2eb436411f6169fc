//! Turns the text output of the Slurm command line tools into per account, per user and per
//! job/node numbers.
//!
//! Nothing is cached: every call of [`collect_entity_totals`] / [`collect_job_assignments`]
//! re-runs the commands and re-parses from scratch.
pub mod job;
pub mod node;
pub mod queue;
pub mod slurm;
pub mod state;
pub mod tres;

use color_eyre::{eyre::Context as _, Result};
use tracing::{debug, instrument};

use job::{parse_detail, DetailReport};
use queue::{aggregate_queue, EntityKind, EntityTotalsMap};
use slurm::SlurmSource;

/// Fetch a fresh queue dump and fold it into per account or per user totals.
#[instrument(skip(source))]
pub fn collect_entity_totals<S>(source: &S, kind: EntityKind) -> Result<EntityTotalsMap>
where
    S: SlurmSource + ?Sized,
{
    let dump = source.queue(kind).wrap_err_with(|| format!("fetching queue by {kind}"))?;
    let totals = aggregate_queue(&dump);
    debug!(entities = totals.len(), "aggregated queue");
    Ok(totals)
}

/// Fetch a fresh detail dump and expand it into one row per job and node.
#[instrument(skip(source))]
pub fn collect_job_assignments<S>(source: &S) -> Result<DetailReport>
where
    S: SlurmSource + ?Sized,
{
    let dump = source.job_details().wrap_err("fetching job details")?;
    parse_detail(&dump, source)
}

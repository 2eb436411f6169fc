//! `squeue` dump parsing and the per account / per user totals built from it.
//!
//! The dump has one job per line and five whitespace separated columns:
//!
//! ```text
//! 123   acct1   RUNNING   cpu=4,mem=16000M,node=1,billing=4   node01
//! ```
//!
//! The second column is either the account or the user name, depending on which [`EntityKind`]
//! the dump was requested for. Everything else is identical, so both views share this parser.

use std::collections::BTreeMap;

use derive_more::derive::Display;

use crate::{state::StateClass, tres::Resources};

/// What the second column of a queue dump holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntityKind {
    #[display("account")]
    Account,
    #[display("user")]
    User,
}

impl EntityKind {
    /// Name of the `squeue -O` field producing the entity column.
    pub fn squeue_field(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::User => "username",
        }
    }
}

/// One parsed line of a queue dump.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRecord {
    pub job_id: String,
    /// Account or user name, whatever the dump was requested for.
    pub entity: String,
    pub state_class: StateClass,
    /// `mem` in gigabytes.
    pub resources: Resources,
    pub nodelist: Option<String>,
}

impl QueueRecord {
    /// Parse one line. Lines with fewer than four columns (blank lines, trailing newline) yield
    /// `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let (job_id, entity, state, tres) = (fields.next()?, fields.next()?, fields.next()?, fields.next()?);

        Some(QueueRecord {
            job_id: job_id.to_owned(),
            entity: entity.to_owned(),
            state_class: StateClass::classify(state),
            resources: Resources::from_tres(tres),
            nodelist: fields.next().map(String::from),
        })
    }
}

/// Job counts and running resources of one account or user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTotals {
    pub pending: u64,
    pub running: u64,
    pub running_cpus: f64,
    pub running_gpus: f64,
    pub running_mem_gb: f64,
    pub suspended: u64,
}

impl EntityTotals {
    pub fn add(&mut self, record: &QueueRecord) {
        match record.state_class {
            StateClass::Pending => self.pending += 1,
            StateClass::Running => {
                self.running += 1;
                self.running_cpus += record.resources.cpus;
                self.running_gpus += record.resources.gpus;
                self.running_mem_gb += record.resources.mem;
            }
            StateClass::Suspended => self.suspended += 1,
            StateClass::Other => {}
        }
    }
}

/// Totals keyed by account or user name. Ordered, so that the exported metrics come out stable.
pub type EntityTotalsMap = BTreeMap<String, EntityTotals>;

/// Fold a whole queue dump into per entity totals.
///
/// An entity shows up as soon as any of its jobs is listed, even if none of them is in a
/// counted state.
pub fn aggregate_queue(input: &str) -> EntityTotalsMap {
    let mut totals = EntityTotalsMap::new();
    for record in input.lines().filter_map(QueueRecord::parse) {
        totals.entry(record.entity.clone()).or_default().add(&record);
    }
    totals
}

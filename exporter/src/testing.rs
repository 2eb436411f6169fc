//! Canned Slurm output for exporter tests.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use collector_data::{node::HostnameExpander, queue::EntityKind, slurm::SlurmSource};
use color_eyre::{eyre::eyre, Result};

pub const SQUEUE_ACCOUNTS: &str = "\
4711   physics     RUNNING     cpu=4,mem=16000M,node=1,billing=4             node01
4712   physics     RUNNING     cpu=8,mem=32G,node=2,billing=8,gres/gpu=2     gpu[01-02]
4713   physics     PENDING     cpu=2,mem=8G,node=1,billing=2
4715   chemistry   SUSPENDED   cpu=1,mem=1000M,node=1,billing=1              node03
4717   biology     COMPLETED   cpu=1,mem=1G,node=1,billing=1                 node05
";

pub const SQUEUE_USERS: &str = "\
4711   alice   RUNNING     cpu=4,mem=16000M,node=1,billing=4             node01
4712   alice   RUNNING     cpu=8,mem=32G,node=2,billing=8,gres/gpu=2     gpu[01-02]
4713   bob     PENDING     cpu=2,mem=8G,node=1,billing=2
";

pub const SCONTROL_JOBS: &str = "\
JobId=4711 JobName=sim UserId=alice(1001) GroupId=alice(1001) Account=physics QOS=normal JobState=RUNNING Reason=None NodeList=node01 NumNodes=1 JOB_GRES=(null) Nodes=node01 CPU_IDs=0-3 Mem=16000 GRES= MinCPUsNode=4
JobId=4712 JobName=train UserId=alice(1001) GroupId=alice(1001) Account=physics QOS=normal JobState=RUNNING Reason=None NodeList=gpu[01-02] NumNodes=2 JOB_GRES=gpu:2 Nodes=gpu[01-02] CPU_IDs=0-3 Mem=16384 GRES=gpu:1(IDX:0) MinCPUsNode=4
JobId=4713 JobName=wait UserId=bob(1002) GroupId=bob(1002) Account=physics QOS=normal JobState=PENDING Reason=Resources NodeList=(null) NumNodes=1
JobId=4720 JobName=broken UserId=bob(1002) GroupId=bob(1002) QOS=normal JobState=RUNNING NodeList=node09 Nodes=node09 CPU_IDs=0 Mem=1 GRES=
";

/// A [`SlurmSource`] replaying fixed text. The detail dump can be swapped between scrapes.
#[derive(Debug)]
pub struct Canned {
    pub accounts: String,
    pub users: String,
    pub details: Mutex<String>,
    pub hostnames: HashMap<String, String>,
    pub broken: bool,
}

impl Canned {
    pub fn new() -> Self {
        Canned {
            accounts: SQUEUE_ACCOUNTS.to_owned(),
            users: SQUEUE_USERS.to_owned(),
            details: Mutex::new(SCONTROL_JOBS.to_owned()),
            hostnames: [("gpu[01-02]".to_owned(), "gpu01\ngpu02\n".to_owned())].into_iter().collect(),
            broken: false,
        }
    }

    /// Every command fails, as on a host where `squeue` is missing.
    pub fn broken() -> Self {
        Canned {
            broken: true,
            ..Self::new()
        }
    }

    pub fn set_details(&self, details: &str) {
        *self.details.lock().unwrap_or_else(PoisonError::into_inner) = details.to_owned();
    }

    fn check(&self, what: &str) -> Result<()> {
        if self.broken {
            return Err(eyre!("{what}: command not found"));
        }
        Ok(())
    }
}

impl HostnameExpander for Canned {
    fn hostnames(&self, nodelist: &str) -> Result<String> {
        self.check("scontrol")?;
        self.hostnames
            .get(nodelist)
            .cloned()
            .ok_or_else(|| eyre!("scontrol: error: Invalid hostlist: {nodelist}"))
    }
}

impl SlurmSource for Canned {
    fn queue(&self, kind: EntityKind) -> Result<String> {
        self.check("squeue")?;
        Ok(match kind {
            EntityKind::Account => self.accounts.clone(),
            EntityKind::User => self.users.clone(),
        })
    }

    fn job_details(&self) -> Result<String> {
        self.check("scontrol")?;
        Ok(self.details.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

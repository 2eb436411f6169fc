use std::{
    collections::HashMap,
    env,
    net::{IpAddr, SocketAddr},
    path::Path,
};

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cli::Args;

const DEFAULT_LISTEN_IP: &str = "0.0.0.0";
const DEFAULT_LISTEN_PORT: u16 = 8080;
const ENV_PREFIX: &str = "SLURM_EXPORTER";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub listen_ip: IpAddr,
    pub listen_port: u16,
    /// Exit with an error after the first failed scrape.
    pub fail_fast: bool,
    pub collectors: Collectors,
}

/// Which collectors get registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Collectors {
    pub accounts: bool,
    pub users: bool,
    pub jobs: bool,
}

impl Settings {
    /// Defaults, `config/default`, `config/$RUN_MODE`, the file given with `--config`, then
    /// `SLURM_EXPORTER_*` variables. Listen address flags win over all of them.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "default".into());

        let mut settings: Settings = layers(&run_mode, args.config.as_deref())?
            .add_source(environment(None))
            .build()?
            .try_deserialize()?;

        if let Some(ip) = args.listen_ip {
            settings.listen_ip = ip;
        }
        if let Some(port) = args.listen_port {
            settings.listen_port = port;
        }
        Ok(settings)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("listen_ip", DEFAULT_LISTEN_IP)?
        .set_default("listen_port", i64::from(DEFAULT_LISTEN_PORT))?
        .set_default("fail_fast", true)?
        .set_default("collectors.accounts", true)?
        .set_default("collectors.users", true)?
        .set_default("collectors.jobs", true)
}

fn layers(run_mode: &str, config_file: Option<&Path>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = defaults()?
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false));
    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path));
    }
    Ok(builder)
}

/// `SLURM_EXPORTER_LISTEN_PORT`, `SLURM_EXPORTER_COLLECTORS__JOBS`, ...
///
/// `vars` replaces the process environment, for tests.
fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(vars)
}

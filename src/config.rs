use crate::cli::Cli;
use serde::{Serialize, Serializer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Resolved process configuration (flags, then environment, then defaults).
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub data_file: PathBuf,
    pub bind: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    pub admin_username: Option<String>,
    #[serde(serialize_with = "redacted")]
    pub admin_password: Option<String>,
}

fn redacted<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => s.serialize_str("********"),
        None => s.serialize_none(),
    }
}

impl AppConfig {
    /// Both bootstrap variables, if both are present and non-empty.
    pub fn bootstrap_credentials(&self) -> Option<(&str, &str)> {
        let user = self.admin_username.as_deref().filter(|s| !s.is_empty())?;
        let pass = self.admin_password.as_deref().filter(|s| !s.is_empty())?;
        Some((user, pass))
    }
}

/// Build an `AppConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> AppConfig {
    AppConfig {
        data_file: args
            .data_file
            .clone()
            .unwrap_or_else(crate::storage::default_data_file),
        bind: args.bind,
        stop_timeout: Duration::from(args.stop_timeout),
        admin_username: args.admin_username.clone(),
        admin_password: args.admin_password.clone(),
    }
}

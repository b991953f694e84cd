//! Client configuration resolved from flags and environment

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use ipc_transport::DEFAULT_TIMEOUT;

use crate::session::DEFAULT_ASSOCIATION_TIMEOUT;

/// Options shared by every subcommand
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path of the password manager's browser socket
    #[arg(long, global = true, env = "KPXC_SOCKET", value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Path of the association store
    #[arg(long, global = true, env = "KPXC_STORE", value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Seconds to wait for each reply
    #[arg(
        long,
        global = true,
        env = "KPXC_TIMEOUT",
        value_name = "SECS",
        default_value_t = DEFAULT_TIMEOUT.as_secs()
    )]
    pub timeout: u64,

    /// Seconds to wait for the user to approve a new association
    #[arg(
        long,
        global = true,
        env = "KPXC_ASSOCIATION_TIMEOUT",
        value_name = "SECS",
        default_value_t = DEFAULT_ASSOCIATION_TIMEOUT.as_secs()
    )]
    pub association_timeout: u64,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub socket_path: PathBuf,
    pub store_path: PathBuf,
    pub timeout: Duration,
    pub association_timeout: Duration,
}

impl ClientConfig {
    /// Fill in platform defaults for anything not given
    pub fn resolve(args: &GlobalArgs) -> anyhow::Result<Self> {
        if args.timeout == 0 {
            bail!("--timeout must be at least one second");
        }
        if args.association_timeout == 0 {
            bail!("--association-timeout must be at least one second");
        }

        let socket_path = match &args.socket {
            Some(path) => path.clone(),
            None => ipc_transport::default_socket_path()
                .context("Cannot locate the password manager socket, pass --socket")?,
        };
        let store_path = match &args.store {
            Some(path) => path.clone(),
            None => association_store::default_store_path()
                .context("Cannot locate the association store, pass --store")?,
        };

        Ok(Self {
            socket_path,
            store_path,
            timeout: Duration::from_secs(args.timeout),
            association_timeout: Duration::from_secs(args.association_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GlobalArgs {
        GlobalArgs {
            socket: Some(PathBuf::from("/run/test.sock")),
            store: Some(PathBuf::from("/tmp/associations.json")),
            timeout: 30,
            association_timeout: 120,
            verbose: 0,
        }
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = ClientConfig::resolve(&args()).unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/test.sock"));
        assert_eq!(config.store_path, PathBuf::from("/tmp/associations.json"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.association_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut args = args();
        args.timeout = 0;
        assert!(ClientConfig::resolve(&args).is_err());

        let mut args = self::args();
        args.association_timeout = 0;
        assert!(ClientConfig::resolve(&args).is_err());
    }
}

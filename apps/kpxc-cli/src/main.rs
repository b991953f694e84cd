//! kpxc - fetch credentials from a running KeePassXC
//!
//! Talks to the password manager over its browser-integration socket,
//! registering this client on first use, and prints the requested login
//! name or password on stdout.

mod commands;
mod config;
mod session;
#[cfg(test)]
mod testing;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use association_store::AssociationStore;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use commands::Command;
use config::{ClientConfig, GlobalArgs};
use session::Session;

#[derive(Debug, Parser)]
#[command(name = "kpxc", version, about = "Fetch logins from a running KeePassXC")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print the login name stored for a URL
    GetLogin {
        url: String,
        /// Print every matching login, best match first
        #[arg(short, long)]
        all: bool,
    },
    /// Print the password stored for a URL
    GetPw {
        url: String,
        /// Pick the entry with this login name
        #[arg(short, long, value_name = "NAME")]
        login: Option<String>,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::GetLogin { url, all } => Command::GetLogin { url, all },
            CliCommand::GetPw { url, login } => Command::GetPw { url, login },
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli).await {
        Ok(lines) => {
            let mut stdout = std::io::stdout().lock();
            for line in &lines {
                if let Err(e) = writeln!(stdout, "{}", line.as_str()) {
                    error!("Failed to write output: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("kpxc: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Vec<Zeroizing<String>>> {
    let config = ClientConfig::resolve(&cli.global)?;
    let command = Command::from(cli.command);
    debug!("Resolved configuration: {:?}", config);

    let mut store = AssociationStore::load(&config.store_path)?;
    info!(
        "Loaded {} association(s) from {}",
        store.len(),
        store.path().display()
    );

    let channel = ipc_transport::connect(&config.socket_path, config.timeout)
        .await
        .context("Is KeePassXC running with browser integration enabled?")?;
    let mut session = Session::new(channel).with_association_timeout(config.association_timeout);

    let result = commands::execute(&mut session, &mut store, &command).await;
    debug!("Session finished in state {}", session.state());
    session.close().await;

    let saved = if store.is_dirty() {
        store.save()
    } else {
        Ok(())
    };

    match (result, saved) {
        (Ok(lines), Ok(())) => Ok(lines),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e.into()),
        (Err(e), Err(save_error)) => {
            error!("{}", save_error);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_get_pw() {
        let cli = Cli::try_parse_from([
            "kpxc",
            "--socket",
            "/run/kp.sock",
            "-vv",
            "get-pw",
            "https://example.com",
            "--login",
            "bob",
        ])
        .unwrap();

        assert_eq!(cli.global.verbose, 2);
        assert_eq!(
            Command::from(cli.command),
            Command::GetPw {
                url: "https://example.com".to_string(),
                login: Some("bob".to_string()),
            }
        );
    }

    #[test]
    fn test_cli_parses_get_login_all() {
        let cli = Cli::try_parse_from(["kpxc", "get-login", "-a", "https://example.com"]).unwrap();

        assert_eq!(
            Command::from(cli.command),
            Command::GetLogin {
                url: "https://example.com".to_string(),
                all: true,
            }
        );
    }

    #[test]
    fn test_cli_requires_url() {
        assert!(Cli::try_parse_from(["kpxc", "get-pw"]).is_err());
    }

    #[cfg(unix)]
    mod end_to_end {
        use std::path::Path;
        use std::time::Duration;

        use association_store::StoreError;
        use tokio::net::UnixListener;
        use tokio::task::JoinHandle;

        use super::*;
        use crate::commands::{CommandError, LookupError};
        use crate::testing::{FakePeer, SITE};

        /// Serve `peer` on a fresh socket under `dir` for a single connection
        fn listen(dir: &Path, peer: FakePeer) -> (String, JoinHandle<FakePeer>) {
            let socket = dir.join("kpxc.sock");
            let listener = UnixListener::bind(&socket).unwrap();
            let handle = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                peer.serve(stream).await
            });
            (socket.to_str().unwrap().to_string(), handle)
        }

        fn cli(socket: &str, store: &Path, args: &[&str]) -> Cli {
            let mut argv = vec!["kpxc", "--socket", socket, "--store", store.to_str().unwrap()];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap()
        }

        /// The peer only returns once the client has hung up
        async fn finished(handle: JoinHandle<FakePeer>) -> FakePeer {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("connection left open")
                .unwrap()
        }

        #[tokio::test]
        async fn test_new_association_saved_when_lookup_fails() {
            let dir = tempfile::tempdir().unwrap();
            let store_path = dir.path().join("associations.json");
            let (socket, peer) = listen(dir.path(), FakePeer::new("db"));

            let cli = cli(&socket, &store_path, &["get-login", "https://nowhere.test"]);
            let error = run(cli).await.unwrap_err();

            assert!(matches!(
                error.downcast_ref::<CommandError>(),
                Some(CommandError::Lookup(LookupError::NoEntries(_)))
            ));

            let peer = finished(peer).await;
            let store = AssociationStore::load(&store_path).unwrap();
            let record = store.get_key("db").unwrap();
            assert_eq!(record.id, "kpxc-cli-1");
            assert_eq!(peer.known.get(&record.id), Some(&record.id_key));
        }

        #[tokio::test]
        async fn test_reused_association_leaves_file_untouched() {
            let dir = tempfile::tempdir().unwrap();
            let store_path = dir.path().join("associations.json");
            let contents = r#"{"db": {"id": "kpxc-cli-9", "idKey": "a2V5"}}"#;
            std::fs::write(&store_path, contents).unwrap();
            let peer = FakePeer::new("db")
                .knowing("kpxc-cli-9", "a2V5")
                .with_entries(&[("alice", "pw-a"), ("bob", "pw-b")]);
            let (socket, peer) = listen(dir.path(), peer);

            let url = format!("https://{SITE}");
            let args = ["get-login", "--all", url.as_str()];
            let lines = run(cli(&socket, &store_path, &args)).await.unwrap();

            let lines: Vec<&str> = lines.iter().map(|line| line.as_str()).collect();
            assert_eq!(lines, ["alice", "bob"]);
            finished(peer).await;
            assert_eq!(std::fs::read_to_string(&store_path).unwrap(), contents);
        }

        #[tokio::test]
        async fn test_save_failure_after_success_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let blocker = dir.path().join("blocker");
            let store_path = blocker.join("associations.json");
            let peer = FakePeer::new("db").with_entries(&[("alice", "pw-a")]);

            // the store loads as empty, then its directory becomes a plain file
            let socket = dir.path().join("kpxc.sock");
            let listener = UnixListener::bind(&socket).unwrap();
            let server = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                std::fs::write(&blocker, b"not a directory").unwrap();
                peer.serve(stream).await
            });

            let url = format!("https://{SITE}");
            let cli = cli(socket.to_str().unwrap(), &store_path, &["get-pw", url.as_str()]);
            let error = run(cli).await.unwrap_err();

            assert!(matches!(
                error.downcast_ref::<StoreError>(),
                Some(StoreError::Save { .. })
            ));
            finished(server).await;
        }
    }
}

//! Command handlers

use association_store::AssociationStore;
use shared_protocol::CredentialEntry;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::session::{AuthOutcome, Session, SessionError, authenticate};

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the login name of the best match, or of every match
    GetLogin { url: String, all: bool },
    /// Print the password of the best match, or of the match with this login
    GetPw { url: String, login: Option<String> },
}

impl Command {
    pub fn url(&self) -> &str {
        match self {
            Self::GetLogin { url, .. } | Self::GetPw { url, .. } => url,
        }
    }
}

/// The peer answered but nothing fit the request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("No logins found for {0}")]
    NoEntries(String),

    #[error("No login named '{0}'")]
    NoLogin(String),
}

/// Error type for commands
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Login names to print, first match only unless `all` is set
pub fn select_logins(entries: &[CredentialEntry], all: bool) -> Vec<Zeroizing<String>> {
    let take = if all { entries.len() } else { 1 };
    entries
        .iter()
        .take(take)
        .map(|entry| Zeroizing::new(entry.login.clone()))
        .collect()
}

/// Password of the first entry, or of the first entry whose login matches
pub fn select_password(
    entries: &[CredentialEntry],
    login: Option<&str>,
) -> Option<Zeroizing<String>> {
    entries
        .iter()
        .find(|entry| login.is_none_or(|name| entry.login == name))
        .map(|entry| Zeroizing::new(entry.password.clone()))
}

/// Run `command` on a freshly connected session
///
/// Authenticates first, which may register a new identity in `store`.
/// Returns the lines to print.
pub async fn execute<S>(
    session: &mut Session<S>,
    store: &mut AssociationStore,
    command: &Command,
) -> CommandResult<Vec<Zeroizing<String>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    session.handshake().await?;
    debug!(
        "Connected to KeePassXC {}",
        session.peer_version().unwrap_or("(unknown version)")
    );

    match authenticate(session, store).await? {
        AuthOutcome::Reused => debug!("Using stored association"),
        AuthOutcome::Created => info!("Registered a new association"),
        AuthOutcome::Replaced => info!("Replaced a rejected association"),
    }

    let url = command.url();
    let entries = session.get_logins(url).await?;
    if entries.is_empty() {
        return Err(LookupError::NoEntries(url.to_string()).into());
    }

    let lines = match command {
        Command::GetLogin { all, .. } => select_logins(&entries, *all),
        Command::GetPw { login, .. } => {
            let password = select_password(&entries, login.as_deref()).ok_or_else(|| {
                LookupError::NoLogin(login.clone().unwrap_or_default())
            })?;
            vec![password]
        }
    };

    Ok(lines)
}

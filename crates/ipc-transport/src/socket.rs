//! Well-known socket location and connection setup

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::{JsonChannel, TransportError, TransportResult};

/// Name under which the password manager publishes its browser socket
pub const SERVER_NAME: &str = "org.keepassxc.KeePassXC.BrowserServer";

/// Sandboxed location used by current releases inside the runtime dir
pub const APP_RUNTIME_DIR: &str = "app/org.keepassxc.KeePassXC";

#[cfg(unix)]
pub type LocalStream = tokio::net::UnixStream;

#[cfg(windows)]
pub type LocalStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Connect to the peer's socket
pub async fn connect(path: &Path, timeout: Duration) -> TransportResult<JsonChannel<LocalStream>> {
    info!("Connecting to {}", path.display());

    let stream = open_stream(path)
        .await
        .map_err(|source| TransportError::ConnectionFailed {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("Connected to {}", path.display());
    Ok(JsonChannel::new(stream, timeout))
}

#[cfg(unix)]
async fn open_stream(path: &Path) -> std::io::Result<LocalStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn open_stream(path: &Path) -> std::io::Result<LocalStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}

/// Socket paths to try inside a runtime directory, preferred first
pub fn socket_candidates(runtime_dir: &Path) -> [PathBuf; 2] {
    [
        runtime_dir.join(APP_RUNTIME_DIR).join(SERVER_NAME),
        runtime_dir.join(SERVER_NAME),
    ]
}

/// Resolve where the running password manager listens
#[cfg(all(unix, not(target_os = "macos")))]
pub fn default_socket_path() -> TransportResult<PathBuf> {
    let runtime_dir = directories::BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir);

    let [preferred, legacy] = socket_candidates(&runtime_dir);
    if !preferred.exists() && legacy.exists() {
        return Ok(legacy);
    }
    Ok(preferred)
}

/// Resolve where the running password manager listens
#[cfg(target_os = "macos")]
pub fn default_socket_path() -> TransportResult<PathBuf> {
    Ok(std::env::temp_dir().join(SERVER_NAME))
}

/// Resolve where the running password manager listens
#[cfg(windows)]
pub fn default_socket_path() -> TransportResult<PathBuf> {
    let user = std::env::var("USERNAME")
        .map_err(|_| TransportError::SocketPath("USERNAME is not set".to_string()))?;
    Ok(PathBuf::from(format!(r"\\.\pipe\{}_{}", SERVER_NAME, user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_prefer_app_dir() {
        let [preferred, legacy] = socket_candidates(Path::new("/run/user/1000"));
        assert_eq!(
            preferred,
            PathBuf::from("/run/user/1000/app/org.keepassxc.KeePassXC/org.keepassxc.KeePassXC.BrowserServer")
        );
        assert_eq!(
            legacy,
            PathBuf::from("/run/user/1000/org.keepassxc.KeePassXC.BrowserServer")
        );
    }

    #[test]
    fn test_default_path_names_server() {
        let path = default_socket_path().unwrap();
        assert!(path.to_string_lossy().contains(SERVER_NAME));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_socket_is_connection_error() {
        let dir = std::env::temp_dir().join(format!("kpxc-missing-{}", std::process::id()));
        let path = dir.join(SERVER_NAME);

        match connect(&path, Duration::from_secs(1)).await {
            Err(TransportError::ConnectionFailed { path: failed, .. }) => assert_eq!(failed, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connected to a socket that does not exist"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connects_to_listening_socket() {
        let dir = std::env::temp_dir().join(format!("kpxc-listen-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SERVER_NAME);
        let _ = std::fs::remove_file(&path);

        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut channel = JsonChannel::new(stream, Duration::from_secs(5));
            let frame = channel.receive().await.unwrap();
            channel.send(&frame).await.unwrap();
        });

        let mut channel = connect(&path, Duration::from_secs(5)).await.unwrap();
        channel.send(br#"{"action":"ping"}"#).await.unwrap();
        assert_eq!(&channel.receive().await.unwrap()[..], br#"{"action":"ping"}"#);

        server.await.unwrap();
        channel.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}

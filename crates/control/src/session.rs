//! Per-connection session state and options.

use std::net::SocketAddr;
use std::time::Duration;

use guardftp_protocol::TransferType;
use guardftp_protocol::constants::CONTROL_TIMEOUT;

/// Tunables for a control session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on the control connect and on every reply read.
    pub control_timeout: Duration,
    /// Bound on data-channel connects and active-mode accepts.
    pub data_timeout: Duration,
    /// Send `AUTH TLS` before `USER`. See [`crate::explicit_tls`].
    pub explicit_tls: bool,
    /// Initial data-channel mode.
    pub passive: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            control_timeout: CONTROL_TIMEOUT,
            data_timeout: Duration::from_secs(30),
            explicit_tls: true,
            passive: true,
        }
    }
}

/// Mutable state of one control session.
///
/// Only [`ControlSession`](crate::ControlSession) mutates it.
/// `authenticated` implies `connected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub(crate) connected: bool,
    pub(crate) authenticated: bool,
    pub(crate) passive: bool,
    pub(crate) transfer_type: TransferType,
    pub(crate) working_directory: String,
}

impl Session {
    pub(crate) fn new(passive: bool) -> Self {
        Self {
            connected: false,
            authenticated: false,
            passive,
            transfer_type: TransferType::default(),
            working_directory: "/".to_string(),
        }
    }

    /// Clears connection-scoped state. The passive preference survives.
    pub(crate) fn reset(&mut self) {
        self.connected = false;
        self.authenticated = false;
        self.transfer_type = TransferType::default();
        self.working_directory = "/".to_string();
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn passive(&self) -> bool {
        self.passive
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }
}

/// Point-in-time view of a session, for display.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session: Session,
    pub peer: Option<SocketAddr>,
    pub user: Option<String>,
}

/// Computes the working directory after a successful `CWD dir`.
pub fn resolve_working_directory(current: &str, dir: &str) -> String {
    if dir == ".." {
        match current.trim_end_matches('/').rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent.to_string(),
            _ => "/".to_string(),
        }
    } else if dir.starts_with('/') {
        dir.to_string()
    } else {
        format!("{current}/{dir}").replace("//", "/")
    }
}

/// Extracts the quoted directory from a `257 "<dir>" ...` message.
pub fn quoted_path(message: &str) -> Option<&str> {
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_nested_directory() {
        assert_eq!(resolve_working_directory("/a/b", ".."), "/a");
        assert_eq!(resolve_working_directory("/a", ".."), "/");
        assert_eq!(resolve_working_directory("/", ".."), "/");
    }

    #[test]
    fn absolute_and_relative() {
        assert_eq!(resolve_working_directory("/a", "/etc"), "/etc");
        assert_eq!(resolve_working_directory("/", "pub"), "/pub");
        assert_eq!(resolve_working_directory("/a", "b"), "/a/b");
    }

    #[test]
    fn extracts_quoted_path() {
        assert_eq!(
            quoted_path("\"/home/test\" is the current directory"),
            Some("/home/test")
        );
        assert_eq!(quoted_path("no quotes here"), None);
        assert_eq!(quoted_path("\"unterminated"), None);
    }

    #[test]
    fn reset_keeps_passive_preference() {
        let mut session = Session::new(false);
        session.connected = true;
        session.authenticated = true;
        session.working_directory = "/x".into();
        session.reset();
        assert!(!session.connected() && !session.authenticated());
        assert!(!session.passive());
        assert_eq!(session.working_directory(), "/");
    }
}

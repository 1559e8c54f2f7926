//! Control commands emitted by the client.

use std::fmt;
use std::net::SocketAddrV4;

use crate::address::encode_host_port;

/// Representation type negotiated with `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    Ascii,
    #[default]
    Binary,
}

impl TransferType {
    /// Argument of the `TYPE` command.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ascii => "A",
            Self::Binary => "I",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
        })
    }
}

/// A single control command. `Display` renders the wire text without
/// the trailing CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    /// `AUTH TLS`. See the control crate's `explicit_tls` shim.
    AuthTls,
    Pasv,
    Port(SocketAddrV4),
    Type(TransferType),
    List(Option<String>),
    Nlst(Option<String>),
    Retr(String),
    Stor(String),
    Cwd(String),
    Pwd,
    Mkd(String),
    Rmd(String),
    Dele(String),
    Rnfr(String),
    Rnto(String),
    Quit,
}

impl Command {
    /// Text suitable for logs: credentials are masked.
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ****".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "USER {name}"),
            Self::Pass(password) => write!(f, "PASS {password}"),
            Self::AuthTls => f.write_str("AUTH TLS"),
            Self::Pasv => f.write_str("PASV"),
            Self::Port(addr) => write!(f, "PORT {}", encode_host_port(*addr)),
            Self::Type(ty) => write!(f, "TYPE {}", ty.code()),
            Self::List(None) => f.write_str("LIST"),
            Self::List(Some(path)) => write!(f, "LIST {path}"),
            Self::Nlst(None) => f.write_str("NLST"),
            Self::Nlst(Some(path)) => write!(f, "NLST {path}"),
            Self::Retr(name) => write!(f, "RETR {name}"),
            Self::Stor(name) => write!(f, "STOR {name}"),
            Self::Cwd(dir) => write!(f, "CWD {dir}"),
            Self::Pwd => f.write_str("PWD"),
            Self::Mkd(dir) => write!(f, "MKD {dir}"),
            Self::Rmd(dir) => write!(f, "RMD {dir}"),
            Self::Dele(name) => write!(f, "DELE {name}"),
            Self::Rnfr(name) => write!(f, "RNFR {name}"),
            Self::Rnto(name) => write!(f, "RNTO {name}"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

//! Host-port encoding for data channels.
//!
//! Both directions use six comma-separated decimal bytes
//! `h1,h2,h3,h4,p1,p2`, where the port is `p1 * 256 + p2`.

use std::net::{Ipv4Addr, SocketAddrV4};

/// Errors from encoding or decoding a data-channel address.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("no parenthesised address in reply: {0}")]
    Missing(String),

    #[error("malformed address: {0}")]
    Malformed(String),

    #[error("invalid IPv4 address: {0}")]
    InvalidHost(String),
}

/// Encodes an address as `h1,h2,h3,h4,p1,p2`.
pub fn encode_host_port(addr: SocketAddrV4) -> String {
    let [a, b, c, d] = addr.ip().octets();
    let port = addr.port();
    format!("{a},{b},{c},{d},{},{}", port / 256, port % 256)
}

/// Decodes exactly six comma-separated bytes into an address.
pub fn decode_host_port(text: &str) -> Result<SocketAddrV4, AddressError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return Err(AddressError::Malformed(format!(
            "expected 6 fields, got {}: {text}",
            parts.len()
        )));
    }

    let mut bytes = [0u8; 6];
    for (slot, part) in bytes.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| AddressError::Malformed(format!("bad field {part:?} in {text}")))?;
    }

    let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let port = u16::from(bytes[4]) * 256 + u16::from(bytes[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Extracts the address from a passive-mode reply message such as
/// `Entering Passive Mode (127,0,0,1,195,80).`
///
/// A missing or malformed parenthesised sextuple is an error; there is
/// no fallback to the control connection's peer.
pub fn parse_passive_reply(message: &str) -> Result<SocketAddrV4, AddressError> {
    let open = message
        .find('(')
        .ok_or_else(|| AddressError::Missing(message.to_string()))?;
    let close = message[open..]
        .find(')')
        .map(|i| open + i)
        .ok_or_else(|| AddressError::Missing(message.to_string()))?;
    decode_host_port(&message[open + 1..close])
}

/// Builds the active-mode command for a dotted-quad host and port.
pub fn build_active_command_payload(host: &str, port: u16) -> Result<String, AddressError> {
    let ip: Ipv4Addr = host
        .parse()
        .map_err(|_| AddressError::InvalidHost(host.to_string()))?;
    Ok(format!(
        "PORT {}",
        encode_host_port(SocketAddrV4::new(ip, port))
    ))
}

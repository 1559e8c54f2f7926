use std::time::Duration;

/// Default control port of a file server.
pub const DEFAULT_CONTROL_PORT: u16 = 21;

/// Default port the scan agent listens on.
pub const DEFAULT_AGENT_PORT: u16 = 9999;

/// Bound applied to the control connect and every control read.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single reply line, CRLF included.
pub const MAX_REPLY_LINE: usize = 8 * 1024;

/// Chunk size used when streaming file bytes over a data channel.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Reply codes the client reacts to explicitly.
pub mod codes {
    /// Service ready for new user (greeting).
    pub const SERVICE_READY: u16 = 220;
    /// Service closing control connection.
    pub const CLOSING: u16 = 221;
    /// Entering passive mode.
    pub const PASSIVE_MODE: u16 = 227;
    /// User logged in.
    pub const LOGGED_IN: u16 = 230;
    /// Security exchange accepted (`AUTH`).
    pub const AUTH_ACCEPTED: u16 = 234;
    /// User name okay, need password.
    pub const NEED_PASSWORD: u16 = 331;
    /// Service not available, closing control connection.
    pub const SERVICE_UNAVAILABLE: u16 = 421;
    /// Bad sequence of commands (servers that insist on `AUTH` first).
    pub const BAD_SEQUENCE: u16 = 503;
    /// Not logged in.
    pub const NOT_LOGGED_IN: u16 = 530;
}

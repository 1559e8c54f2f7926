//! Wire vocabulary shared by the guardftp client and scan agent.
//!
//! - [`reply`]: parsing and classification of control-channel replies.
//! - [`command`]: the control commands the client emits.
//! - [`address`]: the `h1,h2,h3,h4,p1,p2` host-port encoding used by
//!   passive and active data channels.
//! - [`scan`]: the verdict returned by the scan agent.

pub mod address;
pub mod command;
pub mod constants;
pub mod reply;
pub mod scan;

// Re-export primary types for convenience.
pub use address::{
    AddressError, build_active_command_payload, decode_host_port, encode_host_port,
    parse_passive_reply,
};
pub use command::{Command, TransferType};
pub use reply::{Reply, ReplyClass};
pub use scan::{ScanResult, ScanStatus};

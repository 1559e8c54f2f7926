//! Data channels for guardftp transfers.
//!
//! A data channel is the short-lived second socket that carries file
//! bytes or a directory listing. One is negotiated per transfer over the
//! control session:
//!
//! - **passive**: `PASV`, then connect to the address the server reports;
//! - **active**: listen locally, advertise it with `PORT`, then accept the
//!   server's connection once.
//!
//! [`pump`] moves bytes between a channel and a local reader or writer.

pub mod error;
pub mod negotiate;
pub mod pump;

pub use error::DataChannelError;
pub use negotiate::{DataChannel, Mode};
pub use pump::{PumpOptions, pump};

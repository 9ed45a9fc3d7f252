//! Local relay socket transport.
//!
//! The radio daemon owns the physical link (pairing, advertising, GATT);
//! the bridge talks to it over a Unix domain socket. This is the lowest
//! layer of shc-bridge: the peripheral relay server builds on the
//! [`RelaySocket`] listener provided here.

pub mod error;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use uds::RelaySocket;

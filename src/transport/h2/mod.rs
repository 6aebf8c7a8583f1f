//! HTTP/2 transport: frame codec, HPACK, and the connection driver.

pub mod connection;
pub mod frame;
pub mod hpack;

pub use connection::{H2Connection, PeerSettings, StreamResponse};

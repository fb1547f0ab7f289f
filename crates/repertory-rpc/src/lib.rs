//! Repertory RPC - the length-prefixed, nonce-handshaked binary protocol
//! a remote process uses to drive a mounted instance's provider surface
//! (spec §4.9, C9).

pub mod client;
pub mod crypto;
pub mod frame;
pub mod protocol;
pub mod server;

pub use client::PacketClient;
pub use protocol::{MIN_REMOTE_VERSION, PROTOCOL_VERSION};
pub use server::{ClosedCallback, MessageHandler, PacketServer};

//! Protocol primitives shared across the push relay stack.
//!
//! This crate provides:
//! - Signed-handshake verification and signing ([`signature`])
//! - Handshake payloads and room membership derivation ([`handshake`])
//! - Push messages and their routing rules ([`message`])
//! - The named-event wire framing ([`protocol`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handshake;
pub mod message;
pub mod protocol;
pub mod signature;

pub use handshake::RoomSet;

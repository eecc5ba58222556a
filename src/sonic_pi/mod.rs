//! Sonic Pi module
//!
//! Contains connection discovery, the OSC client, application control and the
//! shared parameter store.

pub mod client;
pub mod discovery;
pub mod process;
pub mod session;
pub mod state;
pub mod transport;

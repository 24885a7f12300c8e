//! Route modules.

pub mod health;
pub mod rpc;
pub mod session;
pub mod signing_keys;

//! Command implementations.
//!
//! Commands write their user-facing output to the given writer. Commands
//! that talk to Google take a `connect` closure and only call it once local
//! validation has passed, so bad input never loads credentials.

pub mod channels;
pub mod login;
pub mod paths;
pub mod status;
pub mod watch;

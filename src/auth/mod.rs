//! Authentication mechanisms
//!
//! Implements the three password-based authentication methods the server
//! may request during startup: cleartext, MD5, and SCRAM-SHA-256. Cleartext
//! needs no helper (the password is sent as-is); MD5 and SCRAM each get
//! their own module.

pub mod md5;
mod scram;

pub use scram::{ChannelBinding, ScramClient, ScramError, ScramState};

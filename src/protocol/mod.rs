//! Postgres wire protocol: constants, message types, and the
//! encoder/decoder pair.

pub mod constants;
mod decode;
mod encode;
pub mod message;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{AuthenticationMessage, BackendMessage, ErrorFields, FrontendMessage};

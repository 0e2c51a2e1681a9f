//! Sealed session tokens.

mod codec;
mod payload;

pub use codec::{SessionCodec, SessionError};
pub use payload::{Role, SessionPayload};

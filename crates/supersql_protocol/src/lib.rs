pub mod codec;
pub mod error;
pub mod frame;
pub mod types;

pub use codec::{decode_message, encode_message};
pub use error::ProtocolError;
pub use frame::WireCodec;
pub use types::*;

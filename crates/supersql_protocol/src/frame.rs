//! `tokio_util` framing over the message codec.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_message, encode_message, frame_len};
use crate::error::ProtocolError;
use crate::types::Message;

/// Stream codec for use with `tokio_util::codec::Framed`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        let total = match frame_len(src)? {
            Some(total) => total,
            None => return Ok(None),
        };
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let (msg, consumed) = decode_message(&src[..total])?;
        src.advance(consumed);
        Ok(Some(msg))
    }
}

impl Encoder<Message> for WireCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&encode_message(&item)?);
        Ok(())
    }
}

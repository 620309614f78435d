//! Frame codec and wrapper envelope for the backend RPC protocol.
//!
//! A frame on the wire is a big-endian `u32` length `L` followed by exactly
//! `L` bytes holding a serialized [`WrapperMessage`]. There is no magic
//! number and no checksum: envelope boundaries are the only synchronization.
//! A malformed payload is fatal for the whole stream (see [`FrameCodec`]).

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

mod generated {
    include!(concat!(env!("OUT_DIR"), "/xgate.wire.rs"));
}

pub use generated::wrapper_message::Type as WrapperType;
pub use generated::{
    BuddyChanged, Connected, ConversationMessage, Disconnected, JoinRoom, LeaveRoom, Login,
    Logout, ParticipantChanged, Ping, Pong, RoomNicknameChanged, WrapperMessage,
};

/// Header size: a big-endian u32 byte count.
const HEADER_LEN: usize = 4;

/// Refuse to buffer a payload larger than this. Backends are local,
/// trusted-ish processes, but an unbounded length prefix is still an
/// invitation to exhaust memory on a corrupted stream.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed wrapper payload: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    FrameTooLarge(u32),
}

/// Which part of a frame the decoder is currently waiting on.
///
/// Mirrors the two-state machine from the wire spec directly so that the
/// decoder's behavior under arbitrary TCP segmentation is easy to reason
/// about and to unit test: the codec never assumes a frame arrives in one
/// `read()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingHeader,
    AwaitingBody { len: u32 },
}

/// Stateful, restartable length-prefixed codec for [`WrapperMessage`].
pub struct FrameCodec {
    state: DecodeState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitingHeader,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = WrapperMessage;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    if src.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let len = (&src[..HEADER_LEN]).get_u32();
                    if len > MAX_FRAME_LEN {
                        return Err(WireError::FrameTooLarge(len));
                    }
                    src.advance(HEADER_LEN);
                    self.state = DecodeState::AwaitingBody { len };
                }
                DecodeState::AwaitingBody { len } => {
                    let len = len as usize;
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let body = src.split_to(len);
                    self.state = DecodeState::AwaitingHeader;
                    let wrapper = WrapperMessage::decode(body.freeze())?;
                    return Ok(Some(wrapper));
                }
            }
        }
    }
}

impl Encoder<WrapperMessage> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: WrapperMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.encoded_len();
        dst.reserve(HEADER_LEN + len);
        dst.put_u32(len as u32);
        item.encode(dst).expect("BytesMut grows unboundedly");
        Ok(())
    }
}

/// Build a wrapper envelope from a typed payload and its tag.
pub fn wrap(ty: WrapperType, payload: impl Message) -> WrapperMessage {
    WrapperMessage {
        r#type: ty as i32,
        payload: Some(payload.encode_to_vec()),
    }
}

/// Decode a wrapper's inner payload as `T`, failing if the payload is
/// absent or malformed. Used by dispatch code after matching on `r#type`.
pub fn unwrap<T: Message + Default>(wrapper: &WrapperMessage) -> Result<T, WireError> {
    let bytes = wrapper.payload.as_deref().unwrap_or(&[]);
    Ok(T::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode_frame(wrapper: &WrapperMessage) -> Vec<u8> {
        let mut buf = Vec::new();
        let payload = wrapper.encode_to_vec();
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        buf
    }

    #[test]
    fn round_trips_a_single_frame() {
        let mut codec = FrameCodec::new();
        let wrapper = wrap(WrapperType::Ping, Ping {});
        let bytes = encode_frame(&wrapper);

        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.r#type, WrapperType::Ping as i32);
        assert!(buf.is_empty());
    }

    #[test]
    fn restarts_across_arbitrary_chunking() {
        let mut codec = FrameCodec::new();
        let wrapper = wrap(
            WrapperType::Login,
            Login {
                user: "alice@gw".into(),
                legacy_name: "12345".into(),
                password: "hunter2".into(),
            },
        );
        let bytes = encode_frame(&wrapper);

        let mut buf = BytesMut::new();
        let mut decoded = None;
        // Feed the frame one byte at a time.
        for byte in bytes {
            buf.put_u8(byte);
            if let Some(msg) = codec.decode(&mut buf).unwrap() {
                decoded = Some(msg);
            }
        }

        let login: Login = unwrap(&decoded.expect("frame should decode once complete")).unwrap();
        assert_eq!(login.user, "alice@gw");
        assert_eq!(login.legacy_name, "12345");
    }

    #[test]
    fn decodes_multiple_concatenated_frames_in_order() {
        let mut codec = FrameCodec::new();
        let w1 = wrap(WrapperType::Ping, Ping {});
        let w2 = wrap(WrapperType::Pong, Pong {});
        let w3 = wrap(
            WrapperType::Logout,
            Logout {
                user: "bob@gw".into(),
                legacy_name: "bob99".into(),
            },
        );

        let mut bytes = Vec::new();
        bytes.extend(encode_frame(&w1));
        bytes.extend(encode_frame(&w2));
        bytes.extend(encode_frame(&w3));

        let mut buf = BytesMut::from(&bytes[..]);
        let d1 = codec.decode(&mut buf).unwrap().unwrap();
        let d2 = codec.decode(&mut buf).unwrap().unwrap();
        let d3 = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(d1.r#type, WrapperType::Ping as i32);
        assert_eq!(d2.r#type, WrapperType::Pong as i32);
        assert_eq!(d3.r#type, WrapperType::Logout as i32);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN + 1);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[test]
    fn encode_then_decode_preserves_payload_fields() {
        let mut codec = FrameCodec::new();
        let original = ConversationMessage {
            user: "alice@gw".into(),
            buddy_name: "bob42".into(),
            message: "hi".into(),
            nickname: Some(String::new()),
        };
        let wrapper = wrap(WrapperType::ConvMessage, original.clone());

        let mut dst = BytesMut::new();
        codec.encode(wrapper, &mut dst).unwrap();

        let decoded_wrapper = codec.decode(&mut dst).unwrap().unwrap();
        let decoded: ConversationMessage = unwrap(&decoded_wrapper).unwrap();
        assert_eq!(decoded, original);
    }
}

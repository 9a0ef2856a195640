// src/core/session/frame.rs

//! Wire schema for the control channel and the codec that (de)serializes it.
//! Each frame is a newline-delimited, self-describing JSON object, encoded
//! and decoded by a hand-rolled `Encoder`/`Decoder` pair driving a
//! `tokio_util::codec::Framed`.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// The three frame kinds that can cross the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Request,
    Response,
    Push,
}

/// The envelope carried by every frame: `{ kind, id?, method?, params?|result?|error? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Frame {
            kind: FrameKind::Request,
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn push(method: impl Into<String>, params: Value) -> Self {
        Frame {
            kind: FrameKind::Push,
            id: None,
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn response_ok(id: impl Into<String>, result: Value) -> Self {
        Frame {
            kind: FrameKind::Response,
            id: Some(id.into()),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn response_err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Frame {
            kind: FrameKind::Response,
            id: Some(id.into()),
            method: None,
            params: None,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// A newline-delimited JSON codec: each frame is one JSON object followed by
/// `\n`. Decoding scans the buffer for a complete line before attempting to
/// parse, so partial reads never produce a spurious parse error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut line =
            serde_json::to_vec(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push(b'\n');
        dst.extend_from_slice(&line);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline_pos) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(newline_pos);
        src.advance(1); // consume the newline itself
        if line.is_empty() {
            return self.decode(src);
        }
        let frame: Frame = serde_json::from_slice(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_request_frame() {
        let mut codec = FrameCodec;
        let frame = Frame::request("1", "check_port", serde_json::json!({"rule_id": 7}));
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.id, frame.id);
        assert_eq!(decoded.method, frame.method);
    }

    #[test]
    fn decode_returns_none_on_partial_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&b"{\"kind\":\"push\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_handles_two_frames_in_one_buffer() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::push("rules_updated", Value::Null), &mut buf)
            .unwrap();
        codec
            .encode(Frame::push("rules_updated", Value::Null), &mut buf)
            .unwrap();
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}

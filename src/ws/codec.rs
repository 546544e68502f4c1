use axum::extract::ws::Message;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use thiserror::Error;

use crate::models::{ClientMessage, ServerMessage};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("deflate failed: {0}")]
    Compress(#[from] flate2::CompressError),

    #[error("inflate failed: {0}")]
    Decompress(#[from] flate2::DecompressError),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary frame received on an uncompressed connection")]
    UnexpectedBinary,

    #[error("inflated message exceeds {0} bytes")]
    TooLarge(usize),
}

/// Per-connection frame encoding.
///
/// Compressed connections keep one raw DEFLATE stream per direction for the
/// lifetime of the socket, each frame ending on a sync flush.
pub enum FrameCodec {
    Plain,
    Compressed {
        deflate: Box<Compress>,
        inflate: Box<Decompress>,
        max_inflated: usize,
    },
}

impl FrameCodec {
    pub fn new(use_compression: bool, max_inflated: usize) -> Self {
        if use_compression {
            FrameCodec::Compressed {
                deflate: Box::new(Compress::new(Compression::default(), false)),
                inflate: Box::new(Decompress::new(false)),
                max_inflated,
            }
        } else {
            FrameCodec::Plain
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameCodec::Compressed { .. })
    }

    pub fn encode(&mut self, msg: &ServerMessage) -> Result<Message, CodecError> {
        let json = serde_json::to_string(msg)?;
        match self {
            FrameCodec::Plain => Ok(Message::Text(json)),
            FrameCodec::Compressed { deflate, .. } => Ok(Message::Binary(deflate_sync(deflate, json.as_bytes())?)),
        }
    }

    /// Decode a data frame. Text frames are always plain.
    pub fn decode_text(&mut self, text: &str) -> Result<ClientMessage, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode_binary(&mut self, data: &[u8]) -> Result<ClientMessage, CodecError> {
        match self {
            FrameCodec::Plain => Err(CodecError::UnexpectedBinary),
            FrameCodec::Compressed { inflate, max_inflated, .. } => {
                let raw = inflate_sync(inflate, data, *max_inflated)?;
                Ok(serde_json::from_slice(&raw)?)
            }
        }
    }
}

pub fn deflate_sync(deflate: &mut Compress, input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(input.len() / 2 + 64);
    let start = deflate.total_in();
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(64));
        }
        let consumed = (deflate.total_in() - start) as usize;
        deflate.compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)?;
        let consumed = (deflate.total_in() - start) as usize;
        // The flush is complete once all input is taken and output space remains.
        if consumed == input.len() && out.len() < out.capacity() {
            return Ok(out);
        }
    }
}

/// Inflate one sync-flushed frame, refusing to produce more than `max_len` bytes.
pub fn inflate_sync(inflate: &mut Decompress, input: &[u8], max_len: usize) -> Result<Vec<u8>, CodecError> {
    // Capacity never grows past max_len + 1, so one extra byte is enough to detect overflow.
    let cap_limit = max_len.saturating_add(1);
    let mut out = Vec::with_capacity(input.len().saturating_mul(4).saturating_add(64).min(cap_limit));
    let start = inflate.total_in();
    loop {
        if out.len() == out.capacity() {
            if out.len() > max_len {
                return Err(CodecError::TooLarge(max_len));
            }
            out.reserve_exact(out.capacity().max(64).min(cap_limit - out.len()));
        }
        let consumed = (inflate.total_in() - start) as usize;
        let status = inflate.decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)?;
        let consumed = (inflate.total_in() - start) as usize;
        if out.len() > max_len {
            return Err(CodecError::TooLarge(max_len));
        }
        if matches!(status, Status::StreamEnd)
            || (consumed == input.len() && out.len() < out.capacity())
        {
            return Ok(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AckMessage, Operation, OpsMessage};
    use serde_json::json;

    #[test]
    fn plain_codec_uses_text_frames() {
        let mut codec = FrameCodec::new(false, 1024);
        let msg = codec
            .encode(&ServerMessage::Ack(AckMessage { ids: vec!["a".into()] }))
            .unwrap();
        match msg {
            Message::Text(text) => assert_eq!(text, r#"{"type":"ack","ids":["a"]}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
        assert!(matches!(codec.decode_binary(b"x"), Err(CodecError::UnexpectedBinary)));
    }

    #[test]
    fn compressed_frames_share_one_stream() {
        let mut server = FrameCodec::new(true, 1024);
        let mut client_inflate = Decompress::new(false);

        // Several frames back to back must each be decodable on arrival.
        for i in 0..3 {
            let sent = ServerMessage::Ops(OpsMessage {
                ops: vec![Operation::new(&format!("op-{i}"), json!({"text": "hello hello hello"}))],
            });
            let Message::Binary(frame) = server.encode(&sent).unwrap() else {
                panic!("expected binary frame");
            };
            let raw = inflate_sync(&mut client_inflate, &frame, 1024).unwrap();
            let received: ServerMessage = serde_json::from_slice(&raw).unwrap();
            assert_eq!(received, sent);
        }
    }

    #[test]
    fn compressed_codec_decodes_client_frames() {
        let mut server = FrameCodec::new(true, 1024);
        let mut client_deflate = Compress::new(Compression::default(), false);

        let frame = deflate_sync(&mut client_deflate, br#"{"type":"subscribe","version":3}"#).unwrap();
        match server.decode_binary(&frame).unwrap() {
            ClientMessage::Subscribe(req) => assert_eq!(req.version, 3),
            other => panic!("unexpected message {other:?}"),
        }

        // Text frames bypass decompression even on compressed sockets
        assert!(matches!(
            server.decode_text(r#"{"type":"getSince","version":0}"#).unwrap(),
            ClientMessage::GetSince(_)
        ));
    }

    #[test]
    fn oversized_inflated_frame_is_refused() {
        let mut server = FrameCodec::new(true, 64 * 1024);
        let mut client_deflate = Compress::new(Compression::default(), false);

        // A few KiB on the wire that expand to several MiB of whitespace.
        let mut json = vec![b' '; 8 * 1024 * 1024];
        json.extend_from_slice(br#"{"type":"subscribe","version":0}"#);
        let frame = deflate_sync(&mut client_deflate, &json).unwrap();
        assert!(frame.len() < 64 * 1024);

        assert!(matches!(server.decode_binary(&frame), Err(CodecError::TooLarge(limit)) if limit == 64 * 1024));
    }

    #[test]
    fn frame_at_the_limit_is_accepted() {
        let msg = br#"{"type":"subscribe","version":7}"#;
        let mut server = FrameCodec::new(true, msg.len());
        let mut client_deflate = Compress::new(Compression::default(), false);

        let frame = deflate_sync(&mut client_deflate, msg).unwrap();
        match server.decode_binary(&frame).unwrap() {
            ClientMessage::Subscribe(req) => assert_eq!(req.version, 7),
            other => panic!("unexpected message {other:?}"),
        }
    }
}

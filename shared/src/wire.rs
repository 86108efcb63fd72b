//! Frame codec for the WebSocket channel.
//!
//! Text frames carry JSON, binary frames carry bincode (standard config).
//! Both sides accept either; a peer answers in the format it last received.

use bincode::{Decode, Encode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameFormat {
    #[default]
    Text,
    Binary,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn format(&self) -> FrameFormat {
        match self {
            Frame::Text(_) => FrameFormat::Text,
            Frame::Binary(_) => FrameFormat::Binary,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid binary frame: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("failed to encode binary frame: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

pub fn encode<T>(message: &T, format: FrameFormat) -> Result<Frame, WireError>
where
    T: Serialize + Encode,
{
    Ok(match format {
        FrameFormat::Text => Frame::Text(serde_json::to_string(message)?),
        FrameFormat::Binary => {
            Frame::Binary(bincode::encode_to_vec(message, bincode::config::standard())?)
        }
    })
}

pub fn decode<T>(frame: &Frame) -> Result<T, WireError>
where
    T: DeserializeOwned + Decode<()>,
{
    match frame {
        Frame::Text(text) => decode_text(text),
        Frame::Binary(data) => decode_binary(data),
    }
}

pub fn decode_text<T: DeserializeOwned>(text: &str) -> Result<T, WireError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_binary<T: Decode<()>>(data: &[u8]) -> Result<T, WireError> {
    let (message, _) = bincode::decode_from_slice(data, bincode::config::standard())?;
    Ok(message)
}

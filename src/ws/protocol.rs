//! Wire format and schema validation for the WebSocket protocol.
//!
//! Control traffic is JSON with a `type` tag. A `batch-result` control
//! message is followed immediately by one raw binary frame holding the
//! little-endian f32 sample buffer; everything else is text frames.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value: {0}")]
    InvalidField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Limits on render request parameters, enforced before admission.
pub const MAX_RENDER_DURATION_SECS: f64 = 600.0;
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// One render request. The genome is either fetched by id from the
/// genome store or supplied inline; exactly one of the two must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genome_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genome: Option<serde_json::Value>,
    pub duration: f64,
    #[serde(default)]
    pub note_delta: f64,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[serde(default, rename = "useGPU")]
    pub use_gpu: bool,
    /// Batch mode: accumulate the full signal and deliver it as one
    /// binary payload instead of paced chunks.
    #[serde(default)]
    pub batch: bool,
    /// Overrides the server default when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

fn default_velocity() -> f64 {
    1.0
}

impl RenderRequest {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match (&self.genome_id, &self.genome) {
            (None, None) => {
                return Err(ProtocolError::MissingField("genomeId or genome".into()));
            }
            (Some(_), Some(_)) => {
                return Err(ProtocolError::InvalidField(
                    "genomeId and genome are mutually exclusive".into(),
                ));
            }
            _ => {}
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ProtocolError::InvalidField("duration must be positive".into()));
        }
        if self.duration > MAX_RENDER_DURATION_SECS {
            return Err(ProtocolError::InvalidField(format!(
                "duration {} exceeds maximum {}",
                self.duration, MAX_RENDER_DURATION_SECS
            )));
        }
        if !self.note_delta.is_finite() {
            return Err(ProtocolError::InvalidField("noteDelta must be finite".into()));
        }
        if !self.velocity.is_finite() || !(0.0..=1.0).contains(&self.velocity) {
            return Err(ProtocolError::InvalidField(
                "velocity must be within [0, 1]".into(),
            ));
        }
        if let Some(rate) = self.sample_rate {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
                return Err(ProtocolError::InvalidField(format!(
                    "sampleRate {rate} outside [{MIN_SAMPLE_RATE}, {MAX_SAMPLE_RATE}]"
                )));
            }
        }
        Ok(())
    }
}

/// Messages the client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "render")]
    Render(RenderRequest),

    /// Playback progress report driving the pacer, in seconds.
    #[serde(rename = "playback-position")]
    PlaybackPosition { position: f64 },
}

/// Messages the server sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    #[serde(rename_all = "camelCase")]
    Welcome { sample_rate: u32 },

    #[serde(rename = "chunk")]
    #[serde(rename_all = "camelCase")]
    Chunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        index: u64,
        data: Vec<f32>,
        timestamp: f64,
        sample_rate: u32,
    },

    /// Announces the binary frame that immediately follows.
    #[serde(rename = "batch-result")]
    #[serde(rename_all = "camelCase")]
    BatchResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        total_samples: u64,
        duration: f64,
        sample_rate: u32,
    },

    #[serde(rename = "complete")]
    #[serde(rename_all = "camelCase")]
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        total_chunks: u64,
        total_samples: u64,
        duration: f64,
        sample_rate: u32,
    },

    #[serde(rename = "error")]
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(request_id: Option<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error { request_id, message: message.into() }
    }
}

/// Encode a server message to JSON text.
pub fn encode_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a client message, enforcing the size limit BEFORE parsing.
///
/// An unrecognized `type` is reported as [`ProtocolError::UnknownType`]
/// with the offending tag so the error reply can name it.
pub fn decode_message(text: &str, max_size: usize) -> Result<ClientMessage, ProtocolError> {
    if text.len() > max_size {
        return Err(ProtocolError::MessageTooLarge { size: text.len(), max: max_size });
    }
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => Ok(message),
        Err(e) => {
            // Distinguish an unknown tag from malformed JSON for the
            // error reply.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                match value.get("type").and_then(|t| t.as_str()) {
                    Some(tag) if tag != "render" && tag != "playback-position" => {
                        return Err(ProtocolError::UnknownType(tag.to_string()));
                    }
                    None => return Err(ProtocolError::MissingField("type".into())),
                    _ => {}
                }
            }
            Err(ProtocolError::InvalidFormat(e.to_string()))
        }
    }
}

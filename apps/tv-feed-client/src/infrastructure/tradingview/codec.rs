//! Frame Codec
//!
//! The wire multiplexes payloads with a length prefix: every payload is
//! wrapped as `~m~<byte-length>~m~<payload>` and one WebSocket text
//! message may carry several such frames back to back. Decoding walks
//! the prefixes; classification then sorts each payload into keepalive,
//! handshake, or application event.

use serde_json::Value;
use thiserror::Error;

use crate::domain::event::ChartEvent;
use crate::infrastructure::tradingview::messages::{Frame, Handshake};

/// Frame separator token.
const SEPARATOR: &str = "~m~";

/// Keepalive payload prefix.
const KEEPALIVE_PREFIX: &str = "~h~";

/// Codec failures. Each carries enough of the offending input to make
/// server-side format drift diagnosable from logs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A frame did not start with the separator token.
    #[error("missing frame separator at '{0}'")]
    MissingSeparator(String),

    /// The byte-length field was absent or not a number.
    #[error("malformed length prefix at '{0}'")]
    BadLengthPrefix(String),

    /// The declared length ran past the end of the message.
    #[error("frame length {declared} exceeds remaining {remaining} bytes")]
    Truncated {
        /// Length the prefix declared.
        declared: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },

    /// A JSON payload that is neither a handshake nor an `{m, p}` event.
    #[error("unrecognized frame shape: {0}")]
    UnrecognizedShape(String),

    /// A payload that is not valid JSON and not a keepalive.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Stateless encoder/decoder for the length-prefixed frame format.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Wrap one payload in its length prefix.
    #[must_use]
    pub fn wrap(payload: &str) -> String {
        format!("{SEPARATOR}{}{SEPARATOR}{payload}", payload.len())
    }

    /// Encode one command as a framed `{m, p}` message.
    #[must_use]
    pub fn encode(method: &str, params: &[Value]) -> String {
        let body = serde_json::json!({ "m": method, "p": params });
        Self::wrap(&body.to_string())
    }

    /// Split one WebSocket text message into its classified frames.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] for malformed framing or a payload that
    /// matches no known shape.
    pub fn decode(&self, message: &str) -> Result<Vec<Frame>, CodecError> {
        let mut frames = Vec::new();
        let mut rest = message;

        while !rest.is_empty() {
            let after_sep = rest.strip_prefix(SEPARATOR).ok_or_else(|| {
                CodecError::MissingSeparator(preview(rest))
            })?;
            let digits_end = after_sep
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_sep.len());
            let length: usize = after_sep
                .get(..digits_end)
                .filter(|d| !d.is_empty())
                .and_then(|d| d.parse().ok())
                .ok_or_else(|| CodecError::BadLengthPrefix(preview(rest)))?;
            let body = after_sep
                .get(digits_end..)
                .and_then(|s| s.strip_prefix(SEPARATOR))
                .ok_or_else(|| CodecError::BadLengthPrefix(preview(rest)))?;

            let payload = body.get(..length).ok_or(CodecError::Truncated {
                declared: length,
                remaining: body.len(),
            })?;
            frames.push(classify(payload)?);
            rest = &body[length..];
        }

        Ok(frames)
    }
}

/// Sort one unwrapped payload into its frame kind.
fn classify(payload: &str) -> Result<Frame, CodecError> {
    if payload.starts_with(KEEPALIVE_PREFIX) {
        return Ok(Frame::Keepalive(payload.to_string()));
    }

    let value: Value = serde_json::from_str(payload)?;
    if value.get("session_id").is_some() {
        let handshake: Handshake = serde_json::from_value(value)?;
        return Ok(Frame::Handshake(handshake));
    }

    match (value.get("m"), value.get("p")) {
        (Some(Value::String(method)), Some(Value::Array(params))) => Ok(Frame::Event(
            ChartEvent::new(method.clone(), params.clone()),
        )),
        _ => Err(CodecError::UnrecognizedShape(preview(payload))),
    }
}

/// First few characters of a string for error context.
fn preview(s: &str) -> String {
    const LIMIT: usize = 48;
    let mut end = s.len().min(LIMIT);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wrap_prefixes_byte_length() {
        assert_eq!(FrameCodec::wrap("~h~1"), "~m~4~m~~h~1");
        assert_eq!(FrameCodec::wrap(""), "~m~0~m~");
    }

    #[test]
    fn encode_produces_framed_command() {
        let encoded = FrameCodec::encode("set_auth_token", &[json!("tok")]);
        let frames = FrameCodec::new().decode(&encoded).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Event(ChartEvent::new(
                "set_auth_token",
                vec![json!("tok")]
            ))]
        );
    }

    #[test]
    fn decode_splits_multiple_frames() {
        let message = format!(
            "{}{}",
            FrameCodec::wrap("~h~7"),
            FrameCodec::wrap(r#"{"m":"series_completed","p":["cs_a"]}"#),
        );
        let frames = FrameCodec::new().decode(&message).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::Keepalive("~h~7".into()));
        assert!(matches!(
            &frames[1],
            Frame::Event(event) if event.name == "series_completed"
        ));
    }

    #[test]
    fn decode_recognizes_the_handshake() {
        let payload = r#"{"session_id":"abc123","release":"2.0","timezone_offset":0}"#;
        let frames = FrameCodec::new().decode(&FrameCodec::wrap(payload)).unwrap();
        match &frames[0] {
            Frame::Handshake(handshake) => {
                assert_eq!(handshake.session_id, "abc123");
                assert_eq!(handshake.release.as_deref(), Some("2.0"));
            }
            other => panic!("expected handshake, got {other:?}"),
        }
    }

    #[test]
    fn length_is_bytes_not_chars() {
        // Multi-byte payload: the prefix counts UTF-8 bytes.
        let payload = r#"{"m":"x","p":["€"]}"#;
        let wrapped = FrameCodec::wrap(payload);
        assert!(wrapped.starts_with(&format!("~m~{}~m~", payload.len())));
        let frames = FrameCodec::new().decode(&wrapped).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let result = FrameCodec::new().decode("~m~50~m~short");
        assert!(matches!(result, Err(CodecError::Truncated { declared: 50, .. })));
    }

    #[test]
    fn missing_separator_is_an_error() {
        assert!(matches!(
            FrameCodec::new().decode("hello"),
            Err(CodecError::MissingSeparator(_))
        ));
    }

    #[test]
    fn bad_length_prefix_is_an_error() {
        assert!(matches!(
            FrameCodec::new().decode("~m~x~m~{}"),
            Err(CodecError::BadLengthPrefix(_))
        ));
    }

    #[test]
    fn unknown_json_shape_is_an_error() {
        let result = FrameCodec::new().decode(&FrameCodec::wrap(r#"{"other":1}"#));
        assert!(matches!(result, Err(CodecError::UnrecognizedShape(_))));
    }
}

//! Upload payload encoding. File content always travels as standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// How the caller supplied the `content` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Base64,
    Utf8,
}

impl ContentEncoding {
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("base64") => Some(Self::Base64),
            Some("utf8") | Some("utf-8") => Some(Self::Utf8),
            Some(_) => None,
        }
    }
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

/// Validate `content` and return the canonical base64 to send.
pub fn to_wire_base64(content: &str, encoding: ContentEncoding) -> Result<String, String> {
    match encoding {
        ContentEncoding::Utf8 => Ok(encode_bytes(content.as_bytes())),
        ContentEncoding::Base64 => decode_base64(content)
            .map(|bytes| encode_bytes(&bytes))
            .map_err(|e| e.to_string()),
    }
}

//! MCP Transports
//!
//! Newline-delimited JSON over stdio, and HTTP with Server-Sent Events.

#[cfg(feature = "http")]
pub mod http;
pub mod stdio;

use std::borrow::Cow;

use tessera_core::JsonRpcMessage;
use tessera_core::error::TransportResult;

/// Replace raw line breaks (`\r\n`, `\n`, `\r`) with the two characters `\n`
/// so a serialized message always occupies exactly one line.
pub fn escape_newlines(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.replace("\r\n", "\\n")
            .replace('\n', "\\n")
            .replace('\r', "\\n"),
    )
}

/// Serialize a message into a single framing-safe line (no trailing newline)
pub fn encode_line(message: &JsonRpcMessage) -> TransportResult<String> {
    let json = serde_json::to_string(message)?;
    Ok(escape_newlines(&json).into_owned())
}

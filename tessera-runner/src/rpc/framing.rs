// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tessera_metadata::RpcMessage;

/// The prefix of every framed line.
///
/// A worker's stdout carries the RPC channel, and anything a test prints to stdout ends up on the
/// same stream. The marker starts with an ASCII record separator so that ordinary output is never
/// mistaken for a frame.
pub const FRAME_MARKER: &str = "\u{1e}tessera:";

/// Encodes a message as a single framed line, including the trailing newline.
pub fn encode_frame(message: &RpcMessage) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(message)?;
    let mut line = String::with_capacity(FRAME_MARKER.len() + json.len() + 1);
    line.push_str(FRAME_MARKER);
    line.push_str(&json);
    line.push('\n');
    Ok(line)
}

/// One line read from an RPC stream.
#[derive(Debug)]
pub struct DecodedLine<'a> {
    /// Text that is not part of a frame. Empty if the whole line was a frame.
    ///
    /// A test that prints without a trailing newline leaves its output in front of the next frame
    /// on the same line, so stray text and a frame can share a line.
    pub stray: &'a str,

    /// The frame on this line, if there was one.
    pub frame: Option<Result<RpcMessage, serde_json::Error>>,
}

/// Splits a line (without its newline) into stray output and a frame.
pub fn decode_line(line: &str) -> DecodedLine<'_> {
    match line.find(FRAME_MARKER) {
        Some(index) => DecodedLine {
            stray: &line[..index],
            frame: Some(serde_json::from_str(&line[index + FRAME_MARKER.len()..])),
        },
        None => DecodedLine {
            stray: line,
            frame: None,
        },
    }
}

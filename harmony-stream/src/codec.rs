//! Stanza framing over the raw XMPP byte stream.
//!
//! The hub writes a continuous XML document; replies and push events arrive
//! as top-level child elements with no length prefix or delimiter. The codec
//! scans for tag balance and yields one complete stanza per frame. Stream
//! header material (`<?xml?>` declaration, `<stream:stream>` open tag and
//! its matching close) never balances, so each of those is emitted as its
//! own frame for the handshake to consume.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;

/// Upper bound on a single stanza. Hub configuration payloads for large
/// installations run to a few hundred kilobytes.
const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

const STREAM_OPEN_NAME: &[u8] = b"stream:stream";

/// Splits the inbound byte stream into whole top-level XML stanzas.
pub struct StanzaCodec {
    max_frame_size: usize,
}

impl StanzaCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for StanzaCodec {
    fn default() -> Self {
        Self::new()
    }
}

enum Scan {
    /// A complete frame occupies the first `len` bytes.
    Complete(usize),
    /// More input is needed.
    Partial,
}

/// Name of the tag whose text starts at `tag[0] == b'<'`.
fn tag_name(tag: &[u8]) -> &[u8] {
    let body = if tag.len() > 1 && tag[1] == b'/' {
        &tag[2..]
    } else {
        &tag[1..]
    };
    let end = body
        .iter()
        .position(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/'))
        .unwrap_or(body.len());
    &body[..end]
}

/// Scan for one complete top-level unit at the start of `src`.
///
/// Callers must have stripped leading whitespace. Quote state is tracked so
/// a `>` inside an attribute value never terminates a tag early.
fn scan(src: &[u8]) -> Scan {
    let mut depth: usize = 0;
    let mut pos = 0;

    while pos < src.len() {
        if src[pos] != b'<' {
            // Character data inside an open element; irrelevant to balance.
            pos += 1;
            continue;
        }

        let tag_start = pos;
        let mut quote: Option<u8> = None;
        let mut tag_end = None;
        let mut i = pos + 1;
        while i < src.len() {
            let b = src[i];
            match quote {
                Some(q) => {
                    if b == q {
                        quote = None;
                    }
                }
                None => match b {
                    b'"' | b'\'' => quote = Some(b),
                    b'>' => {
                        tag_end = Some(i);
                        break;
                    }
                    _ => {}
                },
            }
            i += 1;
        }

        let Some(tag_end) = tag_end else {
            return Scan::Partial;
        };
        let tag = &src[tag_start..=tag_end];
        pos = tag_end + 1;

        if tag.starts_with(b"<?") || tag.starts_with(b"<!") {
            // Declaration, comment or doctype; a declaration at the top
            // level is its own frame.
            if depth == 0 && tag.starts_with(b"<?") {
                return Scan::Complete(pos);
            }
            continue;
        }

        if tag[1] == b'/' {
            if depth == 0 {
                // Only the stream close tag legitimately appears unbalanced.
                return Scan::Complete(pos);
            }
            depth -= 1;
            if depth == 0 {
                return Scan::Complete(pos);
            }
        } else if tag.ends_with(b"/>") {
            if depth == 0 {
                return Scan::Complete(pos);
            }
        } else if depth == 0 && tag_name(tag) == STREAM_OPEN_NAME {
            // The stream header opens the enclosing document and is never
            // closed until teardown; emit it alone.
            return Scan::Complete(pos);
        } else {
            depth += 1;
        }
    }

    Scan::Partial
}

impl Decoder for StanzaCodec {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, TransportError> {
        // Whitespace keepalives between stanzas carry nothing.
        while !src.is_empty() && src[0].is_ascii_whitespace() {
            src.advance(1);
        }
        if src.is_empty() {
            return Ok(None);
        }

        match scan(src) {
            Scan::Complete(len) => {
                let frame = src.split_to(len);
                let text = std::str::from_utf8(&frame)?;
                Ok(Some(text.to_string()))
            }
            Scan::Partial => {
                if src.len() > self.max_frame_size {
                    return Err(TransportError::FrameTooLarge(src.len()));
                }
                src.reserve(1);
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for StanzaCodec {
    type Error = TransportError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), TransportError> {
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

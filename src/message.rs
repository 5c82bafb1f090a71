use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

/// Upper bound on an encoded message, trailing newline included. Longer
/// local lines are truncated before they are queued; longer datagrams are
/// cut at this boundary on receipt.
pub const MAX_MESSAGE_LEN: usize = 256;

/// The two bytes that end a session when they arrive as a whole message.
pub const SENTINEL: &[u8] = b"!\n";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// A single chat message as it travels the pipeline: an immutable byte
/// payload no longer than [`MAX_MESSAGE_LEN`].
///
/// Messages built from local input always end in a single `\n`; messages
/// built from datagrams keep whatever bytes arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    /// Builds a message from one line of local input. The line terminator
    /// (`\n` or `\r\n`) is normalized to a single `\n`, and the text is
    /// truncated at a character boundary so the encoded payload fits
    /// [`MAX_MESSAGE_LEN`].
    pub fn from_line(line: &str) -> Self {
        let text = line.trim_end_matches(LINE_ENDINGS);
        let text = truncate_at_char_boundary(text, MAX_MESSAGE_LEN - 1);
        let mut payload = BytesMut::with_capacity(text.len() + 1);
        payload.put_slice(text.as_bytes());
        payload.put_u8(b'\n');
        Self {
            payload: payload.freeze(),
        }
    }

    /// Builds a message from a received datagram, keeping at most
    /// [`MAX_MESSAGE_LEN`] bytes.
    pub fn from_datagram(payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_MESSAGE_LEN);
        Self {
            payload: Bytes::copy_from_slice(&payload[..len]),
        }
    }

    /// The termination sentinel, exactly as it appears on the wire.
    pub fn sentinel() -> Self {
        Self {
            payload: Bytes::from_static(SENTINEL),
        }
    }

    /// True only for a payload that is exactly the sentinel bytes. A `!`
    /// followed by anything else is ordinary chat.
    pub fn is_sentinel(&self) -> bool {
        self.payload == SENTINEL
    }

    /// The bytes that go on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The displayable text: the payload without its trailing line
    /// terminator, decoded lossily so a malformed datagram still renders.
    pub fn text(&self) -> Cow<'_, str> {
        let mut bytes = self.payload.as_ref();
        if let Some(stripped) = bytes.strip_suffix(b"\n") {
            bytes = stripped;
        }
        if let Some(stripped) = bytes.strip_suffix(b"\r") {
            bytes = stripped;
        }
        String::from_utf8_lossy(bytes)
    }
}

fn truncate_at_char_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

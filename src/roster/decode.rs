//! Ordered-attempt text decoding for uploaded rosters.
//!
//! Spreadsheet exports arrive in whatever encoding the operator's tool
//! produced. Each encoding is tried in priority order; if all of them
//! reject the bytes, the input is decoded lossily. Decoding never fails.

use std::fmt;

use serde::Serialize;

/// Which decoder produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// UTF-8, with a leading byte-order mark stripped if present.
    Utf8Sig,
    Ascii,
    Latin1,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Lossy,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Lossy => "lossy",
        };
        f.write_str(label)
    }
}

/// Decoded roster text tagged with the encoding that succeeded.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
}

/// Encodings tried before the lossy fallback, highest priority first.
const ATTEMPTS: &[TextEncoding] = &[
    TextEncoding::Utf8Sig,
    TextEncoding::Ascii,
    TextEncoding::Latin1,
];

/// Decode raw roster bytes.
pub fn decode_roster_bytes(bytes: &[u8]) -> DecodedText {
    decode_with(bytes, ATTEMPTS)
}

fn decode_with(bytes: &[u8], attempts: &[TextEncoding]) -> DecodedText {
    for &encoding in attempts {
        if let Some(text) = try_decode(bytes, encoding) {
            tracing::debug!(%encoding, len = bytes.len(), "Roster decoded");
            return DecodedText { text, encoding };
        }
    }

    tracing::warn!(len = bytes.len(), "Roster decoded lossily");
    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: TextEncoding::Lossy,
    }
}

fn try_decode(bytes: &[u8], encoding: TextEncoding) -> Option<String> {
    match encoding {
        TextEncoding::Utf8Sig => {
            let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            std::str::from_utf8(body).ok().map(str::to_string)
        }
        TextEncoding::Ascii => bytes
            .is_ascii()
            .then(|| bytes.iter().map(|&b| b as char).collect()),
        // Every byte maps to the code point of the same value.
        TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        TextEncoding::Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

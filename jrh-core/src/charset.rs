//! Character encodings accepted for JSON-RPC message bodies
//!
//! JSON text is Unicode, but the bytes on the wire can use any of the UTF
//! encoding forms. The charset is negotiated through the `charset` parameter
//! of the `Content-Type` header; this module holds the small whitelist the
//! client accepts and converts between text and bytes for each entry.
//!
//! `utf-16` and `utf-32` without an explicit byte order mean big endian, and
//! a byte order mark at the start of a body always wins over the declared
//! order.

use crate::error::{ClientErrorKind, Error, Result};
use std::fmt;
use std::str::FromStr;

/// A supported character encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    /// UTF-8 (the default)
    #[default]
    Utf8,
    /// UTF-16, little endian
    Utf16Le,
    /// UTF-16, big endian
    Utf16Be,
    /// UTF-32, little endian
    Utf32Le,
    /// UTF-32, big endian
    Utf32Be,
}

impl Charset {
    /// Parse a charset token such as `utf-8` or `"UTF-16LE"`
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedCharset` for tokens outside the whitelist.
    pub fn parse(token: &str) -> Result<Charset> {
        let normalized = token.trim().trim_matches('"').to_ascii_lowercase();
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "utf-16" | "utf-16be" => Ok(Charset::Utf16Be),
            "utf-16le" => Ok(Charset::Utf16Le),
            "utf-32" | "utf-32be" => Ok(Charset::Utf32Be),
            "utf-32le" => Ok(Charset::Utf32Le),
            _ => Err(Error::UnsupportedCharset(token.to_string())),
        }
    }

    /// The token sent in `charset` parameters
    pub fn token(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Utf16Le => "utf-16le",
            Charset::Utf16Be => "utf-16be",
            Charset::Utf32Le => "utf-32le",
            Charset::Utf32Be => "utf-32be",
        }
    }

    /// Encode text into bytes (no byte order mark is written)
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Charset::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Charset::Utf32Le => text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect(),
            Charset::Utf32Be => text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect(),
        }
    }

    /// Decode bytes into text
    ///
    /// # Errors
    ///
    /// Malformed byte sequences fail with
    /// [`ClientErrorKind::InvalidResponse`].
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => {
                let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
                std::str::from_utf8(bytes)
                    .map(str::to_string)
                    .map_err(|e| malformed(self, e))
            }
            Charset::Utf16Le | Charset::Utf16Be => {
                let (bytes, little_endian) = match bytes {
                    [0xFF, 0xFE, rest @ ..] => (rest, true),
                    [0xFE, 0xFF, rest @ ..] => (rest, false),
                    _ => (bytes, *self == Charset::Utf16Le),
                };
                if bytes.len() % 2 != 0 {
                    return Err(malformed(self, "odd number of bytes"));
                }
                let units = bytes.chunks_exact(2).map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if little_endian {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                });
                char::decode_utf16(units)
                    .collect::<std::result::Result<String, _>>()
                    .map_err(|e| malformed(self, e))
            }
            Charset::Utf32Le | Charset::Utf32Be => {
                let (bytes, little_endian) = match bytes {
                    [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => (rest, true),
                    [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => (rest, false),
                    _ => (bytes, *self == Charset::Utf32Le),
                };
                if bytes.len() % 4 != 0 {
                    return Err(malformed(self, "length is not a multiple of four"));
                }
                bytes
                    .chunks_exact(4)
                    .map(|quad| {
                        let quad = [quad[0], quad[1], quad[2], quad[3]];
                        let scalar = if little_endian {
                            u32::from_le_bytes(quad)
                        } else {
                            u32::from_be_bytes(quad)
                        };
                        char::from_u32(scalar).ok_or_else(|| {
                            malformed(self, format!("invalid scalar value {:#x}", scalar))
                        })
                    })
                    .collect()
            }
        }
    }
}

fn malformed(charset: &Charset, reason: impl fmt::Display) -> Error {
    Error::client_detail(
        ClientErrorKind::InvalidResponse,
        None,
        format!("malformed {} text: {}", charset.token(), reason),
    )
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Charset::parse(s)
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

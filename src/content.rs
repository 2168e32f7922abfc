//! Content-Transfer-Encoding decoding for stored body parts

use base64::Engine;
use std::fmt;

use crate::error::{Error, Result};

/// Declared transfer encoding of a body part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    Identity,
    Base64,
    QuotedPrintable,
    /// Anything else; decoded as identity
    Other(String),
}

impl TransferEncoding {
    /// Parse a declared encoding name; `None` and blank names mean identity
    pub fn parse(name: Option<&str>) -> Self {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_ascii_lowercase(),
            _ => return TransferEncoding::Identity,
        };
        match name.as_str() {
            "7bit" | "8bit" | "binary" | "identity" | "none" => TransferEncoding::Identity,
            "base64" => TransferEncoding::Base64,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Other(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransferEncoding::Identity => "identity",
            TransferEncoding::Base64 => "base64",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Other(name) => name,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode `raw` according to `encoding`
///
/// Unknown encodings return the input unchanged. Malformed base64 is a
/// `Decode` error; quoted-printable is decoded in robust mode, which passes
/// invalid escape sequences through.
pub fn decode(raw: &[u8], encoding: &TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::Identity => Ok(raw.to_vec()),
        TransferEncoding::Base64 => {
            let cleaned: Vec<u8> = raw
                .iter()
                .filter(|b| !b.is_ascii_whitespace())
                .copied()
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(&cleaned)
                .map_err(|e| Error::Decode(format!("Invalid base64 content: {}", e)))
        }
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(raw, quoted_printable::ParseMode::Robust)
                .map_err(|e| Error::Decode(format!("Invalid quoted-printable content: {}", e)))
        }
        TransferEncoding::Other(name) => {
            log::debug!("Unknown transfer encoding '{}', keeping raw bytes", name);
            Ok(raw.to_vec())
        }
    }
}

/// Decode by declared encoding name
pub fn decode_named(raw: &[u8], encoding: Option<&str>) -> Result<Vec<u8>> {
    decode(raw, &TransferEncoding::parse(encoding))
}

/// Text of decoded body bytes in the declared `charset`
///
/// UTF-8 and US-ASCII labels read as UTF-8; US-ASCII bodies that are not
/// valid UTF-8 fall back to windows-1252. Unknown labels decode lossily as
/// UTF-8.
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    let label = charset.trim().to_ascii_lowercase();
    match label.as_str() {
        "" | "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        "us-ascii" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        _ => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => encoding.decode(bytes).0.into_owned(),
            None => {
                log::warn!("Unknown charset '{}', reading as UTF-8", charset);
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}

/// Encode bytes as base64, used when a body cannot be kept as text
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

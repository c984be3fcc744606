//! Certificates, keys and subject alternative names.
//!
//! Parsing is done with `x509-parser` and its DER reader; nothing here
//! verifies signatures or builds chains.

pub mod altnames;
pub mod certificate;
pub mod key;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use x509_parser::der_parser::ber::BerObject;
use x509_parser::der_parser::parse_der;

/// Why a certificate or key came out null.
#[derive(Debug, Error)]
pub(crate) enum SslParseError {
    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("invalid DER: {0}")]
    Der(String),

    #[error("passphrase-protected keys are not supported")]
    Encrypted,

    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("unsupported {0}")]
    Unsupported(String),
}

pub(crate) type ParseResult<T> = std::result::Result<T, SslParseError>;

/// Wraps DER bytes in a PEM block with 64-column lines.
pub(crate) fn encode_pem(label: &str, der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// Parses one complete DER object, rejecting trailing bytes.
pub(crate) fn der_object(bytes: &[u8]) -> ParseResult<BerObject<'_>> {
    match parse_der(bytes) {
        Ok((rest, object)) if rest.is_empty() => Ok(object),
        Ok((rest, _)) => Err(SslParseError::Der(format!("{} trailing bytes", rest.len()))),
        Err(err) => Err(SslParseError::Der(err.to_string())),
    }
}

pub(crate) fn der_sequence<'a, 'b>(object: &'b BerObject<'a>) -> ParseResult<&'b [BerObject<'a>]> {
    object
        .as_sequence()
        .map(Vec::as_slice)
        .map_err(|err| SslParseError::Der(err.to_string()))
}

pub(crate) fn der_bytes<'b>(object: &'b BerObject<'_>) -> ParseResult<&'b [u8]> {
    object
        .as_slice()
        .map_err(|err| SslParseError::Der(err.to_string()))
}

/// Bit length of an unsigned big-endian integer.
pub(crate) fn integer_bits(bytes: &[u8]) -> i32 {
    let significant = match bytes.iter().position(|&b| b != 0) {
        Some(start) => &bytes[start..],
        None => return 0,
    };
    ((significant.len() - 1) * 8) as i32 + (8 - significant[0].leading_zeros() as i32)
}

pub(crate) fn hex_colon(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_bits_ignores_sign_padding() {
        assert_eq!(integer_bits(&[0x00, 0x80, 0x00]), 16);
        assert_eq!(integer_bits(&[0x01]), 1);
        assert_eq!(integer_bits(&[0, 0]), 0);
    }

    #[test]
    fn test_encode_pem_wraps_lines() {
        let pem = encode_pem("TEST", &[0u8; 60]);
        let lines: Vec<_> = pem.lines().collect();
        assert_eq!(lines[0], "-----BEGIN TEST-----");
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines.last().copied(), Some("-----END TEST-----"));
    }
}

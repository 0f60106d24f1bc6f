//! Best-effort charset guessing for file contents.

use std::borrow::Cow;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Encodings recognised when decoding file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Charset {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl Charset {
    /// Guess the charset from a byte-order mark, defaulting to UTF-8.
    /// Returns the charset and the length of the mark to skip.
    pub(crate) fn guess(bytes: &[u8]) -> (Self, usize) {
        if bytes.starts_with(UTF8_BOM) {
            (Self::Utf8, UTF8_BOM.len())
        } else if bytes.starts_with(UTF16_LE_BOM) {
            (Self::Utf16Le, UTF16_LE_BOM.len())
        } else if bytes.starts_with(UTF16_BE_BOM) {
            (Self::Utf16Be, UTF16_BE_BOM.len())
        } else {
            (Self::Utf8, 0)
        }
    }
}

/// Decode `bytes` with its guessed charset. `None` means the content is not
/// valid in that charset.
pub(crate) fn decode(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let (charset, bom) = Charset::guess(bytes);
    let body = &bytes[bom..];
    match charset {
        Charset::Utf8 => std::str::from_utf8(body).ok().map(Cow::Borrowed),
        Charset::Utf16Le => decode_utf16(body, u16::from_le_bytes).map(Cow::Owned),
        Charset::Utf16Be => decode_utf16(body, u16::from_be_bytes).map(Cow::Owned),
    }
}

fn decode_utf16(body: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    let chunks = body.chunks_exact(2);
    if !chunks.remainder().is_empty() {
        return None;
    }
    let units: Vec<u16> = chunks.map(|pair| unit([pair[0], pair[1]])).collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_is_borrowed() {
        let decoded = decode(b"fn main() {}\n").expect("utf-8");
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "fn main() {}\n");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        assert_eq!(decode(b"\xEF\xBB\xBFabc").expect("utf-8").as_ref(), "abc");
    }

    #[test]
    fn utf16_variants_decode() {
        let le = [0xFF, 0xFE, b'h', 0, b'i', 0];
        let be = [0xFE, 0xFF, 0, b'h', 0, b'i'];
        assert_eq!(decode(&le).expect("utf-16le"), "hi");
        assert_eq!(decode(&be).expect("utf-16be"), "hi");
    }

    #[test]
    fn invalid_content_is_rejected() {
        assert!(decode(&[0x66, 0x6F, 0xC3]).is_none());
        assert!(decode(&[0xFF, 0xFE, b'h']).is_none());
    }
}

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PduError {
    #[error("Invalid hex payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("UCS-2 payload has an odd number of bytes ({0})")]
    OddLength(usize),

    #[error("UCS-2 payload is not valid UTF-16")]
    Utf16
}

/// True when every character is a hex digit. The empty string counts as encoded.
pub fn is_hex_encoded(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Decode a UCS-2 (UTF-16BE) hex string, returning plain text unchanged.
pub fn decode(s: &str) -> Result<String, PduError> {
    if !is_hex_encoded(s) {
        return Ok(s.to_string());
    }

    let bytes = hex::decode(s)?;
    if bytes.len() % 2 != 0 {
        return Err(PduError::OddLength(bytes.len()));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| PduError::Utf16)
}

/// Like `decode`, but hands back the input when it only looked like hex.
/// Modems report plain digit strings (phone numbers) that pass the hex check.
pub fn decode_or_raw(s: &str) -> String {
    decode(s).unwrap_or_else(|_| s.to_string())
}

/// Encode text as uppercase UTF-16BE hex, the form `AT+CSCS="UCS2"` expects.
pub fn encode(text: &str) -> String {
    let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_detection() {
        assert!(is_hex_encoded(""));
        assert!(is_hex_encoded("1A2B"));
        assert!(is_hex_encoded("00480065"));
        assert!(!is_hex_encoded("HELLO"));
        assert!(!is_hex_encoded("12 34"));
    }

    #[test]
    fn decodes_ucs2_text() {
        assert_eq!(decode("00480069").unwrap(), "Hi");
        assert_eq!(decode("4F60597D").unwrap(), "你好");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode("ONEWORD").unwrap(), "ONEWORD");
        assert_eq!(decode("").unwrap(), "");
    }

    #[test]
    fn malformed_hex_is_an_error() {
        assert!(matches!(decode("123"), Err(PduError::Hex(_))));
        assert_eq!(decode("123456"), Err(PduError::OddLength(3)));
        // Lone high surrogate
        assert_eq!(decode("D800"), Err(PduError::Utf16));
    }

    #[test]
    fn digit_strings_fall_back_to_raw() {
        assert_eq!(decode_or_raw("8613800138000"), "8613800138000");
        assert_eq!(decode_or_raw("0031003000300038003600"), "0031003000300038003600");
    }

    #[test]
    fn encode_is_uppercase_utf16be() {
        assert_eq!(encode("Hi"), "00480069");
        assert_eq!(encode("你好"), "4F60597D");
        assert_eq!(encode("😀"), "D83DDE00");
        assert_eq!(encode(""), "");
    }

    #[test]
    fn round_trips_text() {
        for text in ["", "plain ascii", "10086", "短信 test ✓", "emoji 😀 pair", "\u{FFFD}\u{0001}"] {
            assert_eq!(decode(&encode(text)).unwrap(), text);
        }
    }
}

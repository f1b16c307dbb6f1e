use crate::error::DecodeError;

/// Turns an image or camera frame into the text held by an optical code.
///
/// `Ok(None)` means the frame was readable but held no code.
pub trait FrameDecoder {
    type Frame: ?Sized;

    fn decode(&self, frame: &Self::Frame) -> Result<Option<String>, DecodeError>;
}

/// Decoder for frames that were already decoded elsewhere and saved as text
/// (scanner dumps, clipboard exports).
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextDecoder;

impl FrameDecoder for PlainTextDecoder {
    type Frame = [u8];

    fn decode(&self, frame: &[u8]) -> Result<Option<String>, DecodeError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| DecodeError(format!("payload is not valid UTF-8: {e}")))?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let decoder = PlainTextDecoder;
        assert_eq!(
            decoder.decode(b"https://example.com\n").unwrap(),
            Some("https://example.com".to_string())
        );
        assert_eq!(
            decoder.decode("\u{feff}+6591234567".as_bytes()).unwrap(),
            Some("+6591234567".to_string())
        );
    }

    #[test]
    fn test_empty_frame_has_no_code() {
        assert_eq!(PlainTextDecoder.decode(b"").unwrap(), None);
        assert_eq!(PlainTextDecoder.decode(b"  \r\n").unwrap(), None);
    }

    #[test]
    fn test_binary_frame_is_decode_error() {
        assert!(PlainTextDecoder.decode(&[0x89, 0x50, 0x4e, 0x47, 0xff, 0xfe]).is_err());
    }
}

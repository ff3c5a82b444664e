use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use log;

/// Number of leading characters inspected by the binary heuristic.
const BINARY_SAMPLE_CHARS: usize = 1000;
/// Share of control characters (percent) above which text counts as binary.
const BINARY_CONTROL_PERCENT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    /// Some bytes could not be decoded and were replaced with U+FFFD.
    pub lossy: bool,
}

/// Decodes raw file bytes into text.
///
/// Valid UTF-8 is passed through untouched. Otherwise, with detection on, a
/// byte-order mark or a confident `chardetng` guess picks the decoder; in
/// every other case the bytes are read as UTF-8 with replacement characters.
pub fn decode_bytes(bytes: &[u8], detect: bool) -> DecodedText {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_string(),
            encoding: "UTF-8",
            lossy: false,
        };
    }

    if detect {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
            return DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
                lossy: had_errors,
            };
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let (encoding, confident) = detector.guess_assess(None, true);
        if confident {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            log::trace!("Detected encoding {}", encoding.name());
            return DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
                lossy: had_errors,
            };
        }
        log::debug!(
            "Low-confidence encoding guess ({}), falling back to UTF-8",
            encoding.name()
        );
    }

    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: "UTF-8",
        lossy: true,
    }
}

/// Text holding a NUL, or whose first 1000 characters are more than 30%
/// control characters (tab, LF and CR excepted), is treated as binary.
pub fn looks_binary(text: &str) -> bool {
    if text.contains('\0') {
        return true;
    }
    let mut sampled = 0usize;
    let mut control = 0usize;
    for c in text.chars().take(BINARY_SAMPLE_CHARS) {
        sampled += 1;
        if c.is_control() && !matches!(c, '\t' | '\n' | '\r') {
            control += 1;
        }
    }
    sampled > 0 && control * 100 > sampled * BINARY_CONTROL_PERCENT
}

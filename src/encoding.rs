use std::fmt;

use anyhow::{Result, anyhow, bail};
use encoding_rs::{Encoding, UTF_8};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Override,
    Default,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Override => "override",
            EncodingSource::Default => "default",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub had_errors: bool,
    pub had_bom: bool,
}

/// The single encoding used to both read and write a target file.
#[derive(Debug, Clone)]
pub struct EncodingStrategy {
    encoding: &'static Encoding,
    source: EncodingSource,
}

impl EncodingStrategy {
    pub fn new(override_label: Option<&str>) -> Result<Self> {
        let Some(label) = override_label else {
            return Ok(Self {
                encoding: UTF_8,
                source: EncodingSource::Default,
            });
        };

        let trimmed = label.trim();
        let encoding = Encoding::for_label(trimmed.as_bytes())
            .ok_or_else(|| anyhow!("unknown encoding override '{trimmed}'"))?;
        if encoding.output_encoding() != encoding {
            bail!(
                "encoding '{trimmed}' ({}) can be read but not written",
                encoding.name()
            );
        }
        Ok(Self {
            encoding,
            source: EncodingSource::Override,
        })
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn describe(&self) -> String {
        format!("{} ({})", self.encoding.name(), self.source)
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodedText {
        let had_bom = self.encoding == UTF_8 && bytes.starts_with(&UTF8_BOM);
        let (cow, had_errors) = self.encoding.decode_with_bom_removal(bytes);
        DecodedText {
            text: cow.into_owned(),
            had_errors,
            had_bom,
        }
    }

    /// Returns the encoded bytes and whether any character had to be replaced.
    pub fn encode(&self, text: &str, with_bom: bool) -> (Vec<u8>, bool) {
        let (encoded, _, had_errors) = self.encoding.encode(text);
        let mut bytes = Vec::with_capacity(encoded.len() + UTF8_BOM.len());
        if with_bom && self.encoding == UTF_8 {
            bytes.extend_from_slice(&UTF8_BOM);
        }
        bytes.extend_from_slice(&encoded);
        (bytes, had_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_utf8() {
        let strategy = EncodingStrategy::new(None).expect("default strategy");
        assert_eq!(strategy.describe(), "UTF-8 (default)");
    }

    #[test]
    fn override_validation() {
        let strategy = EncodingStrategy::new(Some(" shift_jis ")).expect("valid encoding");
        assert_eq!(strategy.describe(), "Shift_JIS (override)");
        assert!(EncodingStrategy::new(Some("klingon")).is_err());
    }

    #[test]
    fn decode_only_encodings_are_rejected() {
        assert!(EncodingStrategy::new(Some("utf-16le")).is_err());
    }

    #[test]
    fn utf8_bom_is_stripped_and_restored() {
        let strategy = EncodingStrategy::new(None).expect("default strategy");
        let decoded = strategy.decode(b"\xEF\xBB\xBF.chair {}\n");
        assert!(decoded.had_bom);
        assert_eq!(decoded.text, ".chair {}\n");

        let (bytes, had_errors) = strategy.encode(&decoded.text, decoded.had_bom);
        assert!(!had_errors);
        assert_eq!(bytes, b"\xEF\xBB\xBF.chair {}\n");
    }

    #[test]
    fn japanese_text_round_trips_through_shift_jis() {
        let strategy = EncodingStrategy::new(Some("shift_jis")).expect("valid encoding");
        let (bytes, had_errors) = strategy.encode("椅子を立つ", false);
        assert!(!had_errors);
        let decoded = strategy.decode(&bytes);
        assert_eq!(decoded.text, "椅子を立つ");
        assert!(!decoded.had_bom);
    }
}

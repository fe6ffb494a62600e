use std::borrow::Cow;
use std::str::FromStr;

use encoding_rs::{Encoding, GB18030, SHIFT_JIS, UTF_8};

/// Text encoding of strings embedded in a script image.
///
/// The format predates Unicode adoption in the scene; most commercial
/// scripts are Shift-JIS, fan translations tend to be GBK or UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Nls {
    #[default]
    ShiftJIS,
    GBK,
    UTF8,
}

impl Nls {
    #[inline]
    fn encoding(self) -> &'static Encoding {
        match self {
            Nls::ShiftJIS => SHIFT_JIS,
            // GB18030 is a superset of GBK and more robust for legacy assets.
            Nls::GBK => GB18030,
            Nls::UTF8 => UTF_8,
        }
    }

    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (s, _, had_errors) = self.encoding().decode(bytes);
        if had_errors {
            log::error!("failed to cleanly decode string as {:?}", self);
        }
        s
    }

    /// Best effort: unrepresentable characters are replaced.
    pub fn encode<'a>(&self, s: &'a str) -> Cow<'a, [u8]> {
        let (bytes, _, _) = self.encoding().encode(s);
        bytes
    }
}

impl FromStr for Nls {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sjis" => Ok(Nls::ShiftJIS),
            "gbk" => Ok(Nls::GBK),
            "utf8" => Ok(Nls::UTF8),
            _ => Err(anyhow::anyhow!("unknown NLS: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("sjis".parse::<Nls>().unwrap(), Nls::ShiftJIS);
        assert_eq!("GBK".parse::<Nls>().unwrap(), Nls::GBK);
        assert!("latin1".parse::<Nls>().is_err());
    }

    #[test]
    fn utf8_round_trip() {
        let nls = Nls::UTF8;
        let bytes = nls.encode("こんにちは");
        assert_eq!(nls.decode(&bytes), "こんにちは");
    }
}

//! Ordered FITS header card collection.
//!
//! Cards keep their insertion order so files written from the same header
//! are byte-for-byte comparable. Re-setting an existing keyword replaces its
//! value in place.

use std::fmt;

/// Value of a single header card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Int(i) => Some(*i as f64),
            HeaderValue::Str(_) => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => write!(f, "'{s}'"),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v:.12E}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

/// Insertion-ordered keyword/value cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<(String, HeaderValue)>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `keyword`, replacing any previous value but keeping its position.
    ///
    /// Keywords are stored upper-cased, matching how FITS readers report them.
    pub fn set(&mut self, keyword: &str, value: impl Into<HeaderValue>) {
        let keyword = keyword.to_ascii_uppercase();
        let value = value.into();
        match self.cards.iter_mut().find(|(k, _)| *k == keyword) {
            Some((_, existing)) => *existing = value,
            None => self.cards.push((keyword, value)),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        let keyword = keyword.to_ascii_uppercase();
        self.cards
            .iter()
            .find(|(k, _)| *k == keyword)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_preserves_order_and_replaces() {
        let mut header = FitsHeader::new();
        header.set("CRPIX1", 10.5);
        header.set("CTYPE1", "RA---TAN-SIP");
        header.set("crpix1", 11.5);

        let keys: Vec<&str> = header.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["CRPIX1", "CTYPE1"]);
        assert_eq!(header.get("CRPIX1").and_then(|v| v.as_f64()), Some(11.5));
        assert_eq!(header.len(), 2);
    }

    #[test]
    fn test_typed_accessors() {
        let mut header = FitsHeader::new();
        header.set("OBSID", 112_i64);
        header.set("CHIPID", "R22_S11");

        assert_eq!(header.get("OBSID").and_then(|v| v.as_i64()), Some(112));
        assert_eq!(header.get("OBSID").and_then(|v| v.as_f64()), Some(112.0));
        assert_eq!(header.get("CHIPID").and_then(|v| v.as_str()), Some("R22_S11"));
        assert!(header.get("CHIPID").and_then(|v| v.as_f64()).is_none());
        assert!(!header.contains_key("OUTFILE"));
    }
}

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    // Bare international dial string, e.g. "+6591234567"
    static ref DIAL_STRING: Regex = Regex::new(r"^\+[0-9]{6,15}$").unwrap();
}

/// Semantic type of a decoded payload. Closed set, `Text` is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Url,
    Phone,
    Sms,
    Email,
    Numeric,
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Url => "URL",
            ContentType::Phone => "PHONE",
            ContentType::Sms => "SMS",
            ContentType::Email => "EMAIL",
            ContentType::Numeric => "NUMERIC",
            ContentType::Text => "TEXT",
        }
    }

    /// Only links are sent to the verification service.
    pub fn requires_verification(&self) -> bool {
        matches!(self, ContentType::Url)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty payload as handed over by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(String);

impl RawPayload {
    /// Returns `None` for empty or whitespace-only input ("no code found").
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == raw.len() {
            Some(RawPayload(raw))
        } else {
            Some(RawPayload(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn has_prefix_ignore_case(raw: &str, prefix: &str) -> bool {
    raw.len() >= prefix.len()
        && raw.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Classify a decoded payload by shape only.
///
/// Precedence is first-match-wins: URL, phone, SMS, mailto, all-digit, then
/// `Text`. Total over every input, including the empty string.
pub fn classify(raw: &str) -> ContentType {
    if has_prefix_ignore_case(raw, "http://") || has_prefix_ignore_case(raw, "https://") {
        ContentType::Url
    } else if has_prefix_ignore_case(raw, "tel:") || DIAL_STRING.is_match(raw) {
        ContentType::Phone
    } else if has_prefix_ignore_case(raw, "sms:") || has_prefix_ignore_case(raw, "smsto:") {
        ContentType::Sms
    } else if has_prefix_ignore_case(raw, "mailto:") {
        ContentType::Email
    } else if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        ContentType::Numeric
    } else {
        ContentType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_prefixes() {
        assert_eq!(classify("https://safe-site.example"), ContentType::Url);
        assert_eq!(classify("http://example.com/path?q=1"), ContentType::Url);
        assert_eq!(classify("HTTPS://EXAMPLE.COM"), ContentType::Url);
        assert_eq!(classify("https:/broken"), ContentType::Text);
        assert_eq!(classify("ftp://example.com"), ContentType::Text);
    }

    #[test]
    fn test_phone_variants() {
        assert_eq!(classify("+6591234567"), ContentType::Phone);
        assert_eq!(classify("tel:+6591234567"), ContentType::Phone);
        assert_eq!(classify("TEL:555"), ContentType::Phone);
        assert_eq!(classify("+12"), ContentType::Text);
    }

    #[test]
    fn test_sms_and_email() {
        assert_eq!(classify("sms:+6591234567"), ContentType::Sms);
        assert_eq!(classify("SMSTO:+6591234567:hello"), ContentType::Sms);
        assert_eq!(classify("mailto:someone@example.com"), ContentType::Email);
        // No mailto prefix means it is just text
        assert_eq!(classify("someone@example.com"), ContentType::Text);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(classify("0123456789"), ContentType::Numeric);
        assert_eq!(classify("7"), ContentType::Numeric);
        assert_eq!(classify("12 34"), ContentType::Text);
        assert_eq!(classify("١٢٣"), ContentType::Text);
    }

    #[test]
    fn test_fallback_and_empty() {
        assert_eq!(classify(""), ContentType::Text);
        assert_eq!(classify("WIFI:S:home;T:WPA;P:secret;;"), ContentType::Text);
        assert_eq!(classify("h"), ContentType::Text);
    }

    #[test]
    fn test_precedence() {
        // A URL that happens to mention a phone scheme is still a URL
        assert_eq!(classify("https://example.com/tel:123"), ContentType::Url);
        // The dial-string rule wins over the all-digit rule only with a plus sign
        assert_eq!(classify("6591234567"), ContentType::Numeric);
    }

    #[test]
    fn test_deterministic() {
        let inputs = ["https://a.example", "+6591234567", "sms:1", "hello", "", "42"];
        for input in inputs {
            assert_eq!(classify(input), classify(input));
        }
    }

    #[test]
    fn test_raw_payload_rejects_blank() {
        assert!(RawPayload::new("").is_none());
        assert!(RawPayload::new("   \n\t").is_none());
        let payload = RawPayload::new("  https://example.com \n").unwrap();
        assert_eq!(payload.as_str(), "https://example.com");
    }

    #[test]
    fn test_only_urls_need_verification() {
        assert!(ContentType::Url.requires_verification());
        for ty in [
            ContentType::Phone,
            ContentType::Sms,
            ContentType::Email,
            ContentType::Numeric,
            ContentType::Text,
        ] {
            assert!(!ty.requires_verification());
        }
    }
}

//! # Text Processing Module
//!
//! Turns raw Tesseract output into structured payment card fields.
//!
//! ## Pipeline
//!
//! 1. [`normalize_ocr_text`] trims leading and trailing whitespace. Internal
//!    whitespace is kept because it separates digit groups the OCR engine
//!    split across visual gaps.
//! 2. [`extract_card_fields`] runs three independent regex matchers (card
//!    number, CVC, expiry) against the normalized text and packs the results
//!    into an [`ExtractedCard`].
//!
//! Every matcher is anchored on word boundaries and takes the first match in
//! document order. A missing field is a normal outcome, never an error.
//!
//! The CVC matcher does not exclude spans already consumed by the card number
//! or expiry matchers: the first standalone 3-digit token wins wherever it
//! comes from.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Card fields recognized in a single OCR result
///
/// Each field is independently optional. `expire_mm` and `expire_yy` are
/// always both present or both absent since they come from one `MM/YY` token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCard {
    /// 16 digits, separators removed
    #[serde(rename = "cardNumber")]
    pub card_number: Option<String>,
    /// Two digit expiry year
    #[serde(rename = "expireYY")]
    pub expire_yy: Option<String>,
    /// Two digit expiry month, not range checked
    #[serde(rename = "expireMM")]
    pub expire_mm: Option<String>,
    /// Three digit security code
    pub cvc: Option<String>,
}

impl ExtractedCard {
    /// Number of fields that were recognized (expiry counts once)
    pub fn recognized_field_count(&self) -> usize {
        [
            self.card_number.is_some(),
            self.expire_mm.is_some(),
            self.cvc.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// True when nothing card-like was found in the text
    pub fn is_empty(&self) -> bool {
        self.recognized_field_count() == 0
    }
}

lazy_static! {
    /// First alternative that matches at the earliest position wins.
    static ref CARD_NUMBER_REGEX: Regex = Regex::new(
        r"(?x)
        \b
        (?:
            \d{16}                  # contiguous
          | \d{8}\s*\d{8}           # two halves
          | \d{4}(?:\s*\d{4}){3}    # four groups
        )
        \b
        "
    )
    .expect("card number pattern should be valid");

    static ref CVC_REGEX: Regex =
        Regex::new(r"\b(\d{3})\b").expect("CVC pattern should be valid");

    static ref EXPIRY_REGEX: Regex =
        Regex::new(r"\b(\d{2})/(\d{2})\b").expect("expiry pattern should be valid");
}

/// Strip leading and trailing whitespace, newlines included
pub fn normalize_ocr_text(raw: &str) -> String {
    raw.trim().to_string()
}

/// Find the first card number and return it with all whitespace removed
pub fn find_card_number(text: &str) -> Option<String> {
    CARD_NUMBER_REGEX.find(text).map(|m| {
        m.as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    })
}

/// Find the first standalone three digit token
pub fn find_cvc(text: &str) -> Option<String> {
    CVC_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find the first `MM/YY` token, returned as `(month, year)`
pub fn find_expiry(text: &str) -> Option<(String, String)> {
    EXPIRY_REGEX.captures(text).and_then(|caps| {
        let month = caps.get(1)?.as_str().to_string();
        let year = caps.get(2)?.as_str().to_string();
        Some((month, year))
    })
}

/// Run all three matchers against already normalized text
pub fn extract_card_fields(text: &str) -> ExtractedCard {
    let card_number = find_card_number(text);
    let cvc = find_cvc(text);
    let (expire_mm, expire_yy) = match find_expiry(text) {
        Some((month, year)) => (Some(month), Some(year)),
        None => (None, None),
    };

    let card = ExtractedCard {
        card_number,
        expire_yy,
        expire_mm,
        cvc,
    };

    trace!(
        has_card_number = card.card_number.is_some(),
        has_expiry = card.expire_mm.is_some(),
        has_cvc = card.cvc.is_some(),
        text_len = text.len(),
        "Card field extraction finished"
    );

    card
}

/// Normalize raw OCR output and extract card fields in one step
pub fn parse_card_text(raw: &str) -> ExtractedCard {
    extract_card_fields(&normalize_ocr_text(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_outer_whitespace_only() {
        assert_eq!(normalize_ocr_text("  \n4111 2222\t3333 4444\n\n"), "4111 2222\t3333 4444");
        assert_eq!(normalize_ocr_text(""), "");
        assert_eq!(normalize_ocr_text(" \n\t "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["", "  12/25 ", "\n4111 2222 3333 4444\n123\n", "abc"] {
            let once = normalize_ocr_text(raw);
            assert_eq!(normalize_ocr_text(&once), once);
        }
    }

    #[test]
    fn test_card_number_shapes() {
        assert_eq!(find_card_number("4111222233334444").as_deref(), Some("4111222233334444"));
        assert_eq!(find_card_number("4111 2222 3333 4444").as_deref(), Some("4111222233334444"));
        assert_eq!(find_card_number("41112222 33334444").as_deref(), Some("4111222233334444"));
        assert_eq!(find_card_number("4111  2222   33334444").as_deref(), Some("4111222233334444"));
        assert_eq!(find_card_number("4111\n2222\n3333\n4444").as_deref(), Some("4111222233334444"));
    }

    #[test]
    fn test_card_number_rejects_longer_runs() {
        assert_eq!(find_card_number("41112222333344445"), None);
        assert_eq!(find_card_number("94111222233334444"), None);
        assert_eq!(find_card_number("4111 2222 3333 444"), None);
        assert_eq!(find_card_number("411 12222 3333 4444"), None);
    }

    #[test]
    fn test_card_number_first_match_wins() {
        let text = "5500000000000004 4111222233334444";
        assert_eq!(find_card_number(text).as_deref(), Some("5500000000000004"));
    }

    #[test]
    fn test_cvc_boundaries() {
        assert_eq!(find_cvc("123").as_deref(), Some("123"));
        assert_eq!(find_cvc("1234"), None);
        assert_eq!(find_cvc("12"), None);
        assert_eq!(find_cvc("cvc:456.").as_deref(), Some("456"));
    }

    #[test]
    fn test_cvc_is_not_disambiguated_against_other_fields() {
        // 3-digit group inside an unrecognized number still counts
        let text = "987 6543\n321";
        assert_eq!(find_cvc(text).as_deref(), Some("987"));
    }

    #[test]
    fn test_expiry_parsing() {
        assert_eq!(find_expiry("12/25"), Some(("12".to_string(), "25".to_string())));
        assert_eq!(find_expiry("13/99"), Some(("13".to_string(), "99".to_string())));
        assert_eq!(find_expiry("12/254"), None);
        assert_eq!(find_expiry("112/25"), None);
        assert_eq!(find_expiry("1/25"), None);
    }

    #[test]
    fn test_extract_all_fields() {
        let card = parse_card_text("\n 4111 2222 3333 4444\n12/25  123 \n");
        assert_eq!(card.card_number.as_deref(), Some("4111222233334444"));
        assert_eq!(card.expire_mm.as_deref(), Some("12"));
        assert_eq!(card.expire_yy.as_deref(), Some("25"));
        assert_eq!(card.cvc.as_deref(), Some("123"));
        assert_eq!(card.recognized_field_count(), 3);
    }

    #[test]
    fn test_extract_nothing() {
        for text in ["", "hello world", "-+*/.,"] {
            let card = extract_card_fields(text);
            assert_eq!(card, ExtractedCard::default());
            assert!(card.is_empty());
        }
    }

    #[test]
    fn test_serialized_shape() {
        let card = ExtractedCard {
            card_number: Some("4111222233334444".to_string()),
            expire_yy: None,
            expire_mm: None,
            cvc: Some("123".to_string()),
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cardNumber": "4111222233334444",
                "expireYY": null,
                "expireMM": null,
                "cvc": "123"
            })
        );
    }
}

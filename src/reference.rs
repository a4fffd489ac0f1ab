//! Payment reference handling: the strict legacy gate and the advisory
//! extraction of reference-looking tokens from receipt text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Expected length of a bank payment reference.
pub const REFERENCE_LEN: usize = 32;

/// Fixed trailing digits shared by references issued for this recipient
/// account.
pub const REFERENCE_SUFFIX: &str = "0011630701";

/// Validates a bare payment-reference string.
///
/// Binary gate only: exactly 32 characters and the fixed numeric suffix. This
/// is the secondary verification path next to the document upload.
pub fn is_valid_reference(reference: Option<&str>) -> bool {
    match reference {
        Some(value) => value.chars().count() == REFERENCE_LEN && value.ends_with(REFERENCE_SUFFIX),
        None => false,
    }
}

// Token next to a word meaning "operation number / identifier / reference".
static KEYWORD_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:НОМЕР ОПЕРАЦИИ|КОД ОПЕРАЦИИ|ИДЕНТИФИКАТОР ОПЕРАЦИИ|ИДЕНТИФИКАТОР|РЕФЕРЕНС)\s*[:#№]?\s*([A-Z0-9]{10,32})",
    )
    .expect("keyword reference pattern")
});

static BARE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z0-9]{10,32})\b").expect("bare token pattern"));

/// Scans normalized (uppercased) receipt text for a token that looks like a
/// payment reference.
///
/// Prefers a token adjacent to a Cyrillic reference keyword; otherwise falls
/// back to any standalone 10-32 character alphanumeric token that mixes
/// letters and digits (a digits-only token is more likely a tax id or an
/// account number). Advisory only: the result is recorded, never a gate.
pub fn extract_reference(normalized: &str) -> Option<String> {
    if let Some(caps) = KEYWORD_REFERENCE.captures(normalized) {
        return Some(caps[1].to_string());
    }

    BARE_TOKEN
        .captures_iter(normalized)
        .map(|caps| caps[1].to_string())
        .find(|token| {
            token.chars().any(|c| c.is_ascii_digit()) && token.chars().any(|c| c.is_ascii_alphabetic())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "A5317171444036040000080011630701";

    #[test]
    fn accepts_well_formed_reference() {
        assert!(is_valid_reference(Some(VALID)));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid_reference(Some("A5317171444036040000080011630701X")));
        assert!(!is_valid_reference(Some("0011630701")));
    }

    #[test]
    fn rejects_wrong_suffix() {
        assert!(!is_valid_reference(Some("A5317171444036040000080011630702")));
    }

    #[test]
    fn rejects_missing_value() {
        assert!(!is_valid_reference(None));
        assert!(!is_valid_reference(Some("")));
    }

    #[test]
    fn extracts_token_after_keyword() {
        let text = "ПЕРЕВОД ВЫПОЛНЕН НОМЕР ОПЕРАЦИИ: A5317171444036040000080011630701 СПАСИБО";
        assert_eq!(
            extract_reference(text).as_deref(),
            Some("A5317171444036040000080011630701")
        );
    }

    #[test]
    fn falls_back_to_standalone_mixed_token() {
        let text = "ОПЛАТА ПРИНЯТА B12C34D56E78 ПОЛУЧАТЕЛЬ";
        assert_eq!(extract_reference(text).as_deref(), Some("B12C34D56E78"));
    }

    #[test]
    fn ignores_digits_only_tokens_without_keyword() {
        // A bare tax id must not be mistaken for a reference.
        assert_eq!(extract_reference("ИНН 6453041398 ПОЛУЧАТЕЛЬ"), None);
    }
}

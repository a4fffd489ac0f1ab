//! Heuristic receipt verification.
//!
//! The text extracted from an uploaded receipt is unreliable (spacing,
//! currency glyphs, line breaks vary between banking apps), so verification
//! is a deliberately permissive multi-criteria match: recipient name, tax id,
//! bank name and donation amount are checked independently and every failed
//! check is reported, not just the first one.

use crate::reference::extract_reference;
use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

/// Matching tables for the verifier. Injected at construction so the rules
/// can be tuned and tested independently of the control flow.
#[derive(Debug, Clone)]
pub struct VerifierRules {
    /// Known-good recipient names: the short transfer tag and the full legal
    /// name. Stored uppercase; matched against normalized (uppercased) text.
    pub recipient_phrases: Vec<String>,
    /// Fixed 10-digit organization tax identifier.
    pub tax_id: String,
    /// Recipient bank name and its short form.
    pub bank_phrases: Vec<String>,
    /// Required donation amount.
    pub amount: f64,
    /// Literal surface forms of the amount seen in real receipts: currency
    /// suffixes, both decimal separators, glued currency letters.
    pub amount_literals: Vec<String>,
    /// Plausible donation range for the diagnostic scan of stray numbers.
    pub scan_min: f64,
    pub scan_max: f64,
}

impl Default for VerifierRules {
    fn default() -> Self {
        Self {
            recipient_phrases: vec![
                "ЦЕРКОВЬ СЛОВО ЖИЗНИ_SBP".to_string(),
                "МЕСТНАЯ РЕЛИГИОЗНАЯ ОРГАНИЗАЦИЯ ХРИСТИАН ВЕРЫ ЕВАНГЕЛЬСКОЙ (ПЯТИДЕСЯТНИКОВ) ЦЕРКОВЬ \"СЛОВО ЖИЗНИ\" САРАТОВ"
                    .to_string(),
            ],
            tax_id: "6453041398".to_string(),
            bank_phrases: vec!["ПАО СБЕРБАНК".to_string(), "СБЕРБАНК".to_string()],
            amount: 500.0,
            amount_literals: vec![
                "500.00".to_string(),
                "500,00".to_string(),
                "500 РУБ".to_string(),
                "500Р".to_string(),
                "500 RUR".to_string(),
                "500.00 РУБ".to_string(),
                "500,00 РУБ".to_string(),
                "500.00Р".to_string(),
                "500,00Р".to_string(),
                "500".to_string(),
            ],
            scan_min: 100.0,
            scan_max: 1000.0,
        }
    }
}

impl VerifierRules {
    /// Amount rendered the way receipts print whole-ruble values.
    pub fn amount_display(&self) -> String {
        if self.amount.fract() == 0.0 {
            format!("{}", self.amount as i64)
        } else {
            format!("{}", self.amount)
        }
    }
}

/// Result of a verification pass: success, or every reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Pass,
    Fail(Vec<String>),
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Pass)
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            VerificationOutcome::Pass => &[],
            VerificationOutcome::Fail(reasons) => reasons,
        }
    }

    /// Single operator-facing message, all defects in one pass.
    pub fn message(&self) -> Option<String> {
        match self {
            VerificationOutcome::Pass => None,
            VerificationOutcome::Fail(reasons) => Some(reasons.join("; ")),
        }
    }
}

/// Verification plus the advisory reference token found alongside it.
#[derive(Debug, Clone)]
pub struct Verification {
    pub outcome: VerificationOutcome,
    pub payment_reference: Option<String>,
}

pub struct ReceiptVerifier {
    rules: VerifierRules,
    /// The amount as a standalone digit run: not glued to other digits.
    amount_boundary: Regex,
    /// Amount with an explicit two-digit decimal part.
    amount_decimal: Regex,
    /// Bounded-width numeric tokens for the diagnostic scan.
    amount_scan: Regex,
}

impl ReceiptVerifier {
    pub fn new(rules: VerifierRules) -> Result<Self> {
        // Escaped: a fractional amount would otherwise inject a `.` wildcard.
        let token = regex::escape(&rules.amount_display());
        let amount_boundary = Regex::new(&format!("(?:^|[^0-9]){token}(?:[^0-9]|$)"))
            .context("amount boundary pattern")?;
        let amount_decimal =
            Regex::new(&format!("{token}[.,]00")).context("amount decimal pattern")?;
        let amount_scan =
            Regex::new(r"\b(\d{3,4}(?:[.,]\d{2})?)\b").context("amount scan pattern")?;
        Ok(Self {
            rules,
            amount_boundary,
            amount_decimal,
            amount_scan,
        })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(VerifierRules::default())
    }

    pub fn rules(&self) -> &VerifierRules {
        &self.rules
    }

    /// Runs every check against the extracted document text.
    ///
    /// Errors are cumulative: a receipt missing both the tax id and the
    /// amount reports both. All four checks must pass; an amount match alone
    /// does not establish the recipient's identity.
    pub fn verify(&self, text: &str) -> Verification {
        if text.trim().is_empty() {
            return Verification {
                outcome: VerificationOutcome::Fail(vec![
                    "document empty or unreadable".to_string(),
                ]),
                payment_reference: None,
            };
        }

        let normalized = normalize(text);
        let mut reasons = Vec::new();

        if !self.check_recipient(&normalized) {
            reasons.push("recipient details not found".to_string());
        }
        if !normalized.contains(&self.rules.tax_id) {
            reasons.push(format!("recipient tax id not found: {}", self.rules.tax_id));
        }
        if !self.check_bank(&normalized) {
            reasons.push("recipient bank not found".to_string());
        }
        if let Some(reason) = self.check_amount(&normalized) {
            reasons.push(reason);
        }

        let payment_reference = extract_reference(&normalized);
        if let Some(reference) = &payment_reference {
            debug!(reference = %reference, "reference token found in receipt text");
        }

        let outcome = if reasons.is_empty() {
            VerificationOutcome::Pass
        } else {
            VerificationOutcome::Fail(reasons)
        };

        Verification {
            outcome,
            payment_reference,
        }
    }

    fn check_recipient(&self, normalized: &str) -> bool {
        self.rules
            .recipient_phrases
            .iter()
            .any(|phrase| normalized.contains(phrase.as_str()))
    }

    fn check_bank(&self, normalized: &str) -> bool {
        self.rules
            .bank_phrases
            .iter()
            .any(|phrase| normalized.contains(phrase.as_str()))
    }

    /// Returns the failure reason when the amount cannot be confirmed.
    fn check_amount(&self, normalized: &str) -> Option<String> {
        for literal in &self.rules.amount_literals {
            if normalized.contains(literal.as_str()) {
                debug!(literal = %literal, "amount matched by literal form");
                return None;
            }
        }

        // Canonical fallback: the digit sequence standing alone.
        if self.amount_boundary.is_match(normalized) || self.amount_decimal.is_match(normalized) {
            return None;
        }

        // Last resort is diagnostic only: collect the numbers that ARE there
        // so the rejection message tells the operator what the payer sent.
        let found = self.scan_plausible_amounts(normalized);
        let found = if found.is_empty() {
            "none".to_string()
        } else {
            found.join(", ")
        };
        Some(format!(
            "donation amount must be {}; found amounts: {}",
            self.rules.amount_display(),
            found
        ))
    }

    fn scan_plausible_amounts(&self, normalized: &str) -> Vec<String> {
        self.amount_scan
            .captures_iter(normalized)
            .filter_map(|caps| {
                let raw = caps[1].to_string();
                let value: f64 = raw.replace(',', ".").parse().ok()?;
                (value >= self.rules.scan_min && value <= self.rules.scan_max).then_some(raw)
            })
            .collect()
    }
}

/// Collapses the extracted text into one uppercase line: non-breaking spaces
/// and newlines become plain spaces, runs of whitespace collapse to one.
pub fn normalize(text: &str) -> String {
    let replaced = text.replace(['\u{00A0}', '\n', '\r'], " ");
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

//! Moderation Gate
//!
//! Blocks questions that mention violence, self-harm, illegal activity or
//! security circumvention before any retrieval or generation work happens.
//! Input only; generated output is not inspected.

use tracing::warn;

/// Static denylist
pub const BLOCKED_TERMS: &[&str] = &[
    // Security circumvention
    "hack", "bypass", "exploit",
    // Illegal activity
    "illegal", "scam", "laundering",
    // Violence
    "kill", "murder",
    // Self-harm
    "suicide", "self-harm",
];

/// Shown to the user when a question is rejected
pub const REJECTION_MESSAGE: &str =
    "I'm unable to process your request due to inappropriate language.";

/// Case-insensitive substring denylist
#[derive(Debug, Clone)]
pub struct ModerationGate {
    terms: Vec<String>,
}

impl ModerationGate {
    pub fn new() -> Self {
        Self::with_terms(BLOCKED_TERMS.iter().copied())
    }

    pub fn with_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// The first denylisted term found in `query`, if any
    pub fn blocked_term(&self, query: &str) -> Option<&str> {
        let query = query.to_lowercase();
        self.terms
            .iter()
            .find(|term| query.contains(term.as_str()))
            .map(String::as_str)
    }

    pub fn is_permitted(&self, query: &str) -> bool {
        match self.blocked_term(query) {
            Some(term) => {
                warn!(term, "Query rejected by moderation gate");
                false
            }
            None => true,
        }
    }
}

impl Default for ModerationGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permitted_financial_questions() {
        let gate = ModerationGate::new();
        let cases = vec![
            "What is the Employees Cost in Dec'20?",
            "How did revenue change between 2021 and 2022?",
            "explain the net profit margin",
        ];

        for c in cases {
            assert!(gate.is_permitted(c), "{}", c);
        }
    }

    #[test]
    fn test_blocked_terms() {
        let gate = ModerationGate::new();
        let cases = vec![
            "what about hacking the system",
            "How do I BYPASS the audit?",
            "money Laundering through subsidiaries",
            "is this a scam",
            "self-harm",
        ];

        for c in cases {
            assert!(!gate.is_permitted(c), "{}", c);
        }
    }

    #[test]
    fn test_substring_semantics() {
        let gate = ModerationGate::new();
        // Substring match, not word match: "skill" contains "kill".
        assert_eq!(gate.blocked_term("required skill set"), Some("kill"));
        assert_eq!(gate.blocked_term("revenue growth"), None);
    }

    #[test]
    fn test_custom_terms() {
        let gate = ModerationGate::with_terms(["Insider", ""]);
        assert!(!gate.is_permitted("insider trading profits"));
        assert!(gate.is_permitted("hack"));
    }
}

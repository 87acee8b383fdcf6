//! Reviewer verdict classification.

use serde::{Deserialize, Serialize};

/// How a reviewer message is classified as approval or feedback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Upper-cased content contains `APPROVE` anywhere. "I would NOT APPROVE
    /// this" and "DISAPPROVE" both count as approval.
    #[default]
    Substring,
    /// A standalone `APPROVE` word that is not directly preceded by `NOT`.
    StrictToken,
}

impl ApprovalPolicy {
    pub fn is_approval(&self, content: &str) -> bool {
        let upper = content.to_uppercase();
        match self {
            ApprovalPolicy::Substring => upper.contains("APPROVE"),
            ApprovalPolicy::StrictToken => {
                let words: Vec<&str> = upper
                    .split(|c: char| !c.is_alphanumeric() && c != '\'')
                    .filter(|w| !w.is_empty())
                    .collect();
                words.iter().enumerate().any(|(i, w)| {
                    *w == "APPROVE" && (i == 0 || !matches!(words[i - 1], "NOT" | "DON'T"))
                })
            }
        }
    }
}

impl std::str::FromStr for ApprovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" => Ok(ApprovalPolicy::Substring),
            "strict_token" | "strict-token" | "strict" => Ok(ApprovalPolicy::StrictToken),
            other => Err(format!("unknown approval policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_is_case_insensitive() {
        let p = ApprovalPolicy::Substring;
        assert!(p.is_approval("approve"));
        assert!(p.is_approval("Looks great. APPROVE."));
        assert!(!p.is_approval("Please shorten this."));
    }

    #[test]
    fn substring_counts_negations_and_disapprove() {
        let p = ApprovalPolicy::Substring;
        assert!(p.is_approval("I would NOT APPROVE this"));
        assert!(p.is_approval("DISAPPROVE"));
        assert!(p.is_approval("approved with minor nits"));
    }

    #[test]
    fn strict_token_rejects_negations_and_compounds() {
        let p = ApprovalPolicy::StrictToken;
        assert!(p.is_approval("APPROVE"));
        assert!(p.is_approval("Good work, approve."));
        assert!(!p.is_approval("I would NOT APPROVE this"));
        assert!(!p.is_approval("Don't approve yet"));
        assert!(!p.is_approval("DISAPPROVE"));
        assert!(!p.is_approval("approved"));
    }

    #[test]
    fn default_is_substring() {
        assert_eq!(ApprovalPolicy::default(), ApprovalPolicy::Substring);
        assert_eq!("strict".parse::<ApprovalPolicy>(), Ok(ApprovalPolicy::StrictToken));
        assert!("lenient".parse::<ApprovalPolicy>().is_err());
    }
}

//! Rater answers and their validation errors.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::Phase;

/// Valid range for hardness ratings, matching the stratum levels.
pub const HARDNESS_RANGE: RangeInclusive<u8> = 1..=4;

/// Valid range for quality-style ratings.
pub const QUALITY_RANGE: RangeInclusive<u8> = 1..=5;

/// Well-known score keys.
pub mod score_keys {
    /// Perceived case difficulty (data-quality phase).
    pub const HARDNESS: &str = "hardness";
    /// Reasoning-trace quality (data-quality phase).
    pub const COT_QUALITY: &str = "cot_quality";
    /// Reasoning-trace quality (CoT phase).
    pub const QUALITY: &str = "quality";
}

/// One rater's response to one case.
///
/// Scores map a rated key (a model label, or one of [`score_keys`]) to a
/// bounded numeric rating. Re-saving replaces the whole answer for that
/// case; there is no per-score merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Score per rated key.
    pub scores: BTreeMap<String, u8>,

    /// Optional free-text remark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// When this answer was recorded.
    pub saved_at: DateTime<Utc>,
}

impl Answer {
    /// Record an answer now.
    pub fn new(scores: BTreeMap<String, u8>, comment: Option<String>) -> Self {
        Self::at(scores, comment, Utc::now())
    }

    /// Record an answer with an explicit timestamp.
    pub fn at(scores: BTreeMap<String, u8>, comment: Option<String>, saved_at: DateTime<Utc>) -> Self {
        let comment = comment.filter(|c| !c.trim().is_empty());
        Self {
            scores,
            comment,
            saved_at,
        }
    }

    /// Score for a key, if recorded.
    pub fn score(&self, key: &str) -> Option<u8> {
        self.scores.get(key).copied()
    }
}

/// Why a submitted answer was rejected.
///
/// All variants are recoverable: the rater corrects the input and
/// resubmits. A rejected answer never advances the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("missing required score '{key}'")]
    MissingScore { key: String },

    #[error("score '{key}' must be between {min} and {max}, got {value}")]
    OutOfRange { key: String, value: u8, min: u8, max: u8 },

    #[error("unknown score key '{key}'")]
    UnknownKey { key: String },

    #[error("no case is active in the current phase")]
    NoActiveCase,

    #[error("this answer does not fit the {expected} phase")]
    PhaseMismatch { expected: Phase },
}

/// Check a score against its valid range.
pub fn check_score(key: &str, value: u8, range: &RangeInclusive<u8>) -> Result<(), AnswerError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(AnswerError::OutOfRange {
            key: key.to_string(),
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_comments_are_dropped() {
        let answer = Answer::new(BTreeMap::new(), Some("   ".to_string()));
        assert_eq!(answer.comment, None);

        let answer = Answer::new(BTreeMap::new(), Some("borderline case".to_string()));
        assert_eq!(answer.comment.as_deref(), Some("borderline case"));
    }

    #[test]
    fn score_lookup() {
        let mut scores = BTreeMap::new();
        scores.insert(score_keys::HARDNESS.to_string(), 3);
        let answer = Answer::new(scores, None);
        assert_eq!(answer.score("hardness"), Some(3));
        assert_eq!(answer.score("quality"), None);
    }

    #[test]
    fn range_check_bounds() {
        assert!(check_score("hardness", 1, &HARDNESS_RANGE).is_ok());
        assert!(check_score("hardness", 4, &HARDNESS_RANGE).is_ok());

        let err = check_score("hardness", 5, &HARDNESS_RANGE).unwrap_err();
        assert_eq!(
            err,
            AnswerError::OutOfRange {
                key: "hardness".to_string(),
                value: 5,
                min: 1,
                max: 4
            }
        );
        assert!(check_score("quality", 0, &QUALITY_RANGE).is_err());
        assert!(check_score("quality", 5, &QUALITY_RANGE).is_ok());
    }

    #[test]
    fn comment_is_omitted_from_json_when_absent() {
        let answer = Answer::new(BTreeMap::new(), None);
        let json = serde_json::to_value(&answer).unwrap();
        assert!(json.get("comment").is_none());
        assert!(json.get("saved_at").is_some());
    }
}

//! Candidate records and strata.
//!
//! A [`CandidateRecord`] is one normalized source row as produced by the
//! ingestion layer; the core treats it as read-only. A [`SelectedCase`] is
//! the lightweight, persisted promotion of a record into a phase's working
//! set — only the identifier and bookkeeping labels are stored, the full
//! text is re-joined against the corpus at render time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stratum level outside the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stratum must be between 1 and 4, got {0}")]
pub struct InvalidStratum(pub u8);

/// Difficulty stratum, one of the four levels used to balance sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stratum(u8);

impl TryFrom<u8> for Stratum {
    type Error = InvalidStratum;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Stratum::new(level).ok_or(InvalidStratum(level))
    }
}

impl From<Stratum> for u8 {
    fn from(stratum: Stratum) -> u8 {
        stratum.0
    }
}

impl Stratum {
    /// Lowest valid level.
    pub const MIN: u8 = 1;
    /// Highest valid level.
    pub const MAX: u8 = 4;

    /// Construct a stratum, rejecting levels outside 1..=4.
    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    /// The numeric level.
    pub fn level(self) -> u8 {
        self.0
    }

    /// All strata in ascending order.
    pub fn all() -> impl Iterator<Item = Stratum> {
        (Self::MIN..=Self::MAX).map(Stratum)
    }

    /// Parse a stratum from loosely-typed source data: a number, or a
    /// numeric string as older exports wrote it.
    pub fn from_value(value: &serde_json::Value) -> Option<Stratum> {
        let level = match value {
            serde_json::Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
            serde_json::Value::String(s) => s.trim().parse::<u8>().ok(),
            _ => None,
        }?;
        Stratum::new(level)
    }
}

impl fmt::Display for Stratum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One normalized annotation case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Identifier, unique within its dataset.
    pub id: String,

    /// Clinical indication / prompt context.
    pub indication: String,

    /// Source findings text.
    pub findings: String,

    /// Reference answer text.
    pub reference: String,

    /// Difficulty stratum, when the source row carried a usable label.
    pub stratum: Option<Stratum>,

    /// Rated system outputs, keyed by model label.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    /// Chain-of-thought / reasoning trace, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cot: Option<String>,
}

impl CandidateRecord {
    /// Output text for a model label, if present.
    pub fn output(&self, model: &str) -> Option<&str> {
        self.outputs.get(model).map(String::as_str)
    }

    /// True when every required model output is non-empty after trimming.
    pub fn has_complete_outputs(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|model| self.output(model).is_some_and(|text| !text.trim().is_empty()))
    }

    /// True when the reasoning trace is non-empty after trimming.
    pub fn has_cot(&self) -> bool {
        self.cot.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

/// A case promoted into a phase's fixed working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCase {
    /// Case identifier.
    pub id: String,

    /// Stratum carried over from the record at selection time.
    pub stratum: Option<Stratum>,

    /// Origin dataset, recorded for derived (CoT) entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl SelectedCase {
    /// Promote a record.
    pub fn from_record(record: &CandidateRecord) -> Self {
        Self {
            id: record.id.clone(),
            stratum: record.stratum,
            dataset: None,
        }
    }

    /// Tag the selection with its origin dataset.
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> CandidateRecord {
        CandidateRecord {
            id: id.to_string(),
            indication: "chest pain".to_string(),
            findings: "no acute findings".to_string(),
            reference: "normal study".to_string(),
            stratum: Stratum::new(2),
            outputs: BTreeMap::new(),
            cot: None,
        }
    }

    #[test]
    fn stratum_bounds() {
        assert!(Stratum::new(0).is_none());
        assert!(Stratum::new(5).is_none());
        assert_eq!(Stratum::new(3).unwrap().level(), 3);
        let levels: Vec<u8> = Stratum::all().map(Stratum::level).collect();
        assert_eq!(levels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn stratum_serializes_as_bare_number() {
        let json = serde_json::to_string(&Stratum::new(4).unwrap()).unwrap();
        assert_eq!(json, "4");
        let back: Stratum = serde_json::from_str("2").unwrap();
        assert_eq!(back.level(), 2);
        assert!(serde_json::from_str::<Stratum>("9").is_err());
        assert!(serde_json::from_str::<Stratum>("0").is_err());
    }

    #[test]
    fn complete_outputs_requires_non_blank_text() {
        let mut rec = record("c1");
        rec.outputs.insert("huatuo".to_string(), "an answer".to_string());
        rec.outputs.insert("m1".to_string(), "   ".to_string());

        let both = vec!["huatuo".to_string(), "m1".to_string()];
        assert!(!rec.has_complete_outputs(&both));

        rec.outputs.insert("m1".to_string(), "another answer".to_string());
        assert!(rec.has_complete_outputs(&both));

        let missing = vec!["medreason".to_string()];
        assert!(!rec.has_complete_outputs(&missing));
    }

    #[test]
    fn cot_presence_trims_whitespace() {
        let mut rec = record("c1");
        assert!(!rec.has_cot());
        rec.cot = Some("  \n".to_string());
        assert!(!rec.has_cot());
        rec.cot = Some("step 1: read the findings".to_string());
        assert!(rec.has_cot());
    }

    #[test]
    fn selected_case_keeps_stratum_and_dataset() {
        let rec = record("c9");
        let case = SelectedCase::from_record(&rec).with_dataset("medqa");
        assert_eq!(case.id, "c9");
        assert_eq!(case.stratum, Stratum::new(2));
        assert_eq!(case.dataset.as_deref(), Some("medqa"));
    }
}

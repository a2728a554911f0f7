//! Reproducible per-case blinding of model outputs.
//!
//! Each (user, dataset, case) triple gets its own permutation of the
//! rated model labels, derived from a seeded stream so repeat visits to
//! the same case always present outputs in the same disguised order.
//! The permutation is never persisted; it is recomputed at render time.

use crate::core::rng::{keys, shuffle, SeededRng};
use crate::domain::record::CandidateRecord;

/// The blinded permutation of model labels for one case.
///
/// Index `i` of the permutation is shown to the rater as letter `A + i`.
/// The renderer only ever sees letters and output text; resolving a
/// letter back to its model label stays on this side of the seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindView {
    order: Vec<String>,
}

/// Permute `labels` for one (user, dataset, case) scope.
///
/// Pure and idempotent: identical arguments give an identical permutation,
/// and different case ids draw from unrelated streams.
pub fn blind_order(user_id: &str, dataset: &str, case_id: &str, labels: &[String]) -> Vec<String> {
    let mut order: Vec<String> = labels.to_vec();
    let key = keys::blind_order(user_id, dataset, case_id);
    shuffle(&mut order, &mut SeededRng::from_key(&key));
    order
}

/// Display letter for a permutation slot.
pub fn display_letter(index: usize) -> char {
    debug_assert!(index < 26, "more rated labels than letters");
    (b'A' + index as u8) as char
}

impl BlindView {
    /// Build the blinded view for one case.
    pub fn for_case(user_id: &str, dataset: &str, case_id: &str, labels: &[String]) -> Self {
        Self {
            order: blind_order(user_id, dataset, case_id, labels),
        }
    }

    /// Number of blinded slots.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no labels are configured.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Model label behind a display letter.
    pub fn model_for_letter(&self, letter: char) -> Option<&str> {
        let upper = letter.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return None;
        }
        let index = (upper as u8 - b'A') as usize;
        self.order.get(index).map(String::as_str)
    }

    /// Display letter currently assigned to a model label.
    pub fn letter_for_model(&self, model: &str) -> Option<char> {
        self.order.iter().position(|m| m == model).map(display_letter)
    }

    /// Letters in presentation order.
    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        (0..self.order.len()).map(display_letter)
    }

    /// The record's outputs in blinded order, paired with their letters.
    ///
    /// A label with no output text in the record presents as empty; the
    /// quality filter keeps such records out of rated selections.
    pub fn presented<'a>(&'a self, record: &'a CandidateRecord) -> Vec<(char, &'a str)> {
        self.order
            .iter()
            .enumerate()
            .map(|(i, model)| (display_letter(i), record.output(model).unwrap_or("")))
            .collect()
    }
}

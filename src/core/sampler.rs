//! Stratified case selection and deterministic selection repair.
//!
//! Selection picks a quota of cases per difficulty stratum. Within each
//! stratum candidates are sorted by id (byte order) before the quota is
//! taken, so two runs over the same pool always pick the same records.
//! Presentation order is a separate step: callers shuffle the returned
//! list under their own seed, never this module.
//!
//! Repair patches a previously persisted selection whose records have
//! since gone missing or incomplete, replacing defective slots in place
//! from a seeded stream so the patched list is itself reproducible.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::core::rng::SeededRng;
use crate::domain::record::{CandidateRecord, SelectedCase, Stratum};

/// Select up to `quota[stratum]` qualifying records per stratum.
///
/// Records failing `eligible` or carrying no stratum label are skipped.
/// Strata are filled in ascending order; a stratum with fewer qualifying
/// candidates than its quota is under-filled silently.
pub fn stratified_select<F>(
    pool: &[CandidateRecord],
    quotas: &BTreeMap<Stratum, usize>,
    eligible: F,
) -> Vec<SelectedCase>
where
    F: Fn(&CandidateRecord) -> bool,
{
    let mut by_stratum: BTreeMap<Stratum, Vec<&CandidateRecord>> = BTreeMap::new();
    for record in pool {
        if !eligible(record) {
            continue;
        }
        let Some(stratum) = record.stratum else {
            continue;
        };
        by_stratum.entry(stratum).or_default().push(record);
    }

    let mut selection = Vec::new();
    for (stratum, quota) in quotas {
        let mut group = by_stratum.remove(stratum).unwrap_or_default();
        group.sort_by(|a, b| a.id.cmp(&b.id));
        if group.len() < *quota {
            debug!(
                stratum = %stratum,
                available = group.len(),
                quota,
                "stratum under-filled"
            );
        }
        selection.extend(group.into_iter().take(*quota).map(SelectedCase::from_record));
    }
    selection
}

/// A record qualifies for data-quality rating when it carries a stratum
/// label and a non-empty reasoning trace.
pub fn qualifies_for_data_quality(record: &CandidateRecord) -> bool {
    record.stratum.is_some() && record.has_cot()
}

/// A record qualifies for model evaluation when it carries a stratum label
/// and a non-blank output for every required model.
pub fn qualifies_for_model_eval(record: &CandidateRecord, required: &[String]) -> bool {
    record.stratum.is_some() && record.has_complete_outputs(required)
}

/// Result of one repair pass over a persisted selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairOutcome {
    /// `(replaced id, replacement id)` pairs in slot order.
    pub replaced: Vec<(String, String)>,

    /// Defective ids left in place after the replacement pool ran out.
    pub unrepaired: Vec<String>,
}

impl RepairOutcome {
    /// True when the selection needed no patching.
    pub fn is_clean(&self) -> bool {
        self.replaced.is_empty() && self.unrepaired.is_empty()
    }
}

/// Replace defective slots of a persisted selection in place.
///
/// A slot is defective when its id is no longer in the pool or its record
/// fails `qualifies`. Replacements are drawn from the qualifying records
/// not already selected, sorted by id, one draw of `rng` per defective
/// slot, so the same seed always patches the same way. The discarded
/// case's recorded answer, if any, is removed along with it. When the
/// replacement pool runs out the remaining defective slots are left as-is.
pub fn repair_selection<A, F>(
    selection: &mut [SelectedCase],
    answers: &mut BTreeMap<String, A>,
    pool: &[CandidateRecord],
    qualifies: F,
    rng: &mut SeededRng,
) -> RepairOutcome
where
    F: Fn(&CandidateRecord) -> bool,
{
    let index: HashMap<&str, &CandidateRecord> =
        pool.iter().map(|record| (record.id.as_str(), record)).collect();
    let selected: HashSet<&str> = selection.iter().map(|case| case.id.as_str()).collect();

    let mut replacements: Vec<&CandidateRecord> = pool
        .iter()
        .filter(|record| qualifies(record) && !selected.contains(record.id.as_str()))
        .collect();
    replacements.sort_by(|a, b| a.id.cmp(&b.id));

    let mut outcome = RepairOutcome::default();
    for slot in selection.iter_mut() {
        let defective = match index.get(slot.id.as_str()) {
            Some(record) => !qualifies(record),
            None => true,
        };
        if !defective {
            continue;
        }

        if replacements.is_empty() {
            outcome.unrepaired.push(slot.id.clone());
            continue;
        }

        let draw = rng.next_index(replacements.len());
        let chosen = replacements.remove(draw);
        let old_id = std::mem::replace(&mut slot.id, chosen.id.clone());
        slot.stratum = chosen.stratum;

        if answers.remove(&old_id).is_some() {
            warn!(case = %old_id, replacement = %chosen.id, "replaced case had a recorded answer; discarding it");
        }
        debug!(case = %old_id, replacement = %chosen.id, "repaired defective case");
        outcome.replaced.push((old_id, chosen.id.clone()));
    }

    if !outcome.unrepaired.is_empty() {
        warn!(
            remaining = outcome.unrepaired.len(),
            "replacement pool exhausted; defective cases left in place"
        );
    }
    outcome
}

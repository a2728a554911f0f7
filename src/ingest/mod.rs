//! Dataset ingestion: normalized record loading.
//!
//! Source files are JSON arrays of case rows, one file per dataset, named
//! `<dataset>.json` under the data directory. Historical exports named the
//! same logical field several ways; each field resolves through an ordered
//! alias list exactly once, here, and nowhere downstream.
//!
//! The loaded [`Corpus`] is immutable for the lifetime of a session: the
//! per-dataset record tables, an id index for render-time joins, and a
//! chain-of-thought index for the CoT phase.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::plan::EvaluationPlan;
use crate::domain::record::{CandidateRecord, Stratum};

/// Accepted source names for the case identifier.
pub const ID_ALIASES: &[&str] = &["id", "case_id", "accession"];
/// Accepted source names for the clinical indication.
pub const INDICATION_ALIASES: &[&str] = &["indication", "clinical_indication", "history"];
/// Accepted source names for the findings text.
pub const FINDINGS_ALIASES: &[&str] = &["findings", "report", "source_text"];
/// Accepted source names for the reference answer.
pub const REFERENCE_ALIASES: &[&str] = &["reference", "reference_answer", "ground_truth", "answer"];
/// Accepted source names for the difficulty stratum.
pub const STRATUM_ALIASES: &[&str] = &["stratum", "hardness", "system_hardness", "difficulty", "level"];
/// Accepted source names for the reasoning trace.
pub const COT_ALIASES: &[&str] = &["cot", "chain_of_thought", "reasoning"];

/// Ingestion failures.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must hold a JSON array of case records")]
    NotAnArray { path: PathBuf },

    #[error("no dataset produced any usable records")]
    EmptyCorpus,
}

/// One dataset's normalized records.
#[derive(Debug)]
pub struct DatasetTable {
    pub name: String,
    pub path: PathBuf,
    pub records: Vec<CandidateRecord>,
    /// Rows dropped during normalization (no usable id, or duplicate id).
    pub rows_skipped: usize,
    /// First 12 hex chars of the source file's sha256, for drift checks.
    pub fingerprint: String,
    index: HashMap<String, usize>,
}

impl DatasetTable {
    /// Record by id.
    pub fn record(&self, id: &str) -> Option<&CandidateRecord> {
        self.index.get(id).map(|i| &self.records[*i])
    }
}

/// All loaded datasets plus the chain-of-thought index.
#[derive(Debug)]
pub struct Corpus {
    tables: Vec<DatasetTable>,
    by_name: HashMap<String, usize>,
    cot_index: HashMap<String, String>,
}

impl Corpus {
    /// Table for a dataset, if loaded.
    pub fn dataset(&self, name: &str) -> Option<&DatasetTable> {
        self.by_name.get(name).map(|i| &self.tables[*i])
    }

    /// Records for a dataset; empty for unknown names.
    pub fn records(&self, name: &str) -> &[CandidateRecord] {
        self.dataset(name).map(|t| t.records.as_slice()).unwrap_or(&[])
    }

    /// Record lookup for render-time joins.
    pub fn record(&self, dataset: &str, id: &str) -> Option<&CandidateRecord> {
        self.dataset(dataset).and_then(|t| t.record(id))
    }

    /// Chain-of-thought text for a case id.
    pub fn cot_for(&self, id: &str) -> Option<&str> {
        self.cot_index.get(id).map(String::as_str)
    }

    /// Loaded tables in load order.
    pub fn tables(&self) -> &[DatasetTable] {
        &self.tables
    }

    /// Total records across all datasets.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }

    /// True when nothing usable was loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load every dataset the plan needs from `data_dir`.
///
/// The data-quality source loads first when it is not already among the
/// model-evaluation datasets, so its reasoning traces win first-occurrence
/// in the chain-of-thought index. A dedicated `cot_file` overrides that
/// index entirely.
pub fn load_corpus(
    plan: &EvaluationPlan,
    data_dir: &Path,
    cot_file: Option<&Path>,
) -> Result<Corpus, IngestError> {
    let mut names: Vec<&str> = Vec::new();
    if !plan.datasets.contains(&plan.data_quality_dataset) {
        names.push(plan.data_quality_dataset.as_str());
    }
    names.extend(plan.datasets.iter().map(String::as_str));

    let mut corpus = Corpus {
        tables: Vec::new(),
        by_name: HashMap::new(),
        cot_index: HashMap::new(),
    };

    for name in names {
        let path = data_dir.join(format!("{name}.json"));
        let table = match load_dataset(name, &path, &plan.models) {
            Ok(table) => table,
            Err(IngestError::Io { path, source }) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(dataset = name, path = %path.display(), "dataset file missing; continuing without it");
                DatasetTable {
                    name: name.to_string(),
                    path,
                    records: Vec::new(),
                    rows_skipped: 0,
                    fingerprint: String::new(),
                    index: HashMap::new(),
                }
            }
            Err(err) => return Err(err),
        };

        if table.records.is_empty() {
            warn!(dataset = name, "dataset is empty after normalization");
        } else {
            info!(
                dataset = name,
                records = table.records.len(),
                skipped = table.rows_skipped,
                fingerprint = %table.fingerprint,
                "dataset loaded"
            );
        }

        corpus.by_name.insert(table.name.clone(), corpus.tables.len());
        corpus.tables.push(table);
    }

    match cot_file {
        Some(path) => corpus.cot_index = load_cot_file(path)?,
        None => {
            for table in &corpus.tables {
                for record in &table.records {
                    if let Some(cot) = record.cot.as_deref() {
                        corpus
                            .cot_index
                            .entry(record.id.clone())
                            .or_insert_with(|| cot.to_string());
                    }
                }
            }
        }
    }

    if corpus.is_empty() {
        return Err(IngestError::EmptyCorpus);
    }
    Ok(corpus)
}

/// Dataset names present in the data directory (`*.json` stems, sorted).
pub fn discover_datasets(data_dir: &Path) -> Vec<String> {
    let pattern = data_dir.join("*.json").to_string_lossy().into_owned();
    let mut names: Vec<String> = glob::glob(&pattern)
        .map(|paths| {
            paths
                .filter_map(Result::ok)
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn load_dataset(name: &str, path: &Path, models: &[String]) -> Result<DatasetTable, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fingerprint = fingerprint(&bytes);

    let parsed: Value = serde_json::from_slice(&bytes).map_err(|source| IngestError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = parsed.as_array().ok_or_else(|| IngestError::NotAnArray {
        path: path.to_path_buf(),
    })?;

    let mut table = DatasetTable {
        name: name.to_string(),
        path: path.to_path_buf(),
        records: Vec::with_capacity(rows.len()),
        rows_skipped: 0,
        fingerprint,
        index: HashMap::new(),
    };

    for row in rows {
        let Some(record) = normalize_record(row, models) else {
            table.rows_skipped += 1;
            continue;
        };
        if table.index.contains_key(&record.id) {
            debug!(dataset = name, id = %record.id, "duplicate id; keeping first occurrence");
            table.rows_skipped += 1;
            continue;
        }
        table.index.insert(record.id.clone(), table.records.len());
        table.records.push(record);
    }

    Ok(table)
}

/// Normalize one source row, or `None` when it has no usable id.
pub fn normalize_record(row: &Value, models: &[String]) -> Option<CandidateRecord> {
    let fields = row.as_object()?;

    let id = first_text(fields, ID_ALIASES)?;

    let mut outputs = BTreeMap::new();
    for model in models {
        let direct = fields.get(model.as_str());
        let suffixed_key = format!("{model}_output");
        let suffixed = fields.get(suffixed_key.as_str());
        if let Some(text) = direct.or(suffixed).and_then(non_blank_text) {
            outputs.insert(model.clone(), text);
        }
    }

    Some(CandidateRecord {
        id,
        indication: first_text(fields, INDICATION_ALIASES).unwrap_or_default(),
        findings: first_text(fields, FINDINGS_ALIASES).unwrap_or_default(),
        reference: first_text(fields, REFERENCE_ALIASES).unwrap_or_default(),
        stratum: first_value(fields, STRATUM_ALIASES).and_then(Stratum::from_value),
        outputs,
        cot: first_text(fields, COT_ALIASES),
    })
}

fn load_cot_file(path: &Path) -> Result<HashMap<String, String>, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Value = serde_json::from_slice(&bytes).map_err(|source| IngestError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut index = HashMap::new();
    match &parsed {
        // { "<case id>": "<reasoning>" }
        Value::Object(map) => {
            for (id, text) in map {
                if let Some(cot) = non_blank_text(text) {
                    index.insert(id.clone(), cot);
                }
            }
        }
        // [ { "id": ..., "cot": ... }, ... ]
        Value::Array(rows) => {
            for row in rows {
                let Some(fields) = row.as_object() else { continue };
                let Some(id) = first_text(fields, ID_ALIASES) else { continue };
                if let Some(cot) = first_text(fields, COT_ALIASES) {
                    index.entry(id).or_insert(cot);
                }
            }
        }
        _ => {
            return Err(IngestError::NotAnArray {
                path: path.to_path_buf(),
            })
        }
    }
    Ok(index)
}

fn first_value<'a>(
    fields: &'a serde_json::Map<String, Value>,
    aliases: &[&str],
) -> Option<&'a Value> {
    aliases.iter().find_map(|key| fields.get(*key))
}

fn first_text(fields: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| fields.get(*key).and_then(non_blank_text))
}

/// Trimmed text content of a JSON value; numbers stringify, blanks drop.
fn non_blank_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())[..12].to_string()
}

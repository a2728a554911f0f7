//! Evaluation plan definitions and loading.
//!
//! A plan is defined in YAML and fixes everything a study holds constant
//! across raters: the ordered dataset list, the rated model labels, the
//! per-stratum quotas and the autosave cadence. Per-rater variation
//! (which cases, in which order, under which blinding) comes entirely
//! from the seeded streams, never from the plan.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::record::Stratum;

/// A complete evaluation plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationPlan {
    /// Study name (used in CLI output and export snapshots)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Ordered dataset keys for the model-evaluation phase
    pub datasets: Vec<String>,

    /// Dataset feeding the data-quality phase
    pub data_quality_dataset: String,

    /// Rated model labels, in canonical (unblinded) order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    /// Cases to select per stratum
    #[serde(default = "default_quotas")]
    pub quotas: BTreeMap<Stratum, usize>,

    /// Seconds between periodic background saves (0 disables the timer)
    #[serde(default = "default_autosave_seconds")]
    pub autosave_seconds: u64,
}

fn default_models() -> Vec<String> {
    [
        "huatuo",
        "m1",
        "medreason",
        "qwen8b_zs",
        "qwen8b_nocot",
        "qwen8b_sft",
        "qwen8b_rl",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_quotas() -> BTreeMap<Stratum, usize> {
    Stratum::all().map(|s| (s, 25)).collect()
}

fn default_autosave_seconds() -> u64 {
    60
}

impl EvaluationPlan {
    /// Load a plan from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a plan from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse plan YAML")
    }

    /// Validate the plan definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Plan name cannot be empty");
        }

        if self.datasets.is_empty() {
            anyhow::bail!("Plan must list at least one dataset");
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            if dataset.is_empty() {
                anyhow::bail!("Dataset {} has an empty name", i);
            }
            if self.datasets[..i].contains(dataset) {
                anyhow::bail!("Dataset '{}' is listed twice", dataset);
            }
        }

        if self.data_quality_dataset.is_empty() {
            anyhow::bail!("Plan must name a data-quality dataset");
        }

        if self.models.is_empty() {
            anyhow::bail!("Plan must list at least one rated model");
        }
        if self.models.len() > 26 {
            anyhow::bail!("At most 26 rated models can be lettered A-Z");
        }
        for (i, model) in self.models.iter().enumerate() {
            if model.is_empty() {
                anyhow::bail!("Model {} has an empty label", i);
            }
            if self.models[..i].contains(model) {
                anyhow::bail!("Model '{}' is listed twice", model);
            }
        }

        if self.quotas.is_empty() {
            anyhow::bail!("Plan must set at least one stratum quota");
        }

        Ok(())
    }

    /// Position of a dataset in the configured order
    pub fn dataset_index(&self, dataset: &str) -> Option<usize> {
        self.datasets.iter().position(|d| d == dataset)
    }

    /// Autosave interval, if enabled
    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_seconds > 0).then(|| Duration::from_secs(self.autosave_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PLAN_YAML: &str = r#"
name: pilot
description: Pilot rating round

datasets:
  - medqa
  - pubmedqa

data_quality_dataset: medqa

quotas:
  1: 10
  2: 10
  3: 5
  4: 5

autosave_seconds: 30
"#;

    #[test]
    fn test_plan_parsing() {
        let plan = EvaluationPlan::from_yaml(TEST_PLAN_YAML).unwrap();

        assert_eq!(plan.name, "pilot");
        assert_eq!(plan.datasets, vec!["medqa", "pubmedqa"]);
        assert_eq!(plan.data_quality_dataset, "medqa");
        assert_eq!(plan.models.len(), 7);
        assert_eq!(plan.quotas[&Stratum::new(3).unwrap()], 5);
        assert_eq!(plan.autosave_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_plan_defaults() {
        let plan = EvaluationPlan::from_yaml(
            "name: tiny\ndatasets: [medqa]\ndata_quality_dataset: medqa\n",
        )
        .unwrap();
        assert_eq!(plan.models[0], "huatuo");
        assert_eq!(plan.models[6], "qwen8b_rl");
        assert_eq!(plan.quotas.len(), 4);
        assert!(plan.quotas.values().all(|q| *q == 25));
        assert_eq!(plan.autosave_seconds, 60);
    }

    #[test]
    fn test_plan_validation() {
        let plan = EvaluationPlan::from_yaml(TEST_PLAN_YAML).unwrap();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_duplicate_dataset_rejected() {
        let plan = EvaluationPlan::from_yaml(
            "name: dup\ndatasets: [medqa, medqa]\ndata_quality_dataset: medqa\n",
        )
        .unwrap();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let mut plan = EvaluationPlan::from_yaml(TEST_PLAN_YAML).unwrap();
        plan.models = vec!["m1".to_string(), "m1".to_string()];
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_autosave_can_be_disabled() {
        let mut plan = EvaluationPlan::from_yaml(TEST_PLAN_YAML).unwrap();
        plan.autosave_seconds = 0;
        assert_eq!(plan.autosave_interval(), None);
    }

    #[test]
    fn test_dataset_index() {
        let plan = EvaluationPlan::from_yaml(TEST_PLAN_YAML).unwrap();
        assert_eq!(plan.dataset_index("medqa"), Some(0));
        assert_eq!(plan.dataset_index("pubmedqa"), Some(1));
        assert_eq!(plan.dataset_index("nonesuch"), None);
    }
}

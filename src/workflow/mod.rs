//! Workflow definitions - the static step lists runs are created from.
//!
//! Definitions are read once, when a run's steps are initialized. After that
//! the run owns its own copy and later edits to the definition do not leak in.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Step, StepType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_total_time: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Explicit position; defaults to list order when omitted
    #[serde(default)]
    pub step_number: Option<u32>,
    pub tool_name: String,
    /// What to do in the tool (e.g. "Generate a logo")
    pub tool_action: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(rename = "type", default)]
    pub step_type: StepType,
    #[serde(default)]
    pub estimated_time: Option<String>,
}

impl WorkflowDefinition {
    /// Load a definition from a `.yaml`, `.yml` or `.json` file
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        let definition: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse workflow JSON: {}", path.display()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse workflow YAML: {}", path.display()))?,
            _ => bail!(
                "Unsupported workflow file extension: {} (expected .json, .yaml or .yml)",
                path.display()
            ),
        };

        definition.validate()?;
        Ok(definition)
    }

    /// Reject empty definitions and duplicate step numbers
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("Workflow id must not be empty");
        }
        if self.steps.is_empty() {
            bail!("Workflow '{}' has no steps", self.id);
        }

        let mut seen = HashSet::new();
        for number in self.step_numbers() {
            if number == 0 {
                bail!("Workflow '{}' has a step numbered 0 (numbers are 1-based)", self.id);
            }
            if !seen.insert(number) {
                bail!("Workflow '{}' has duplicate step number {}", self.id, number);
            }
        }
        Ok(())
    }

    fn step_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| s.step_number.unwrap_or(i as u32 + 1))
    }

    /// Materialize pending run steps, ordered by step number
    pub fn build_steps(&self, run_id: Uuid) -> Vec<Step> {
        let mut steps: Vec<Step> = self
            .steps
            .iter()
            .zip(self.step_numbers())
            .map(|(def, number)| {
                let mut step = Step::new(run_id, number, def.title());
                step.description = def.details.clone();
                step.step_type = def.step_type;
                step.tool_name = Some(def.tool_name.clone());
                step.estimated_time = def.estimated_time.clone();
                step
            })
            .collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }
}

impl WorkflowStep {
    /// "Tool: action" as shown on the checklist
    pub fn title(&self) -> String {
        format!("{}: {}", self.tool_name, self.tool_action)
    }
}

//! Execution log parsing and validation.
//!
//! The execution log is the external input format produced by agent
//! harnesses. It is validated here and immediately converted into a pack
//! manifest; the raw log is never stored.

use crate::error::{CtxError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

/// A raw agent execution record before conversion to a pack manifest.
///
/// Unknown JSON fields are rejected; missing required fields are collected
/// and reported together by [`ExecutionLog::validate`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionLog {
    pub model: LogModel,
    pub system_prompt: String,
    pub prompts: Vec<LogPrompt>,
    pub inputs: Vec<LogInput>,
    pub steps: Vec<LogStep>,
    pub outputs: Vec<LogOutput>,
    pub environment: LogEnvironment,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogModel {
    pub identifier: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogPrompt {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogInput {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogStep {
    pub index: u32,
    /// Step kind tag, e.g. "tool_call".
    #[serde(rename = "type")]
    pub step_type: String,
    pub tool: String,
    pub parameters: Map<String, Value>,
    pub output: String,
    pub deterministic: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogOutput {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogEnvironment {
    pub os: String,
    pub runtime: String,
    pub tool_versions: std::collections::BTreeMap<String, String>,
}

impl ExecutionLog {
    /// Parses and validates an execution log from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_slice(&data)
    }

    /// Parses and validates an execution log from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns a decode error for unknown fields or type mismatches, and
    /// `InvalidLog` enumerating every missing required field.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let log: ExecutionLog = serde_json::from_slice(data)?;
        log.validate()?;
        Ok(log)
    }

    /// Checks required fields, collecting every violation before failing.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.model.identifier.is_empty() {
            missing.push("model.identifier".to_string());
        }
        if self.system_prompt.is_empty() {
            missing.push("system_prompt".to_string());
        }
        if self.environment.os.is_empty() {
            missing.push("environment.os".to_string());
        }
        if self.environment.runtime.is_empty() {
            missing.push("environment.runtime".to_string());
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.tool.is_empty() {
                missing.push(format!("steps[{}].tool", i));
            }
            if step.step_type.is_empty() {
                missing.push(format!("steps[{}].type", i));
            }
        }

        for (i, output) in self.outputs.iter().enumerate() {
            if output.name.is_empty() {
                missing.push(format!("outputs[{}].name", i));
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CtxError::InvalidLog(missing))
        }
    }
}

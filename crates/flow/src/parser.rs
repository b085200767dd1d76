// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow document parsing (JSON and YAML)

use crate::binding::HandlerBinding;
use crate::config::FlowConfig;
use crate::state::StateDef;
use crate::transition::TransitionDef;
use crate::validate::{self, ValidateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Flow document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

/// Errors that can occur while loading a flow document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid flow: {0}")]
    Invalid(#[from] ValidateError),
}

/// Raw declarative flow document, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlowDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    /// Default pauseability for states without their own setting.
    #[serde(default)]
    pub pauseable: Option<bool>,
    #[serde(default)]
    pub default_timeout: Option<i64>,
    #[serde(default)]
    pub auto_resume: bool,
    #[serde(default)]
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
    #[serde(default)]
    pub functions: Vec<HandlerBinding>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Parse a flow from JSON content (convenience wrapper)
pub fn parse_flow(content: &str) -> Result<FlowConfig, ParseError> {
    parse_flow_with_format(content, Format::Json)
}

/// Parse a flow from the given content in the specified format
pub fn parse_flow_with_format(content: &str, format: Format) -> Result<FlowConfig, ParseError> {
    let doc: FlowDocument = match format {
        Format::Json => serde_json::from_str(content)?,
        Format::Yaml => serde_yaml::from_str(content)?,
    };

    let config = validate::build_config(doc)?;
    for warning in &config.warnings {
        tracing::warn!(flow = %config.name, "{}", warning);
    }
    Ok(config)
}

/// Load a flow from a file, picking the format from the extension
/// (`.yaml`/`.yml` parse as YAML, everything else as JSON).
pub fn load_flow(path: &Path) -> Result<FlowConfig, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => Format::Json,
    };

    parse_flow_with_format(&content, format)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;

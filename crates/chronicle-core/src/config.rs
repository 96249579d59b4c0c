use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub transcript: TranscriptConfig,
    pub tools: ToolPatternConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcript: TranscriptConfig::default(),
            tools: ToolPatternConfig::default(),
            storage: StorageConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Tool names that never get a transcript entry.
    pub hidden_tools: Vec<String>,
    /// Pseudo-tool whose `intent` argument updates the intent badge.
    pub intent_tool: String,
    /// Characters kept in the rolling live-status preview.
    pub preview_chars: usize,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            hidden_tools: vec![DEFAULT_INTENT_TOOL.to_string()],
            intent_tool: DEFAULT_INTENT_TOOL.to_string(),
            preview_chars: 120,
        }
    }
}

pub const DEFAULT_INTENT_TOOL: &str = "report_intent";

/// Regex patterns, matched against the tool name, that pick a tool's class.
/// Checked in the order shell, file edit, file read; no match is generic.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPatternConfig {
    pub shell: Vec<String>,
    pub file_edit: Vec<String>,
    pub file_read: Vec<String>,
}

impl Default for ToolPatternConfig {
    fn default() -> Self {
        Self {
            shell: vec![
                r"^(bash|sh|shell|zsh|powershell|pwsh)$".to_string(),
                r"^(run|exec|execute)_(command|shell|terminal)$".to_string(),
                r"^(read|write|stop)_bash$".to_string(),
            ],
            file_edit: vec![
                r"^(edit|write|create|delete|multi_edit)$".to_string(),
                r"^(edit|write|create|delete)_file$".to_string(),
                r"^str_replace(_editor|_based_edit_tool)?$".to_string(),
                r"^apply_patch$".to_string(),
            ],
            file_read: vec![
                r"^(view|read|cat|ls|glob|grep|search|find)$".to_string(),
                r"^(read|view)_file$".to_string(),
                r"^list_(dir|directory|files)$".to_string(),
            ],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for session logs. `None` lets the binary pick a platform default.
    pub data_dir: Option<PathBuf>,
    pub rules_file: Option<PathBuf>,
    /// Oldest events beyond this count are dropped from a session log.
    pub max_log_events: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            rules_file: None,
            max_log_events: 5_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub default_model: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: None,
        }
    }
}

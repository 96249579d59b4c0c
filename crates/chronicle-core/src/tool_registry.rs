use std::collections::HashSet;

use regex::RegexSet;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ToolPatternConfig;
use crate::config::TranscriptConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolClass {
    Shell,
    FileEdit,
    FileRead,
    Generic,
}

impl ToolClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::FileEdit => "file-edit",
            Self::FileRead => "file-read",
            Self::Generic => "generic",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {class} tool pattern: {source}")]
    InvalidPattern {
        class: &'static str,
        #[source]
        source: regex::Error,
    },
}

const TITLE_ARGUMENT_MAX_CHARS: usize = 80;
const PATH_ARGUMENTS: [&str; 4] = ["path", "file_path", "filePath", "file"];

/// Name-based tool classification plus the hidden/intent tool sets.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    shell: RegexSet,
    file_edit: RegexSet,
    file_read: RegexSet,
    hidden: HashSet<String>,
    intent_tool: String,
}

impl ToolRegistry {
    pub fn new(patterns: &ToolPatternConfig, transcript: &TranscriptConfig) -> Result<Self, ConfigError> {
        let compile = |class: &'static str, patterns: &[String]| {
            RegexSet::new(patterns).map_err(|source| ConfigError::InvalidPattern { class, source })
        };
        Ok(Self {
            shell: compile("shell", &patterns.shell)?,
            file_edit: compile("file_edit", &patterns.file_edit)?,
            file_read: compile("file_read", &patterns.file_read)?,
            hidden: transcript.hidden_tools.iter().cloned().collect(),
            intent_tool: transcript.intent_tool.clone(),
        })
    }

    pub fn classify(&self, tool_name: &str) -> ToolClass {
        let name = tool_name.trim();
        if self.shell.is_match(name) {
            ToolClass::Shell
        } else if self.file_edit.is_match(name) {
            ToolClass::FileEdit
        } else if self.file_read.is_match(name) {
            ToolClass::FileRead
        } else {
            ToolClass::Generic
        }
    }

    pub fn is_hidden(&self, tool_name: &str) -> bool {
        self.hidden.contains(tool_name) || self.is_intent_tool(tool_name)
    }

    pub fn is_intent_tool(&self, tool_name: &str) -> bool {
        !self.intent_tool.is_empty() && tool_name == self.intent_tool
    }

    /// Human title for a tool call: the class's primary argument, else a short
    /// string argument, else the tool name.
    pub fn title(&self, class: ToolClass, tool_name: &str, arguments: &Value) -> String {
        let primary = match class {
            ToolClass::Shell => string_argument(arguments, "command"),
            ToolClass::FileEdit | ToolClass::FileRead => PATH_ARGUMENTS
                .iter()
                .find_map(|key| string_argument(arguments, key)),
            ToolClass::Generic => string_argument(arguments, "description"),
        };
        primary
            .or_else(|| first_short_string(arguments))
            .map(|title| title.trim().to_string())
            .unwrap_or_else(|| tool_name.to_string())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(&ToolPatternConfig::default(), &TranscriptConfig::default())
            .unwrap_or_else(|err| unreachable!("built-in tool patterns are valid: {err}"))
    }
}

fn string_argument<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn first_short_string(arguments: &Value) -> Option<&str> {
    arguments.as_object()?.values().find_map(|value| {
        value.as_str().filter(|text| {
            let text = text.trim();
            !text.is_empty()
                && !text.contains('\n')
                && text.chars().count() <= TITLE_ARGUMENT_MAX_CHARS
        })
    })
}

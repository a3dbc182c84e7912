//! Suite definition parsing and validation.
//!
//! Suites are TOML files naming an agent directory, suite-level execution
//! defaults, and an ordered list of test prompts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// A parsed suite file: defaults plus the ordered test list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteFile {
    /// Suite name; becomes a results directory component.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Working directory for every agent invocation.
    pub agent_dir: PathBuf,
    /// Turn limit for attempt turns unless a test overrides it.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Comma-separated tool allowlist passed through to the agent CLI.
    #[serde(default)]
    pub allowed_tools: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

/// One test case: identifier, prompt, optional overrides.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TestSpec {
    /// Unique within the suite; becomes the result file name.
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

fn default_max_turns() -> u32 {
    10
}

impl SuiteFile {
    /// Load and validate a suite file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read suite {}", path.display()))?;
        let suite: SuiteFile = toml::from_str(&contents)
            .with_context(|| format!("parse suite {}", path.display()))?;
        suite
            .validate()
            .with_context(|| format!("validate suite {}", path.display()))?;
        Ok(suite)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let suite: SuiteFile = toml::from_str(contents).context("parse suite")?;
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        validate_slug("name", &self.name)?;
        if !self.agent_dir.is_dir() {
            bail!("agent_dir {} is not a directory", self.agent_dir.display());
        }
        if self.max_turns == 0 {
            bail!("max_turns must be > 0");
        }
        if self.tests.is_empty() {
            bail!("tests must be a non-empty array");
        }
        let mut seen = HashSet::new();
        for (index, test) in self.tests.iter().enumerate() {
            validate_slug(&format!("tests[{index}].id"), &test.id)?;
            if !seen.insert(test.id.as_str()) {
                bail!("duplicate test id {}", test.id);
            }
            if test.prompt.trim().is_empty() {
                bail!("test {} has an empty prompt", test.id);
            }
            if let Some(max_turns) = test.max_turns
                && max_turns == 0
            {
                bail!("test {} max_turns must be > 0", test.id);
            }
        }
        Ok(())
    }
}

/// Suite names and test ids become file system names.
fn validate_slug(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must be non-empty");
    }
    if value.contains('/') || value.contains('\\') {
        bail!("{field} must not contain path separators");
    }
    if value.contains("..") {
        bail!("{field} must not contain '..'");
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        bail!("{field} must use [A-Za-z0-9_-] only");
    }
    Ok(())
}

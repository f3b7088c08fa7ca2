use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::parser::extract::{self, CoursePatterns};
use crate::parser::normalize::{FixRule, FixRules};
use crate::parser::ParseOptions;

pub const DEFAULT_PDF_PATH: &str = "Fall_2024.pdf";
pub const DEFAULT_CSV_PATH: &str = "fixed_Fall-2024_course_offerings.csv";
pub const DEFAULT_WORDS_PDF_PATH: &str = "overlapping.pdf";
pub const DEFAULT_WORDS_PATH: &str = "extracted_words.txt";

/// Optional per-document overrides, loaded from JSON:
///
/// ```json
/// { "fixes": [{ "from": "HeaRloom", "to": "Building Room:" }],
///   "instructor_pattern": "Instructor:\\s*([^\\n]+)" }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserConfig {
    pub fixes: Option<Vec<FixRule>>,
    pub header_pattern: Option<String>,
    pub detail_pattern: Option<String>,
    pub instructor_pattern: Option<String>,
}

impl ParserConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build parse options. `raw` disables glitch repair entirely.
    pub fn into_options(self, raw: bool) -> Result<ParseOptions> {
        let patterns = if self.header_pattern.is_none()
            && self.detail_pattern.is_none()
            && self.instructor_pattern.is_none()
        {
            CoursePatterns::default()
        } else {
            CoursePatterns::compile(
                self.header_pattern.as_deref().unwrap_or(extract::default_header_pattern()),
                self.detail_pattern.as_deref().unwrap_or(extract::default_detail_pattern()),
                self.instructor_pattern.as_deref().unwrap_or(extract::default_instructor_pattern()),
            )?
        };

        let fixes = match (raw, self.fixes) {
            (true, _) => None,
            (false, Some(rules)) => Some(FixRules::new(rules)?),
            (false, None) => Some(FixRules::default()),
        };

        Ok(ParseOptions { fixes, patterns })
    }
}

/// Options for a run: config file when given, built-ins otherwise.
pub fn parse_options(config: Option<&Path>, raw: bool) -> Result<ParseOptions> {
    let cfg = match config {
        Some(path) => ParserConfig::load(path)?,
        None => ParserConfig::default(),
    };
    cfg.into_options(raw)
}

pub mod blocks;
pub mod extract;
pub mod normalize;

use tracing::debug;

use extract::{CourseRecord, CoursePatterns, Diagnostic};
use normalize::FixRules;

/// Everything the page parser needs. `fixes: None` leaves page text untouched.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub fixes: Option<FixRules>,
    pub patterns: CoursePatterns,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            fixes: Some(FixRules::default()),
            patterns: CoursePatterns::default(),
        }
    }
}

impl ParseOptions {
    pub fn normalize(&self, text: &str) -> String {
        match &self.fixes {
            Some(fixes) => fixes.apply(text),
            None => text.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PageResult {
    pub records: Vec<CourseRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Page pipeline: glitch repair → blocks → records.
pub fn process_page(page: usize, text: &str, options: &ParseOptions) -> PageResult {
    let text = options.normalize(text);
    let mut result = PageResult::default();

    for block in blocks::split_blocks(&text, &options.patterns.header) {
        match extract::parse_block(block.text, page, &options.patterns) {
            Some((record, diagnostic)) => {
                result.records.push(record);
                result.diagnostics.extend(diagnostic);
            }
            None => debug!("page {}: no header inside block {}..{}", page, block.start, block.end),
        }
    }

    result
}

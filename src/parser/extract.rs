use std::fmt;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

pub(crate) static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\b([A-Z]{2,4})\s+(\d{2,3})\s+(\d{3})\s+(\d+)\s+(.+?)Lecture\s+(\d+)").unwrap()
});
static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Bldg:\s*(.*?)Room:\s*(.*?)\s+Days:\s*(.*?)\s+Time:\s*(.*?)\s*(?:\n|\z)").unwrap()
});
static INSTRUCTOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Instructor:\s*([^\n]+)").unwrap());

/// Labels that open the detail section; never part of a title.
const DETAIL_LABELS: &[&str] = &["Bldg:", "Room:", "Days:", "Time:"];

/// The three patterns that make up the block grammar.
#[derive(Debug, Clone)]
pub struct CoursePatterns {
    pub header: Regex,
    pub detail: Regex,
    pub instructor: Regex,
}

impl CoursePatterns {
    /// Compile custom patterns. Each must expose the capture groups the
    /// extractor reads: header 6, detail 4, instructor 1.
    pub fn compile(header: &str, detail: &str, instructor: &str) -> Result<Self> {
        Ok(Self {
            header: compile_with_groups("header", header, 6)?,
            detail: compile_with_groups("detail", detail, 4)?,
            instructor: compile_with_groups("instructor", instructor, 1)?,
        })
    }
}

impl Default for CoursePatterns {
    fn default() -> Self {
        Self {
            header: HEADER_RE.clone(),
            detail: DETAIL_RE.clone(),
            instructor: INSTRUCTOR_RE.clone(),
        }
    }
}

fn compile_with_groups(name: &str, pattern: &str, groups: usize) -> Result<Regex> {
    let re = Regex::new(pattern).with_context(|| format!("invalid {} pattern", name))?;
    // captures_len counts the implicit whole-match group
    let found = re.captures_len() - 1;
    if found != groups {
        bail!(
            "{} pattern must have {} capture groups, found {}: {}",
            name,
            groups,
            found,
            pattern
        );
    }
    Ok(re)
}

pub fn default_header_pattern() -> &'static str {
    HEADER_RE.as_str()
}

pub fn default_detail_pattern() -> &'static str {
    DETAIL_RE.as_str()
}

pub fn default_instructor_pattern() -> &'static str {
    INSTRUCTOR_RE.as_str()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub subject: String,
    pub catalog_number: String,
    pub section: String,
    pub class_number: String,
    pub title: String,
    pub units: String,
    pub days: String,
    pub time: String,
    pub building: String,
    pub room: String,
    pub instructor: String,
    pub missing_info: bool,
}

impl CourseRecord {
    pub fn key(&self) -> CourseKey {
        CourseKey {
            subject: self.subject.clone(),
            catalog_number: self.catalog_number.clone(),
            section: self.section.clone(),
            class_number: self.class_number.clone(),
        }
    }

    /// The eleven CSV columns, flag excluded.
    pub fn columns(&self) -> [&str; 11] {
        [
            &self.subject,
            &self.catalog_number,
            &self.section,
            &self.class_number,
            &self.title,
            &self.units,
            &self.days,
            &self.time,
            &self.building,
            &self.room,
            &self.instructor,
        ]
    }
}

/// Identifies a course offering in operator-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseKey {
    pub subject: String,
    pub catalog_number: String,
    pub section: String,
    pub class_number: String,
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.subject, self.catalog_number, self.section, self.class_number
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No Bldg/Room/Days/Time line in the block.
    MissingDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub page: usize,
    pub course: CourseKey,
    pub reason: Reason,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Reason::MissingDetails => write!(f, "Missing info for {}", self.course),
        }
    }
}

/// Parse one block. `None` when the header does not match inside it.
pub fn parse_block(
    block: &str,
    page: usize,
    patterns: &CoursePatterns,
) -> Option<(CourseRecord, Option<Diagnostic>)> {
    let header = patterns.header.captures(block)?;
    let group = |i: usize| header.get(i).map(|m| m.as_str().trim()).unwrap_or("");

    let mut record = CourseRecord {
        subject: group(1).to_string(),
        catalog_number: group(2).to_string(),
        section: group(3).to_string(),
        class_number: group(4).to_string(),
        title: clean_title(group(5)),
        units: group(6).to_string(),
        days: String::new(),
        time: String::new(),
        building: String::new(),
        room: String::new(),
        instructor: String::new(),
        missing_info: false,
    };

    let mut diagnostic = None;
    if let Some(caps) = patterns.detail.captures(block) {
        let field = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        record.building = field(1);
        record.room = field(2);
        record.days = field(3);
        record.time = field(4);
    } else {
        diagnostic = Some(Diagnostic {
            page,
            course: record.key(),
            reason: Reason::MissingDetails,
        });
    }

    if let Some(name) = patterns.instructor.captures(block).and_then(|c| c.get(1)) {
        record.instructor = name.as_str().trim().to_string();
    }

    record.missing_info = [&record.days, &record.time, &record.building, &record.room]
        .iter()
        .any(|f| f.trim().is_empty());

    Some((record, diagnostic))
}

/// Collapse line breaks and cut the title at the first detail label.
fn clean_title(raw: &str) -> String {
    let flat = raw.trim().replace("\r\n", " ").replace('\n', " ");
    let cut = DETAIL_LABELS
        .iter()
        .filter_map(|label| flat.find(label))
        .min()
        .unwrap_or(flat.len());
    flat[..cut].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(block: &str) -> (CourseRecord, Option<Diagnostic>) {
        parse_block(block, 1, &CoursePatterns::default()).expect("header should match")
    }

    #[test]
    fn full_detail_line() {
        let (r, diag) = parse(
            "COMP 110 001 12345 Introduction to Programming Lecture 3\n\
             Bldg: Hamilton Room: 100 Days: MWF Time: 9:00-9:50\n\
             Instructor: Kris Jordan\n",
        );
        assert_eq!(r.subject, "COMP");
        assert_eq!(r.catalog_number, "110");
        assert_eq!(r.section, "001");
        assert_eq!(r.class_number, "12345");
        assert_eq!(r.title, "Introduction to Programming");
        assert_eq!(r.units, "3");
        assert_eq!(r.building, "Hamilton");
        assert_eq!(r.room, "100");
        assert_eq!(r.days, "MWF");
        assert_eq!(r.time, "9:00-9:50");
        assert_eq!(r.instructor, "Kris Jordan");
        assert!(!r.missing_info);
        assert!(diag.is_none());
    }

    #[test]
    fn detail_line_at_end_of_block() {
        let (r, _) = parse("BIOL 101 002 777 Principles of Biology Lecture 4\nBldg: Genome Sciences Room: G100 Days: TTh Time: 2:00 PM - 3:15 PM");
        assert_eq!(r.building, "Genome Sciences");
        assert_eq!(r.room, "G100");
        assert_eq!(r.days, "TTh");
        assert_eq!(r.time, "2:00 PM - 3:15 PM");
    }

    #[test]
    fn no_detail_labels() {
        let (r, diag) = parse("HIST 128 003 4410 American History to 1865 Lecture 3\nInstructor: Staff\n");
        assert_eq!(r.building, "");
        assert_eq!(r.room, "");
        assert_eq!(r.days, "");
        assert_eq!(r.time, "");
        assert!(r.missing_info);
        let diag = diag.expect("diagnostic for missing details");
        assert_eq!(diag.reason, Reason::MissingDetails);
        assert_eq!(diag.page, 1);
        assert_eq!(diag.to_string(), "Missing info for HIST 128 003 (4410)");
    }

    #[test]
    fn empty_captured_field_sets_flag_without_diagnostic() {
        let (r, diag) = parse("ENGL 105 010 9001 English Composition Lecture 3\nBldg: Greenlaw Room: 101 Days:  Time: TBA\n");
        assert!(diag.is_none());
        assert_eq!(r.days, "");
        assert!(r.missing_info);
    }

    #[test]
    fn title_truncated_at_label() {
        assert_eq!(clean_title("Intro to Systems\nBldg: Smith Room: 2"), "Intro to Systems");
        assert_eq!(clean_title("  Data\nStructures  "), "Data Structures");
        assert_eq!(clean_title("Seminar Days: TBA Time: TBA"), "Seminar");
    }

    #[test]
    fn title_spanning_detail_line() {
        let (r, _) = parse("PHYS 118 001 3321 Intro to Systems\nBldg: Smith Room: 2 Days: F Time: 1:00 Lecture 4\n");
        assert_eq!(r.title, "Intro to Systems");
        assert_eq!(r.units, "4");
        assert_eq!(r.building, "Smith");
    }

    #[test]
    fn instructor_absent_is_empty() {
        let (r, _) = parse("STOR 155 001 2222 Intro to Data Models Lecture 3\nBldg: Murphey Room: 116 Days: TR Time: 8:00-9:15\n");
        assert_eq!(r.instructor, "");
        assert!(!r.missing_info);
    }

    #[test]
    fn instructor_does_not_leak_into_next_block() {
        let text = "CS 100 001 1234 Foundations Lecture 3\nInstructor: J. Smith\nCS 101 002 5678 Discrete Math Lecture 3\n";
        let patterns = CoursePatterns::default();
        let blocks = crate::parser::blocks::split_blocks(text, &patterns.header);
        assert_eq!(blocks.len(), 2);
        let (first, _) = parse_block(blocks[0].text, 1, &patterns).unwrap();
        let (second, _) = parse_block(blocks[1].text, 1, &patterns).unwrap();
        assert_eq!(first.instructor, "J. Smith");
        assert_eq!(second.instructor, "");
        assert_eq!(second.class_number, "5678");
    }

    #[test]
    fn block_without_header_yields_nothing() {
        assert!(parse_block("Instructor: Nobody\nBldg: X Room: 1 Days: M Time: 1", 1, &CoursePatterns::default()).is_none());
    }

    #[test]
    fn custom_patterns_checked_for_groups() {
        let err = CoursePatterns::compile(r"([A-Z]+) (\d+)", default_detail_pattern(), default_instructor_pattern())
            .unwrap_err();
        assert!(err.to_string().contains("header pattern must have 6"));

        let ok = CoursePatterns::compile(
            default_header_pattern(),
            default_detail_pattern(),
            r"Prof\.\s*([^\n]+)",
        )
        .unwrap();
        let (r, _) = parse_block("ECON 101 001 55 Intro Econ Lecture 3\nProf. Adam Smith\n", 1, &ok).unwrap();
        assert_eq!(r.instructor, "Adam Smith");
    }
}

use std::io::Write;

use anyhow::{Context, Result};

use crate::parser::extract::CourseRecord;
use crate::pdf::Word;

pub const CSV_HEADER: [&str; 11] = [
    "Subject",
    "Catalog Number",
    "Section",
    "Class Number",
    "Title",
    "Units",
    "Days",
    "Time",
    "Building",
    "Room Number",
    "Instructor",
];
pub const MISSING_COLUMN: &str = "Missing Info";

/// Write the header and one row per record. `include_missing` appends the flag column.
pub fn write_csv<W: Write>(writer: W, records: &[CourseRecord], include_missing: bool) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = CSV_HEADER.to_vec();
    if include_missing {
        header.push(MISSING_COLUMN);
    }
    csv_writer.write_record(&header).context("writing header")?;

    for record in records {
        let mut row: Vec<&str> = record.columns().to_vec();
        if include_missing {
            row.push(if record.missing_info { "true" } else { "false" });
        }
        csv_writer.write_record(&row).context("writing record")?;
    }

    csv_writer.flush().context("flushing to CSV")?;
    Ok(())
}

pub fn format_word(word: &Word) -> String {
    format!("Text: {:30} | x: {:?} | y: {:?}", word.text, word.x, word.top)
}

/// Write one page of the word dump and return its word lines for echoing.
pub fn write_word_page<W: Write>(writer: &mut W, page_number: usize, words: &[Word]) -> Result<Vec<String>> {
    write!(writer, "\n--- Page {} ---\n", page_number)?;
    let lines: Vec<String> = words.iter().map(format_word).collect();
    for line in &lines {
        writeln!(writer, "{}", line)?;
    }
    Ok(lines)
}

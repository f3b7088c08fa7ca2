mod config;
mod output;
mod parser;
mod pdf;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use parser::{ParseOptions, PageResult};
use pdf::TextSource;

#[derive(Parser)]
#[command(name = "course_extractor", about = "Extract course offerings from catalog PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every page into course records and write them as CSV
    Extract {
        /// Catalog PDF (or form-feed separated .txt dump)
        #[arg(short, long, default_value = config::DEFAULT_PDF_PATH)]
        input: PathBuf,
        #[arg(short, long, default_value = config::DEFAULT_CSV_PATH)]
        output: PathBuf,
        /// Skip glitch repair of overlapping text
        #[arg(long)]
        raw: bool,
        /// Append a "Missing Info" column
        #[arg(long)]
        missing_column: bool,
        /// JSON file with fix rules and pattern overrides
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Dump every word with its page coordinates
    Words {
        #[arg(short, long, default_value = config::DEFAULT_WORDS_PDF_PATH)]
        input: PathBuf,
        #[arg(short, long, default_value = config::DEFAULT_WORDS_PATH)]
        output: PathBuf,
    },
    /// Print page text as the parser sees it
    Text {
        #[arg(short, long, default_value = config::DEFAULT_PDF_PATH)]
        input: PathBuf,
        /// Only this page (1-based)
        #[arg(short, long)]
        page: Option<usize>,
        /// Show text before glitch repair
        #[arg(long)]
        raw: bool,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            input,
            output,
            raw,
            missing_column,
            config: config_path,
        } => {
            let options = config::parse_options(config_path.as_deref(), raw)?;
            match &options.fixes {
                Some(fixes) => debug!("Applying {} glitch fix rules", fixes.len()),
                None => debug!("Glitch repair disabled"),
            }
            let source = pdf::open(&input)?;
            println!("Parsing {} ({} pages)...", input.display(), source.page_count());

            let result = process_document(source.as_ref(), &options)?;
            for diag in &result.diagnostics {
                warn!("[page {}] {}", diag.page, diag);
            }

            let file = File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?;
            output::write_csv(BufWriter::new(file), &result.records, missing_column)?;

            let incomplete = result.records.iter().filter(|r| r.missing_info).count();
            println!("Wrote {} course entries to {}", result.records.len(), output.display());
            if incomplete > 0 {
                println!(
                    "{} entries missing days/time/building/room ({} without a detail line)",
                    incomplete,
                    result.diagnostics.len()
                );
            }
            Ok(())
        }
        Commands::Words { input, output } => dump_words(&input, &output),
        Commands::Text {
            input,
            page,
            raw,
            config: config_path,
        } => {
            let options = config::parse_options(config_path.as_deref(), raw)?;
            let source = pdf::open(&input)?;
            let pages: Vec<usize> = match page {
                Some(0) => anyhow::bail!("pages are numbered from 1"),
                Some(n) if n > source.page_count() => {
                    anyhow::bail!("page {} out of range ({} pages)", n, source.page_count())
                }
                Some(n) => vec![n - 1],
                None => (0..source.page_count()).collect(),
            };
            for index in pages {
                let text = source.page_text(index)?;
                println!("--- Page {} ---", index + 1);
                println!("{}", options.normalize(&text));
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Run every page through the parser in document order. A page whose text
/// cannot be read is skipped with a warning.
fn process_document(source: &dyn TextSource, options: &ParseOptions) -> anyhow::Result<PageResult> {
    let pb = ProgressBar::new(source.page_count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] page {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut all = PageResult::default();
    for index in 0..source.page_count() {
        let page = index + 1;
        debug!("Parsing page {}...", page);

        match source.page_text(index) {
            Ok(text) => {
                let result = parser::process_page(page, &text, options);
                pb.set_message(format!("{} courses", all.records.len() + result.records.len()));
                all.records.extend(result.records);
                all.diagnostics.extend(result.diagnostics);
            }
            Err(e) => pb.suspend(|| warn!("Skipping page {}: {:#}", page, e)),
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(all)
}

fn dump_words(input: &Path, output: &Path) -> anyhow::Result<()> {
    let source = pdf::open_for_words(input)?;
    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);

    for index in 0..source.page_count() {
        let words = match source.page_words(index) {
            Ok(words) => words,
            Err(e) => {
                warn!("Skipping page {}: {:#}", index + 1, e);
                Vec::new()
            }
        };
        for line in output::write_word_page(&mut writer, index + 1, &words)? {
            println!("{}", line);
        }
    }

    std::io::Write::flush(&mut writer).context("flushing word dump")?;
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::TextPages;

    #[test]
    fn document_keeps_page_then_block_order() {
        let source = TextPages::read(Path::new("tests/fixtures/document.txt")).unwrap();
        let result = process_document(&source, &ParseOptions::default()).unwrap();

        let classes: Vec<&str> = result.records.iter().map(|r| r.class_number.as_str()).collect();
        assert_eq!(classes, vec!["10523", "20001"]);
        assert_eq!(result.records[1].room, "G202");
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn raw_document_reports_glitched_block() {
        let source = TextPages::read(Path::new("tests/fixtures/document.txt")).unwrap();
        let result = process_document(&source, &ParseOptions { fixes: None, ..Default::default() }).unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].page, 3);
        assert_eq!(result.diagnostics[0].to_string(), "Missing info for CHEM 101 001 (20001)");
    }

    #[test]
    fn word_dump_reads_pdf_without_extractable_text() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("type3.pdf");
        let out_path = dir.path().join("words.txt");
        pdf::write_type3_pdf(&pdf_path);

        dump_words(&pdf_path, &out_path).unwrap();
        let dump = std::fs::read_to_string(&out_path).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[1], "--- Page 1 ---");
        assert_eq!(lines[2], format!("Text: {:<30} | x: 72.0 | y: 132.0", "BuiRloom:"));
        assert_eq!(lines[3], format!("Text: {:<30} | x: 122.0 | y: 132.0", "G202"));
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}

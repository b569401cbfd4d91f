use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::ValueEnum;
use rusty_batch::extract_spreadsheet;
use rusty_batch::open_spreadsheet;
use rusty_batch::Criteria;
use rusty_batch::ExtractionOptions;
use rusty_batch::MergeOptions;
use rusty_batch::WorkbookOutput;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Sql,
    Json,
}

#[derive(Parser)]
#[command(about = "Extract batch instructions, ingredients and formula templates from an Excel workbook.")]
struct Args {
    /// Workbook to read (.xlsx or .xlsm).
    file: PathBuf,

    /// Sheet name glob patterns to extract (repeatable). All sheets by default.
    #[arg(long = "sheet", value_name = "PATTERN")]
    sheets: Vec<String>,

    /// Stop after this many matching sheets.
    #[arg(long)]
    sheet_limit: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Sql)]
    format: OutputFormat,

    /// Write to this file instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    /// JSON file with extraction options; flags below override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Finished-goods number prepended to instruction and ingredient rows.
    #[arg(long)]
    fng_number: Option<String>,

    /// Action prefix that continues the current step (repeatable, replaces the defaults).
    #[arg(long = "continuation", value_name = "KEYWORD")]
    continuations: Vec<String>,

    /// Number of leading rows searched for the header row.
    #[arg(long)]
    header_scan_rows: Option<usize>,

    /// Keep ingredients that repeat within a step.
    #[arg(long)]
    keep_duplicate_ingredients: bool,

    /// Merge ingredient rows sharing this column's value, e.g. `description`.
    #[arg(long, value_name = "COLUMN")]
    merge_by: Option<String>,

    /// Column added up across merged rows (repeatable).
    #[arg(long = "merge-sum", value_name = "COLUMN", requires = "merge_by")]
    merge_sums: Vec<String>,

    /// Also merge keys whose text similarity is above this score (0 to 1).
    #[arg(long, value_name = "SCORE", requires = "merge_by")]
    merge_similarity: Option<f64>,
}

impl Args {
    fn options(&self) -> Result<ExtractionOptions> {
        let mut options = match &self.config {
            Some(path) => ExtractionOptions::from_json_file(path)?,
            None => ExtractionOptions::default(),
        };
        if let Some(fng_number) = &self.fng_number {
            options.fng_number = Some(fng_number.to_owned());
        }
        if !self.continuations.is_empty() {
            options.continuation_keywords = self.continuations.clone();
        }
        if let Some(rows) = self.header_scan_rows {
            options.header_scan_rows = rows;
        }
        if self.keep_duplicate_ingredients {
            options.dedupe_ingredients = false;
        }
        if let Some(key) = &self.merge_by {
            options.merge = Some(MergeOptions {
                key: key.to_owned(),
                additions: self.merge_sums.clone(),
                similarity: self.merge_similarity,
            });
        }
        Ok(options)
    }
}

fn render(output: &WorkbookOutput, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Sql => output.combined_sql(),
        OutputFormat::Json => output.to_json()?,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rusty_batch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = args.options()?;
    let criteria = Criteria::new(args.sheets.as_slice(), args.sheet_limit)?;

    let mut spreadsheet = open_spreadsheet(&args.file)?;
    let output = extract_spreadsheet(spreadsheet.as_mut(), &criteria, &options)?;
    info!(
        instructions = output.instructions.len(),
        ingredients = output.ingredients.len(),
        templates = output.templates.len(),
        skipped = output.skipped.len(),
        "extraction finished"
    );

    let mut text = render(&output, &args.format)?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    match &args.output {
        Some(path) => fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout().lock().write_all(text.as_bytes()).context("failed to write stdout")?,
    }
    Ok(())
}

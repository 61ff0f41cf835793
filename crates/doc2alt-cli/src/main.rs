#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc2alt::config::PipelineConfig;
use doc2alt::extractor::DocumentFormat;
use doc2alt::generator::VisionClient;
use doc2alt::model::ProcessingRecord;
use doc2alt::vision::azure_openai::AzureOpenAiVisionClient;
use tracing_subscriber::EnvFilter;

/// Extract alt-text for embedded images in a DOCX/PPTX via a vision model,
/// and write the results back into a byte-minimal copy of the document.
#[derive(Parser)]
#[command(name = "doc2alt")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extractor + context builder + generator, write results to JSON
    Extract {
        /// Path to the .docx or .pptx input
        input: PathBuf,

        /// Where to write the processing record (default: <input>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optional .txt/.md file supplying external context
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Override max_images_per_document
        #[arg(long)]
        max_images: Option<usize>,

        #[arg(long, default_value = "info")]
        log_level: String,

        /// Fraction of results with validation_passed=false above which the
        /// run exits 4 instead of 0
        #[arg(long, default_value_t = 0.5)]
        max_invalid_rate: f64,
    },

    /// Apply a prior extract run's results back into a copy of the document
    Apply {
        /// Path to the original .docx or .pptx input
        input: PathBuf,

        /// Processing record JSON produced by `extract`
        results_json: PathBuf,

        /// Where to write the annotated document (default: <input> with an
        /// `.annotated` suffix before the extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep a copy of the original input next to the output
        #[arg(long)]
        backup: bool,

        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Run extract and apply in one process, without an intermediate JSON file
    Annotate {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        context: Option<PathBuf>,

        #[arg(long)]
        max_images: Option<usize>,

        #[arg(long, default_value = "info")]
        log_level: String,

        #[arg(long, default_value_t = 0.5)]
        max_invalid_rate: f64,
    },
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn detect_format(path: &Path) -> Result<DocumentFormat> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    DocumentFormat::from_extension(ext)
        .with_context(|| format!("unsupported file extension {ext:?}, expected .docx or .pptx"))
}

fn read_external_context(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path else { return Ok(None) };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading external context file {path:?}"))?;
    Ok(Some(doc2alt::strip_bom(&raw).to_string()))
}

/// Fraction of emitted results whose validation failed. `0.0` when there are
/// no results at all, so an empty document never trips the threshold.
fn invalid_rate(record: &ProcessingRecord) -> f64 {
    if record.results.is_empty() {
        return 0.0;
    }
    let invalid = record.results.iter().filter(|r| !r.validation_passed).count();
    invalid as f64 / record.results.len() as f64
}

async fn run_extract(
    input: &Path,
    output: Option<&Path>,
    context: Option<&Path>,
    max_images: Option<usize>,
    max_invalid_rate: f64,
) -> Result<i32> {
    let format = detect_format(input)?;
    let data = std::fs::read(input).with_context(|| format!("reading input {input:?}"))?;
    let external_text = read_external_context(context)?;

    let mut builder = PipelineConfig::builder();
    if let Some(n) = max_images {
        builder = builder.max_images_per_document(n);
    }
    let config = builder.build();

    let client: Arc<dyn VisionClient> = Arc::new(
        AzureOpenAiVisionClient::from_env(config.model.clone())
            .context("loading Azure OpenAI credentials from the environment")?,
    );

    let file_name = input.file_name().and_then(|n| n.to_str()).unwrap_or("document").to_string();
    let input_path = input.to_string_lossy().to_string();

    let record = doc2alt::extract_alt_text(
        &data,
        format,
        &file_name,
        &input_path,
        &config,
        external_text.as_deref(),
        client,
    )
    .await
    .context("running extraction pipeline")?;

    let output_path = output.map(Path::to_path_buf).unwrap_or_else(|| input.with_extension("json"));
    let json = serde_json::to_string_pretty(&record).context("serializing processing record")?;
    if let Err(e) = std::fs::write(&output_path, json) {
        eprintln!("failed to write output {output_path:?}: {e}");
        return Ok(5);
    }

    eprintln!(
        "{}: {} succeeded, {} failed, {} tokens (${:.4})",
        input_path, record.successful, record.failed, record.tokens_used_total, record.estimated_cost_usd
    );

    if invalid_rate(&record) > max_invalid_rate {
        eprintln!("validation failure rate exceeded threshold ({max_invalid_rate})");
        return Ok(4);
    }

    Ok(0)
}

fn run_apply(input: &Path, results_json: &Path, output: Option<&Path>, backup: bool) -> Result<i32> {
    let format = detect_format(input)?;
    let data = std::fs::read(input).with_context(|| format!("reading input {input:?}"))?;
    let json = std::fs::read_to_string(results_json)
        .with_context(|| format!("reading results JSON {results_json:?}"))?;
    let record: ProcessingRecord =
        serde_json::from_str(&json).context("parsing processing record JSON")?;

    let assembled = doc2alt::apply_alt_text(&data, format, &record.results)
        .context("applying alt-text to document")?;

    let output_path = default_annotated_path(input, output);

    if backup {
        let backup_path = input.with_extension(format!("{}.bak", format.as_str()));
        if let Err(e) = std::fs::write(&backup_path, &data) {
            eprintln!("failed to write backup {backup_path:?}: {e}");
            return Ok(5);
        }
    }

    if let Err(e) = std::fs::write(&output_path, &assembled.bytes) {
        eprintln!("failed to write output {output_path:?}: {e}");
        return Ok(5);
    }

    for (locator, verdict) in &assembled.status {
        if verdict != "success" {
            eprintln!("{locator}: {verdict}");
        }
    }

    Ok(0)
}

fn default_annotated_path(input: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(output) = output {
        return output.to_path_buf();
    }
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("");
    input.with_file_name(format!("{stem}.annotated.{ext}"))
}

async fn run_annotate(
    input: &Path,
    output: Option<&Path>,
    context: Option<&Path>,
    max_images: Option<usize>,
    max_invalid_rate: f64,
) -> Result<i32> {
    let format = detect_format(input)?;
    let data = std::fs::read(input).with_context(|| format!("reading input {input:?}"))?;
    let external_text = read_external_context(context)?;

    let mut builder = PipelineConfig::builder();
    if let Some(n) = max_images {
        builder = builder.max_images_per_document(n);
    }
    let config = builder.build();

    let client: Arc<dyn VisionClient> = Arc::new(
        AzureOpenAiVisionClient::from_env(config.model.clone())
            .context("loading Azure OpenAI credentials from the environment")?,
    );

    let file_name = input.file_name().and_then(|n| n.to_str()).unwrap_or("document").to_string();
    let input_path = input.to_string_lossy().to_string();

    let record = doc2alt::extract_alt_text(
        &data,
        format,
        &file_name,
        &input_path,
        &config,
        external_text.as_deref(),
        client,
    )
    .await
    .context("running extraction pipeline")?;

    let assembled =
        doc2alt::apply_alt_text(&data, format, &record.results).context("applying alt-text to document")?;

    let output_path = default_annotated_path(input, output);
    if let Err(e) = std::fs::write(&output_path, &assembled.bytes) {
        eprintln!("failed to write output {output_path:?}: {e}");
        return Ok(5);
    }

    eprintln!(
        "{}: {} succeeded, {} failed, {} tokens (${:.4})",
        input_path, record.successful, record.failed, record.tokens_used_total, record.estimated_cost_usd
    );

    if invalid_rate(&record) > max_invalid_rate {
        eprintln!("validation failure rate exceeded threshold ({max_invalid_rate})");
        return Ok(4);
    }

    Ok(0)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Extract { input, output, context, max_images, log_level, max_invalid_rate } => {
            init_logging(log_level);
            run_extract(input, output.as_deref(), context.as_deref(), *max_images, *max_invalid_rate).await
        }
        Commands::Apply { input, results_json, output, backup, log_level } => {
            init_logging(log_level);
            run_apply(input, results_json, output.as_deref(), *backup)
        }
        Commands::Annotate { input, output, context, max_images, log_level, max_invalid_rate } => {
            init_logging(log_level);
            run_annotate(input, output.as_deref(), context.as_deref(), *max_images, *max_invalid_rate).await
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(err) => {
            let code = err.downcast_ref::<doc2alt::error::Error>().map(|e| e.exit_code()).unwrap_or(1);
            eprintln!("Error: {err:#}");
            process::exit(code);
        }
    }
}

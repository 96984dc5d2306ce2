mod export;
mod images;
mod reconcile;
mod sanitize;
mod settings;
mod table;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use url::Url;

use export::{BodyMode, ExportRecord};
use reconcile::score::MatchScorer;
use reconcile::strategy::{self, Direction, StrategyKind};
use reconcile::{MergedRecord, ReconcileStats};
use table::{MergedRow, RawTable};

#[derive(Parser)]
#[command(name = "sqsp_export", about = "Squarespace WordPress-export converter")]
struct Cli {
    /// Settings file (optional; SQSP_* environment variables override it)
    #[arg(short, long, global = true, default_value = "sqsp_export.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten every export item into a plain table
    Convert {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Keep allow-listed markup instead of flattening to text
        #[arg(long)]
        formatted: bool,
    },
    /// Pair posts/pages with their attachments and flag doubtful pairs
    Merge {
        /// Export XML or a plain table from `convert`
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum)]
        direction: Option<Direction>,
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyKind>,
        /// Example rows to print per category
        #[arg(long, default_value = "5")]
        samples: usize,
    },
    /// Formatted bodies, merged with attachments, in one pass
    Format {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum)]
        direction: Option<Direction>,
        #[arg(short, long, value_enum)]
        strategy: Option<StrategyKind>,
    },
    /// Replace post images with the header image from the live site
    Images {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Max posts to fetch (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Site origin post links are resolved against
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Summarize a merged or annotated table
    Stats {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = settings::load(&cli.config)?;

    let result = match cli.command {
        Commands::Convert { input, output, formatted } => {
            let mode = if formatted {
                BodyMode::Formatted
            } else {
                BodyMode::Plain { max_chars: settings.content_max_chars }
            };
            let xml = export::load(&input)?;
            let records = export::extract_records(&xml, mode);
            let written = table::write_table(&output, &records)?;
            println!("Wrote {} records to {}", written, output.display());
            Ok(())
        }
        Commands::Merge { input, output, direction, strategy, samples } => {
            if let Some(d) = direction {
                settings.pairing.direction = d;
            }
            if let Some(s) = strategy {
                settings.pairing.strategy = s;
            }
            let mode = BodyMode::Plain { max_chars: settings.content_max_chars };
            let records = load_records(&input, mode, settings.pairing.strategy)?;
            let (merged, stats) = run_reconcile(&records, &settings);

            table::write_table(&output, &merged)?;
            println!("Wrote {} merged records to {}", merged.len(), output.display());
            stats.print();
            show_samples(&merged, samples);
            Ok(())
        }
        Commands::Format { input, output, direction, strategy } => {
            if let Some(d) = direction {
                settings.pairing.direction = d;
            }
            if let Some(s) = strategy {
                settings.pairing.strategy = s;
            }
            let xml = export::load(&input)?;
            let records = export::extract_records(&xml, BodyMode::Formatted);
            let (merged, stats) = run_reconcile(&records, &settings);

            let rows: Vec<MergedRow> = merged.iter().map(MergedRow::from).collect();
            table::write_table(&output, &rows)?;
            println!("Wrote {} formatted records to {}", rows.len(), output.display());
            stats.print();
            Ok(())
        }
        Commands::Images { input, output, limit, base_url } => {
            if let Some(b) = base_url {
                settings.base_url = b;
            }
            let base = Url::parse(&settings.base_url)
                .with_context(|| format!("Invalid base URL {:?}", settings.base_url))?;
            let mut rows = RawTable::read(&input)?;
            let fetcher = images::fetch::HttpFetcher::new(&settings.http)?;
            let locator = images::locate::ImageLocator::new(settings.image_selectors.as_slice());

            println!(
                "Resolving header images for {} rows against {}...",
                rows.rows.len(),
                base
            );
            let stats = images::enrich_table(&mut rows, &fetcher, &locator, &base, limit).await?;
            rows.write(&output)?;
            println!("Wrote {} rows to {}", rows.rows.len(), output.display());
            stats.print();
            Ok(())
        }
        Commands::Stats { input } => {
            let merged: Vec<MergedRecord> = table::read_table(&input)?;
            if merged.is_empty() {
                println!("No records in {}.", input.display());
                return Ok(());
            }
            ReconcileStats::from_records(&merged).print();
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// XML exports are extracted in memory; anything else is read as a plain
/// table written by `convert`.
fn load_records(
    input: &Path,
    mode: BodyMode,
    kind: StrategyKind,
) -> anyhow::Result<Vec<ExportRecord>> {
    let is_xml = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if is_xml {
        let xml = export::load(input)?;
        return Ok(export::extract_records(&xml, mode));
    }

    if kind == StrategyKind::ParentId {
        warn!("Plain tables carry no post_parent; parent-id pairing needs the XML export");
    }
    let records: Vec<ExportRecord> = table::read_table(input)?;
    info!("Read {} records from {}", records.len(), input.display());
    Ok(records)
}

fn run_reconcile(
    records: &[ExportRecord],
    settings: &settings::Settings,
) -> (Vec<MergedRecord>, ReconcileStats) {
    let strategy = strategy::build(settings.pairing.strategy, settings.pairing.direction);
    let scorer = MatchScorer::new(settings.generic_names.as_slice());
    reconcile::reconcile(records, strategy.as_ref(), &scorer)
}

fn show_samples(merged: &[MergedRecord], n: usize) {
    if n == 0 {
        return;
    }

    let good: Vec<_> = merged
        .iter()
        .filter(|m| !m.needs_review && !m.attachment_url.is_empty())
        .take(n)
        .collect();
    if !good.is_empty() {
        println!("\n--- Good matches ---");
        for m in good {
            println!("  {:<40} -> {}", truncate(&m.title, 40), m.attachment_filename);
        }
    }

    let review: Vec<_> = merged.iter().filter(|m| m.needs_review).take(n).collect();
    if !review.is_empty() {
        println!("\n--- Needs review ---");
        for m in review {
            let file = if m.attachment_filename.is_empty() {
                "-"
            } else {
                m.attachment_filename.as_str()
            };
            println!(
                "  {:<40} -> {:<30} ({})",
                truncate(&m.title, 40),
                truncate(file, 30),
                m.review_reason
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
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

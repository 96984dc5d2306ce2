pub mod items;
pub mod record;

use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

pub use record::{BodyMode, ExportRecord, RecordKind};

/// Read the whole export into memory.
pub fn load(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read export file {}", path.display()))
}

/// Export document → normalized records, in document order.
pub fn extract_records(xml: &str, mode: BodyMode) -> Vec<ExportRecord> {
    let fragments = items::split_items(xml);
    let records: Vec<ExportRecord> = fragments
        .par_iter()
        .filter_map(|fragment| record::extract_record(fragment, mode))
        .collect();

    info!(
        "Extracted {} records from {} items ({} blank items dropped)",
        records.len(),
        fragments.len(),
        fragments.len() - records.len()
    );
    records
}

// ── Tests ──

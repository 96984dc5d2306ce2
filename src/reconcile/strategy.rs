use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use serde::Deserialize;

use crate::export::{ExportRecord, RecordKind};

/// One content record (by index) and the media record chosen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub content: usize,
    pub media: Option<usize>,
}

/// Decides which attachment belongs to which post or page.
pub trait PairingStrategy {
    fn name(&self) -> &'static str;
    fn pair(&self, records: &[ExportRecord]) -> Vec<Pairing>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Neighbouring records in export order
    #[default]
    Adjacent,
    /// Attachment's wp:post_parent equals the content id
    ParentId,
}

/// Which side of its post the exporter writes the attachment on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Attachment directly after its post
    #[default]
    Following,
    /// Attachment directly before its post
    Preceding,
}

pub fn build(kind: StrategyKind, direction: Direction) -> Box<dyn PairingStrategy> {
    match kind {
        StrategyKind::Adjacent => Box::new(Adjacent { direction }),
        StrategyKind::ParentId => Box::new(ParentId),
    }
}

pub struct Adjacent {
    pub direction: Direction,
}

impl PairingStrategy for Adjacent {
    fn name(&self) -> &'static str {
        match self.direction {
            Direction::Following => "adjacent (following)",
            Direction::Preceding => "adjacent (preceding)",
        }
    }

    fn pair(&self, records: &[ExportRecord]) -> Vec<Pairing> {
        match self.direction {
            Direction::Following => pair_following(records),
            Direction::Preceding => pair_preceding(records),
        }
    }
}

/// Single left-to-right pass: content at `i` takes an attachment at `i + 1`
/// and the cursor jumps both. Anything that isn't content is stepped over.
fn pair_following(records: &[ExportRecord]) -> Vec<Pairing> {
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < records.len() {
        if !records[i].kind().is_content() {
            i += 1;
            continue;
        }
        match records.get(i + 1) {
            Some(next) if next.kind() == RecordKind::Attachment => {
                pairs.push(Pairing { content: i, media: Some(i + 1) });
                i += 2;
            }
            _ => {
                pairs.push(Pairing { content: i, media: None });
                i += 1;
            }
        }
    }

    pairs
}

/// Mirror of `pair_following`: an attachment at `i` goes to content at `i + 1`.
fn pair_preceding(records: &[ExportRecord]) -> Vec<Pairing> {
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < records.len() {
        let kind = records[i].kind();
        if kind == RecordKind::Attachment {
            if let Some(next) = records.get(i + 1) {
                if next.kind().is_content() {
                    pairs.push(Pairing { content: i + 1, media: Some(i) });
                    i += 2;
                    continue;
                }
            }
        } else if kind.is_content() {
            pairs.push(Pairing { content: i, media: None });
        }
        i += 1;
    }

    pairs
}

pub struct ParentId;

impl PairingStrategy for ParentId {
    fn name(&self) -> &'static str {
        "parent-id"
    }

    fn pair(&self, records: &[ExportRecord]) -> Vec<Pairing> {
        let mut by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if record.kind() == RecordKind::Attachment && !record.post_parent.is_empty() {
                by_parent.entry(record.post_parent.as_str()).or_default().push(i);
            }
        }

        let mut used = HashSet::new();
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind().is_content())
            .map(|(i, r)| {
                let media = by_parent
                    .get(r.post_id.as_str())
                    .and_then(|candidates| candidates.iter().copied().find(|m| used.insert(*m)));
                Pairing { content: i, media }
            })
            .collect()
    }
}

// ── Tests ──

pub mod score;
pub mod strategy;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::export::{ExportRecord, RecordKind};
use score::{attachment_filename, MatchScorer};
use strategy::PairingStrategy;

/// A post or page with its attachment and the scorer's verdict. Field order
/// is the annotated table's column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergedRecord {
    pub post_id: String,
    pub title: String,
    pub post_type: String,
    pub post_date: String,
    pub category: String,
    pub link: String,
    pub excerpt: String,
    pub content: String,
    pub attachment_url: String,
    pub attachment_id: String,
    pub attachment_filename: String,
    #[serde(with = "yes_no")]
    pub needs_review: bool,
    pub review_reason: String,
}

impl MergedRecord {
    pub fn new(content: &ExportRecord, media: Option<&ExportRecord>, scorer: &MatchScorer) -> Self {
        let (attachment_url, attachment_id) = match media {
            Some(m) => (m.attachment_url.clone(), m.post_id.clone()),
            None => (String::new(), String::new()),
        };
        let attachment_filename = attachment_filename(&attachment_url);
        let quality = scorer.score(&content.title, &attachment_filename);
        debug!(
            "{} vs {:?}: score {} ({})",
            content.post_id, attachment_filename, quality.score, quality.reason
        );

        MergedRecord {
            post_id: content.post_id.clone(),
            title: content.title.clone(),
            post_type: content.post_type.clone(),
            post_date: content.post_date.clone(),
            category: content.category.clone(),
            link: content.link.clone(),
            excerpt: content.excerpt.clone(),
            content: content.content.clone(),
            attachment_url,
            attachment_id,
            attachment_filename,
            needs_review: quality.needs_review,
            review_reason: quality.reason,
        }
    }
}

/// Run counters for one reconciliation (or one table read back for `stats`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub total: usize,
    pub posts: usize,
    pub pages: usize,
    pub with_image: usize,
    pub without_image: usize,
    pub good_matches: usize,
    pub needs_review: usize,
    /// Attachments no content record claimed.
    pub dropped_media: usize,
    pub reasons: BTreeMap<String, usize>,
}

impl ReconcileStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MergedRecord>) -> Self {
        let mut stats = ReconcileStats::default();
        for record in records {
            stats.record(record);
        }
        stats
    }

    fn record(&mut self, merged: &MergedRecord) {
        self.total += 1;
        match RecordKind::from_post_type(&merged.post_type) {
            RecordKind::Post => self.posts += 1,
            RecordKind::Page => self.pages += 1,
            _ => {}
        }
        if merged.attachment_url.is_empty() {
            self.without_image += 1;
        } else {
            self.with_image += 1;
        }
        if merged.needs_review {
            self.needs_review += 1;
        } else {
            self.good_matches += 1;
        }
        if !merged.review_reason.is_empty() {
            *self.reasons.entry(merged.review_reason.clone()).or_default() += 1;
        }
    }

    pub fn print(&self) {
        println!("\nStatistics:");
        println!("  Total posts/pages: {} ({} posts, {} pages)", self.total, self.posts, self.pages);
        println!("  With images:       {}", self.with_image);
        println!("  Without images:    {}", self.without_image);
        println!("  Good matches:      {}", self.good_matches);
        println!("  Needs review:      {}", self.needs_review);
        if self.dropped_media > 0 {
            println!("  Unclaimed attachments: {}", self.dropped_media);
        }

        if !self.reasons.is_empty() {
            println!("\nReview reasons:");
            let mut reasons: Vec<_> = self.reasons.iter().collect();
            reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (reason, count) in reasons {
                println!("  {}: {}", reason, count);
            }
        }
    }
}

/// Pair every content record with at most one attachment and score the pair.
///
/// The strategy only proposes pairs. Output always holds exactly one record
/// per post/page, in input order, and an attachment is never handed to two
/// records, whatever the strategy returns.
pub fn reconcile(
    records: &[ExportRecord],
    strategy: &dyn PairingStrategy,
    scorer: &MatchScorer,
) -> (Vec<MergedRecord>, ReconcileStats) {
    let is_media = |i: usize| records.get(i).is_some_and(|r| r.kind() == RecordKind::Attachment);

    let mut proposed: HashMap<usize, usize> = HashMap::new();
    for pairing in strategy.pair(records) {
        if let Some(media) = pairing.media.filter(|m| is_media(*m)) {
            proposed.entry(pairing.content).or_insert(media);
        }
    }

    let mut consumed = HashSet::new();
    let mut merged = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if !record.kind().is_content() {
            continue;
        }
        let media = proposed.get(&i).copied().filter(|m| {
            let fresh = consumed.insert(*m);
            if !fresh {
                warn!(
                    "Attachment {} already claimed; leaving {} unpaired",
                    records[*m].post_id, record.post_id
                );
            }
            fresh
        });
        if let Some(m) = media {
            debug!("Paired {} with attachment {}", record.post_id, records[m].post_id);
        }
        merged.push(MergedRecord::new(record, media.map(|m| &records[m]), scorer));
    }

    let mut stats = ReconcileStats::from_records(&merged);
    stats.dropped_media = (0..records.len()).filter(|i| is_media(*i)).count() - consumed.len();

    info!(
        "Reconciled {} content records using {} strategy ({} paired, {} attachments unclaimed)",
        merged.len(),
        strategy.name(),
        consumed.len(),
        stats.dropped_media
    );
    (merged, stats)
}

/// `needs_review` is written as YES/NO.
mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "YES" } else { "NO" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        Ok(raw.eq_ignore_ascii_case("yes") || raw.eq_ignore_ascii_case("true"))
    }
}

// ── Tests ──

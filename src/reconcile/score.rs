use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::settings::DEFAULT_GENERIC_NAMES;

static IMAGE_EXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(jpg|jpeg|png|gif|webp).*$").unwrap());
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]").unwrap());
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]{3,}").unwrap());
static WORD_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_[a-z0-9]+$").unwrap());

/// Filenames shorter than this (after simplifying) are too short to compare by token.
const MIN_TOKEN_COMPARE_LEN: usize = 5;

pub const REASON_NO_IMAGE: &str = "No image";
pub const REASON_GOOD: &str = "Good match";
pub const REASON_PARTIAL: &str = "Partial match";
pub const REASON_WEAK: &str = "Weak match - verify";
pub const REASON_NO_MATCH: &str = "No match - likely stock photo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuality {
    pub score: u8,
    pub needs_review: bool,
    pub reason: String,
}

impl MatchQuality {
    fn new(score: u8, needs_review: bool, reason: impl Into<String>) -> Self {
        MatchQuality {
            score,
            needs_review,
            reason: reason.into(),
        }
    }
}

/// Triage for title ↔ filename pairings. False positives are expected; the
/// review flag is there to put a human on them.
#[derive(Debug, Clone)]
pub struct MatchScorer {
    generic_names: Vec<String>,
}

impl Default for MatchScorer {
    fn default() -> Self {
        MatchScorer::new(DEFAULT_GENERIC_NAMES)
    }
}

impl MatchScorer {
    pub fn new<S: AsRef<str>>(generic_names: &[S]) -> Self {
        MatchScorer {
            generic_names: generic_names
                .iter()
                .map(|g| g.as_ref().trim().to_lowercase())
                .filter(|g| !g.is_empty())
                .collect(),
        }
    }

    pub fn score(&self, title: &str, filename: &str) -> MatchQuality {
        let filename = filename.trim().to_lowercase();
        if filename.is_empty() {
            return MatchQuality::new(0, true, REASON_NO_IMAGE);
        }

        if let Some(generic) = self.generic_match(&filename) {
            return MatchQuality::new(1, true, format!("Generic image ({})", generic));
        }

        let title = title.to_lowercase();
        let simple_title = simplify(&title);
        let simple_file = simplify(&filename);

        // An empty side is contained in anything.
        if simple_title.contains(&simple_file) || simple_file.contains(&simple_title) {
            return MatchQuality::new(10, false, REASON_GOOD);
        }

        if simple_file.len() >= MIN_TOKEN_COMPARE_LEN {
            match shared_tokens(&title, &filename) {
                0 => {}
                1 => return MatchQuality::new(5, true, REASON_WEAK),
                _ => return MatchQuality::new(8, false, REASON_PARTIAL),
            }
        }

        MatchQuality::new(2, true, REASON_NO_MATCH)
    }

    /// First generic name (in configured order) the filename is a variant of.
    fn generic_match(&self, filename: &str) -> Option<&str> {
        let stem = WORD_SUFFIX_RE.replace(filename, "");
        self.generic_names
            .iter()
            .find(|g| {
                filename == g.as_str()
                    || stem == g.as_str()
                    || filename
                        .strip_prefix(g.as_str())
                        .is_some_and(|rest| rest.starts_with('_'))
            })
            .map(String::as_str)
    }
}

/// Last path segment of an attachment URL, lowercased, with the image
/// extension (and anything Squarespace appends after it) removed.
pub fn attachment_filename(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let name = path.rsplit('/').next().unwrap_or_default().to_lowercase();
    IMAGE_EXT_RE.replace(&name, "").into_owned()
}

/// Lowercase letters and digits only.
pub fn simplify(text: &str) -> String {
    NON_ALNUM_RE.replace_all(&text.to_lowercase(), "").into_owned()
}

/// Token pairs (title × filename) where one token contains the other.
fn shared_tokens(title: &str, filename: &str) -> usize {
    let title_tokens: Vec<&str> = TOKEN_RE.find_iter(title).map(|m| m.as_str()).collect();
    TOKEN_RE
        .find_iter(filename)
        .map(|f| {
            let f = f.as_str();
            title_tokens
                .iter()
                .filter(|t| t.contains(f) || f.contains(**t))
                .count()
        })
        .sum()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn score(title: &str, filename: &str) -> MatchQuality {
        MatchScorer::default().score(title, filename)
    }

    #[test]
    fn empty_filename_is_no_image() {
        assert_eq!(score("Anything", ""), MatchQuality::new(0, true, "No image"));
    }

    #[test]
    fn generic_names_win_over_title_match() {
        let q = score("Blog Black Friday", "blog_black");
        assert_eq!(q.score, 1);
        assert!(q.needs_review);
        assert_eq!(q.reason, "Generic image (blog_black)");

        assert_eq!(score("x", "blog_black_2").reason, "Generic image (blog_black)");
        assert_eq!(score("x", "image_0042").reason, "Generic image (image)");
        assert_eq!(score("x", "title+slide").reason, "Generic image (title+slide)");
        assert_eq!(score("x", "Untitled").reason, "Generic image (untitled)");
    }

    #[test]
    fn generic_prefix_needs_separator() {
        // "imagery" is not a variant of "image"
        assert_eq!(score("Imagery of the Sea", "imagery-of-the-sea").score, 10);
    }

    #[test]
    fn substring_match_is_good() {
        let q = score("Summer BBQ Recap", "summer-bbq-recap");
        assert_eq!(q, MatchQuality::new(10, false, "Good match"));
        assert_eq!(score("BBQ", "summer-bbq-recap-2017").score, 10);
    }

    #[test]
    fn two_shared_tokens_is_partial() {
        let q = score("Kayak Trip Tips", "kayak-trip-2019");
        assert_eq!(q, MatchQuality::new(8, false, "Partial match"));
    }

    #[test]
    fn one_shared_token_is_weak() {
        let q = score("Kayak Trip Tips", "kayaking-adventure-2019");
        assert_eq!(q, MatchQuality::new(5, true, "Weak match - verify"));
    }

    #[test]
    fn unrelated_or_short_filename_is_stock() {
        let q = score("Holiday Hours", "dsc_1234-sunset");
        assert_eq!(q, MatchQuality::new(2, true, "No match - likely stock photo"));
        assert_eq!(score("Holiday Hours", "zq1").score, 2);
    }

    #[test]
    fn empty_side_counts_as_contained() {
        assert_eq!(score("", "summer-bbq-recap"), MatchQuality::new(10, false, "Good match"));
        assert_eq!(score("!!!", "summer-bbq-recap").reason, "Good match");
        assert_eq!(score("Holiday Hours", "---").score, 10);
    }

    #[test]
    fn custom_generic_list_replaces_defaults() {
        let scorer = MatchScorer::new(&["stock"]);
        assert_eq!(scorer.score("x", "stock_01").reason, "Generic image (stock)");
        assert_ne!(scorer.score("x", "blog_black").score, 1);
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(
            attachment_filename(
                "https://images.squarespace-cdn.com/content/v1/abc/Summer-BBQ.JPG?format=1500w"
            ),
            "summer-bbq"
        );
        assert_eq!(attachment_filename("/static/Title+Slide.png"), "title+slide");
        assert_eq!(attachment_filename("https://x.com/a/photo.webp#frag"), "photo");
        assert_eq!(attachment_filename("https://x.com/a/document.pdf"), "document.pdf");
        assert_eq!(attachment_filename("  "), "");
    }

    #[test]
    fn simplify_keeps_lowercase_alphanumerics() {
        assert_eq!(simplify("Summer BBQ Recap!"), "summerbbqrecap");
        assert_eq!(simplify("title+slide_2"), "titleslide2");
    }
}

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

static OG_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static TWITTER_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="twitter:image"]"#).unwrap());

/// Lazy-loading attributes first; `src` is often a placeholder.
const IMAGE_ATTRS: &[&str] = &["data-src", "data-image", "src"];

const REJECT_MARKERS: &[&str] = &["logo", "icon"];

/// Finds a page's header image: configured selectors in order, then the
/// `og:image` and `twitter:image` meta tags.
pub struct ImageLocator {
    selectors: Vec<Selector>,
}

impl ImageLocator {
    /// Selectors that fail to parse are logged and skipped.
    pub fn new<S: AsRef<str>>(selectors: &[S]) -> Self {
        let selectors = selectors
            .iter()
            .filter_map(|s| match Selector::parse(s.as_ref()) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    warn!("Skipping invalid image selector {:?}: {:?}", s.as_ref(), e);
                    None
                }
            })
            .collect();
        ImageLocator { selectors }
    }

    pub fn locate(&self, html: &str, page_url: &str) -> Option<String> {
        let document = Html::parse_document(html);

        for selector in &self.selectors {
            let Some(img) = document.select(selector).next() else {
                continue;
            };
            let Some(src) = IMAGE_ATTRS.iter().find_map(|attr| {
                img.value()
                    .attr(attr)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            }) else {
                continue;
            };
            let candidate = absolutize(src, page_url);
            if is_acceptable(&candidate) {
                return Some(candidate);
            }
        }

        [&*OG_IMAGE, &*TWITTER_IMAGE]
            .into_iter()
            .filter_map(|sel| document.select(sel).next())
            .filter_map(|meta| meta.value().attr("content"))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| absolutize(c, page_url))
            .find(|c| is_acceptable(c))
    }
}

/// `//host/x` → `https://host/x`; `/x` → joined onto the page URL.
fn absolutize(src: &str, page_url: &str) -> String {
    if src.starts_with("//") {
        format!("https:{}", src)
    } else if src.starts_with('/') {
        Url::parse(page_url)
            .and_then(|base| base.join(src))
            .map(String::from)
            .unwrap_or_else(|_| src.to_string())
    } else {
        src.to_string()
    }
}

fn is_acceptable(url: &str) -> bool {
    let lower = url.to_lowercase();
    !REJECT_MARKERS.iter().any(|m| lower.contains(m))
}

// ── Tests ──

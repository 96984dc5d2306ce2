pub mod fetch;
pub mod locate;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use url::Url;

use crate::table::RawTable;
use fetch::PageFetcher;
use locate::ImageLocator;

const REQUIRED_COLUMNS: &[&str] = &["post_type", "link", "attachment_url"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichStats {
    pub rows: usize,
    pub posts: usize,
    pub found: usize,
    pub no_image: usize,
    /// Posts with an empty link, or beyond `--limit`.
    pub skipped: usize,
    pub failed: usize,
}

impl EnrichStats {
    pub fn print(&self) {
        println!("Rows:       {}", self.rows);
        println!("Posts:      {}", self.posts);
        println!("  found:    {}", self.found);
        println!("  no image: {}", self.no_image);
        println!("  failed:   {}", self.failed);
        println!("  skipped:  {}", self.skipped);
    }
}

struct Columns {
    post_type: usize,
    link: usize,
    url: usize,
    id: Option<usize>,
}

impl Columns {
    fn resolve(table: &RawTable) -> Result<Self> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| table.column(c).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("Table is missing required column(s): {}", missing.join(", "));
        }
        let col = |name: &str| table.column(name).unwrap_or_default();
        Ok(Columns {
            post_type: col("post_type"),
            link: col("link"),
            url: col("attachment_url"),
            id: table.column("attachment_id"),
        })
    }

    fn clear(&self, row: &mut [String]) {
        row[self.url].clear();
        if let Some(id) = self.id {
            row[id].clear();
        }
    }
}

/// Replace each post's `attachment_url` with the header image found on its
/// live page. A post whose page cannot be fetched or has no usable image
/// ends up with empty `attachment_url` and `attachment_id`; one bad page
/// never stops the run. Rows that are not posts are left untouched.
pub async fn enrich_table(
    table: &mut RawTable,
    fetcher: &dyn PageFetcher,
    locator: &ImageLocator,
    base_url: &Url,
    limit: Option<usize>,
) -> Result<EnrichStats> {
    let cols = Columns::resolve(table)?;

    let mut stats = EnrichStats {
        rows: table.rows.len(),
        ..Default::default()
    };

    let candidates = table
        .rows
        .iter()
        .filter(|r| r[cols.post_type] == "post" && !r[cols.link].trim().is_empty())
        .count();
    let budget = limit.map_or(candidates, |n| n.min(candidates));

    let pb = ProgressBar::new(budget as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut processed = 0usize;
    for row in table.rows.iter_mut() {
        if row[cols.post_type] != "post" {
            continue;
        }
        stats.posts += 1;

        let link = row[cols.link].trim().to_string();
        if link.is_empty() || processed >= budget {
            stats.skipped += 1;
            continue;
        }
        processed += 1;

        let page_url = match base_url.join(&link) {
            Ok(u) => u.to_string(),
            Err(e) => {
                warn!("Bad link {:?}: {}", link, e);
                stats.failed += 1;
                cols.clear(row);
                pb.inc(1);
                continue;
            }
        };

        match fetcher.fetch(&page_url).await {
            Ok(html) => match locator.locate(&html, &page_url) {
                Some(image) => {
                    debug!("{} -> {}", page_url, image);
                    row[cols.url] = image;
                    stats.found += 1;
                }
                None => {
                    debug!("No header image on {}", page_url);
                    cols.clear(row);
                    stats.no_image += 1;
                }
            },
            Err(e) => {
                warn!("Failed to fetch {}: {}", page_url, e);
                cols.clear(row);
                stats.failed += 1;
            }
        }

        pb.inc(1);
        if processed % 10 == 0 {
            info!("Processed {}/{} posts ({} images found)", processed, budget, stats.found);
        }
    }

    pb.finish_and_clear();
    info!(
        "Image pass: {} found, {} without image, {} failed, {} skipped",
        stats.found, stats.no_image, stats.failed, stats.skipped
    );
    Ok(stats)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::fetch::FetchError;
    use super::*;
    use crate::settings::DEFAULT_IMAGE_SELECTORS;

    /// Serves canned pages; unknown URLs answer 404.
    struct FakeFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            FakeFetcher {
                pages: pages.iter().map(|(u, h)| (u.to_string(), h.to_string())).collect(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or(FetchError::Status(StatusCode::NOT_FOUND))
        }
    }

    fn page(src: &str) -> String {
        format!(r#"<article><div class="image-block"><img data-src="{}"></div></article>"#, src)
    }

    fn table() -> RawTable {
        let input = "\
post_id,title,post_type,link,attachment_url,attachment_id
10,About,page,/about,https://old/about.jpg,11
20,Summer,post,/blog/summer,https://old/summer.jpg,21
30,Kayak,post,/blog/kayak,https://old/kayak.jpg,31
40,Holiday,post,/blog/holiday,https://old/holiday.jpg,41
50,Draft,post,,https://old/draft.jpg,51
";
        RawTable::from_reader(input.as_bytes()).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://www.thepointva.com").unwrap()
    }

    #[tokio::test]
    async fn one_failing_page_does_not_affect_others() {
        let summer = page("//cdn.x/summer-new.jpg");
        let holiday = page("https://cdn.x/holiday-new.jpg");
        let fetcher = FakeFetcher::new(&[
            ("https://www.thepointva.com/blog/summer", summer.as_str()),
            ("https://www.thepointva.com/blog/holiday", holiday.as_str()),
        ]);
        let locator = ImageLocator::new(DEFAULT_IMAGE_SELECTORS);
        let mut t = table();
        let before = t.clone();

        let stats = enrich_table(&mut t, &fetcher, &locator, &base(), None).await.unwrap();

        assert_eq!(
            stats,
            EnrichStats { rows: 5, posts: 4, found: 2, no_image: 0, skipped: 1, failed: 1 }
        );
        // page row untouched
        assert_eq!(t.rows[0], before.rows[0]);
        assert_eq!(t.rows[1][4], "https://cdn.x/summer-new.jpg");
        assert_eq!(t.rows[1][5], "21");
        // kayak failed with 404
        assert_eq!(t.rows[2][4], "");
        assert_eq!(t.rows[2][5], "");
        assert_eq!(t.rows[3][4], "https://cdn.x/holiday-new.jpg");
        // empty link is skipped, not cleared
        assert_eq!(t.rows[4], before.rows[4]);
        assert_eq!(fetcher.requested().len(), 3);
    }

    #[tokio::test]
    async fn page_without_image_clears_the_row() {
        let fetcher = FakeFetcher::new(&[(
            "https://www.thepointva.com/blog/summer",
            "<p>words only</p>",
        )]);
        let locator = ImageLocator::new(DEFAULT_IMAGE_SELECTORS);
        let mut t = table();

        let stats = enrich_table(&mut t, &fetcher, &locator, &base(), Some(1)).await.unwrap();

        assert_eq!(stats.no_image, 1);
        assert_eq!(t.rows[1][4], "");
        assert_eq!(t.rows[1][5], "");
    }

    #[tokio::test]
    async fn limit_bounds_requests_and_leaves_the_rest_alone() {
        let fetcher = FakeFetcher::new(&[]);
        let locator = ImageLocator::new(DEFAULT_IMAGE_SELECTORS);
        let mut t = table();
        let before = t.clone();

        let stats = enrich_table(&mut t, &fetcher, &locator, &base(), Some(2)).await.unwrap();

        assert_eq!(
            fetcher.requested(),
            vec![
                "https://www.thepointva.com/blog/summer".to_string(),
                "https://www.thepointva.com/blog/kayak".to_string(),
            ]
        );
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(t.rows[3], before.rows[3]);
    }

    #[tokio::test]
    async fn missing_attachment_id_column_is_fine() {
        let input = "post_type,link,attachment_url\npost,/blog/x,old\n";
        let mut t = RawTable::from_reader(input.as_bytes()).unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let locator = ImageLocator::new(DEFAULT_IMAGE_SELECTORS);

        let stats = enrich_table(&mut t, &fetcher, &locator, &base(), None).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(t.rows[0], vec!["post".to_string(), "/blog/x".into(), String::new()]);
    }

    #[tokio::test]
    async fn missing_required_columns_is_fatal() {
        let mut t = RawTable::from_reader("post_id,title\n1,a\n".as_bytes()).unwrap();
        let fetcher = FakeFetcher::new(&[]);
        let locator = ImageLocator::new(DEFAULT_IMAGE_SELECTORS);

        let err = enrich_table(&mut t, &fetcher, &locator, &base(), None)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("post_type") && msg.contains("attachment_url"), "{msg}");
        assert!(fetcher.requested().is_empty());
    }
}

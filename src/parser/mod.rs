pub mod asset;
pub mod dates;
pub mod fields;
pub mod platforms;

use asset::Classified;
use platforms::PlatformTable;

use crate::model::{AdRecord, Asset, Field};
use crate::render::RenderPage;

/// A candidate record plus what the collector needs to finish it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: AdRecord,
    pub media: Option<Classified>,
    pub unresolved_fingerprints: usize,
}

/// Builds `AdRecord`s from ad cards. Never fails: every field except the
/// library id degrades to its default and is noted in `record.fallbacks`.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    platforms: PlatformTable,
}

impl FieldExtractor {
    pub fn new(platforms: PlatformTable) -> Self {
        Self { platforms }
    }

    /// Probe the id, then extract; `None` when the card carries no library id.
    #[cfg(test)]
    pub async fn extract<P: RenderPage>(&self, page: &P, card: &P::Element) -> Option<Extraction> {
        let id = fields::library_id(page, card).await?;
        Some(self.extract_with_id(page, card, id).await)
    }

    /// Extraction for a card whose id was already probed with
    /// [`fields::library_id`]. Callers probe first so seen ids skip the
    /// remaining field lookups.
    pub async fn extract_with_id<P: RenderPage>(
        &self,
        page: &P,
        card: &P::Element,
        id: String,
    ) -> Extraction {
        let mut record = AdRecord::new(id);

        match fields::status(page, card).await {
            Some(status) => record.status = status,
            None => record.fallbacks.mark(Field::Status),
        }

        let scan = fields::platforms(page, card, &self.platforms).await;
        if scan.platforms.is_empty() {
            record.fallbacks.mark(Field::Platforms);
        }
        record.set_platforms(scan.platforms);

        // End dates are read from the start-date node as well.
        let date_text = fields::date_text(page, card).await;
        record.start_date = date_text.as_deref().and_then(dates::parse);
        record.end_date = date_text.as_deref().and_then(dates::parse_end);
        if record.start_date.is_none() {
            record.fallbacks.mark(Field::StartDate);
        }
        if record.end_date.is_none() {
            record.fallbacks.mark(Field::EndDate);
        }

        let media = fields::asset(page, card).await;
        match &media {
            Some(m) => {
                record.asset = Some(Asset {
                    url: m.url.clone(),
                    kind: m.kind,
                    local_path: None,
                })
            }
            None => record.fallbacks.mark(Field::Asset),
        }

        match fields::multiple_versions(page, card).await {
            Some(flag) => record.multiple_versions = flag,
            None => record.fallbacks.mark(Field::MultipleVersions),
        }

        Extraction {
            record,
            media,
            unresolved_fingerprints: scan.unresolved,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// One ad card as rendered by the library listing.
    pub struct Card<'a> {
        pub id: Option<&'a str>,
        pub status: &'a str,
        pub icons: &'a [&'a str],
        pub date: &'a str,
        pub media: &'a str,
        pub multiple_versions: bool,
    }

    impl Default for Card<'_> {
        fn default() -> Self {
            Self {
                id: Some("100"),
                status: "Active",
                icons: &[FACEBOOK_ICON],
                date: "Started running on 8 Jan 2026",
                media: "",
                multiple_versions: false,
            }
        }
    }

    pub const FACEBOOK_ICON: &str = "width: 12px; height: 12px; mask-position: -13px -2812px;";
    pub const INSTAGRAM_ICON: &str = "width: 12px; height: 12px; mask-position: 0px -2825px;";

    impl Card<'_> {
        pub fn html(&self) -> String {
            let id = self
                .id
                .map(|id| format!("<span>Library ID: {id}</span>"))
                .unwrap_or_default();
            let icons: String = self
                .icons
                .iter()
                .map(|style| format!(r#"<div class="x1rg5ohu"><div style="{style}"></div></div>"#))
                .collect();
            let versions = if self.multiple_versions {
                "<span>This ad has multiple versions</span>"
            } else {
                ""
            };
            format!(
                r#"<div class="xh8yej3">
  <div><span class="x8t9es0 x117nqv4">{status}</span></div>
  {id}
  <div class="x3nfvp2 x1e56ztr"><span class="x8t9es0 xw23nyj xo1l8bm">{date}</span></div>
  <div><span>Platforms</span><div class="x6s0dn4">{icons}</div></div>
  {versions}
  <div data-testid="ad-library-dynamic-content-container">{media}</div>
</div>"#,
                status = self.status,
                date = self.date,
                media = self.media,
            )
        }
    }

    pub fn page(cards: &[String]) -> String {
        format!("<html><body><div id=\"results\">{}</div></body></html>", cards.join("\n"))
    }

    pub fn cards_with_ids(ids: impl IntoIterator<Item = usize>) -> Vec<String> {
        ids.into_iter()
            .map(|i| {
                let id = (1000 + i).to_string();
                Card {
                    id: Some(&id),
                    ..Card::default()
                }
                .html()
            })
            .collect()
    }
}

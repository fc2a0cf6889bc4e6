//! Per-field extraction over one ad card. Each function returns `None` when
//! its field could not be determined; the caller picks the default.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::asset::{self, Classified};
use super::platforms::PlatformTable;
use crate::model::{AdStatus, MediaHint};
use crate::render::{Locator, RenderPage};

static LIBRARY_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Library ID:\s*(\d+)").unwrap());

const DATE_MARKER: &str = "Started running on";
const MULTIPLE_VERSIONS_MARKER: &str = "This ad has multiple versions";

static ID_LOCATOR: LazyLock<Locator> = LazyLock::new(|| Locator::containing("span", "Library ID:"));

static STATUS_EXACT: LazyLock<[(Locator, AdStatus); 2]> = LazyLock::new(|| {
    [
        (Locator::exact("span", "Active"), AdStatus::Active),
        (Locator::exact("span", "Inactive"), AdStatus::Inactive),
    ]
});
static STATUS_SPANS: LazyLock<Locator> = LazyLock::new(|| Locator::css("span"));

static PLATFORM_SECTION: LazyLock<Locator> =
    LazyLock::new(|| Locator::after_label("span", "Platforms", "div"));
static PLATFORM_ICONS: LazyLock<Locator> =
    LazyLock::new(|| Locator::css("div[class*='x1rg5ohu'] div[style*='mask-position']"));

// Most specific first.
static DATE_SOURCES: LazyLock<Vec<Locator>> = LazyLock::new(|| {
    [
        "div.x3nfvp2.x1e56ztr span",
        "span.x8t9es0.xw23nyj.xo1l8bm",
        "div.x3nfvp2 span",
        "span",
        "*",
    ]
    .iter()
    .map(|css| Locator::containing(css, DATE_MARKER))
    .collect()
});

static CONTENT_CONTAINER: LazyLock<Locator> =
    LazyLock::new(|| Locator::css("div[data-testid='ad-library-dynamic-content-container']"));
static LARGE_IMAGE: LazyLock<Locator> =
    LazyLock::new(|| Locator::css("img[src*='s600x600'], img[src*='s1080x1080']"));
static CDN_LARGE_IMAGE: LazyLock<Locator> = LazyLock::new(|| {
    Locator::css("img[src*='fbcdn.net'][src*='s600x600'], img[src*='fbcdn.net'][src*='s1080x1080']")
});
static VIDEO: LazyLock<Locator> = LazyLock::new(|| Locator::css("video"));

static MULTIPLE_VERSIONS: LazyLock<Locator> =
    LazyLock::new(|| Locator::containing("span", MULTIPLE_VERSIONS_MARKER));

/// The "Library ID: <digits>" marker. Cheap enough to run before full extraction.
pub async fn library_id<P: RenderPage>(page: &P, card: &P::Element) -> Option<String> {
    let spans = page.find_within(card, &ID_LOCATOR).await.ok()?;
    for span in &spans {
        let Ok(text) = page.text(span).await else { continue };
        if let Some(caps) = LIBRARY_ID_RE.captures(&text) {
            return Some(caps[1].to_string());
        }
    }
    None
}

pub async fn status<P: RenderPage>(page: &P, card: &P::Element) -> Option<AdStatus> {
    for (locator, status) in STATUS_EXACT.iter() {
        if let Ok(Some(_)) = page.find_first(card, locator).await {
            return Some(*status);
        }
    }

    let spans = page.find_within(card, &STATUS_SPANS).await.ok()?;
    for span in &spans {
        let Ok(text) = page.text(span).await else { continue };
        if text.contains("Inactive") {
            return Some(AdStatus::Inactive);
        }
        if text.contains("Active") {
            return Some(AdStatus::Active);
        }
    }
    None
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlatformScan {
    pub platforms: Vec<String>,
    pub unresolved: usize,
}

/// Platform icons are only identifiable by their sprite offset.
pub async fn platforms<P: RenderPage>(
    page: &P,
    card: &P::Element,
    table: &PlatformTable,
) -> PlatformScan {
    let mut scan = PlatformScan::default();
    let Ok(Some(section)) = page.find_first(card, &PLATFORM_SECTION).await else {
        return scan;
    };
    let Ok(icons) = page.find_within(&section, &PLATFORM_ICONS).await else {
        return scan;
    };
    for icon in &icons {
        let style = page.attribute(icon, "style").await.ok().flatten().unwrap_or_default();
        match table.resolve_style(&style) {
            Some(name) => {
                if !scan.platforms.iter().any(|p| p == name) {
                    scan.platforms.push(name.to_string());
                }
            }
            None => {
                debug!("Unresolved platform fingerprint: {}", style);
                scan.unresolved += 1;
            }
        }
    }
    scan
}

/// Text of the first node carrying the start-date marker.
pub async fn date_text<P: RenderPage>(page: &P, card: &P::Element) -> Option<String> {
    for locator in DATE_SOURCES.iter() {
        let Ok(nodes) = page.find_within(card, locator).await else { continue };
        for node in &nodes {
            if let Ok(text) = page.text(node).await {
                if text.contains(DATE_MARKER) {
                    return Some(text);
                }
            }
        }
    }
    None
}

pub async fn asset<P: RenderPage>(page: &P, card: &P::Element) -> Option<Classified> {
    if let Some(video) = video_asset(page, card).await {
        return Some(video);
    }

    if let Ok(Some(container)) = page.find_first(card, &CONTENT_CONTAINER).await {
        if let Some(url) = first_src(page, &container, &LARGE_IMAGE).await {
            return Some(asset::classify(&url, MediaHint::Image));
        }
    }
    first_src(page, card, &CDN_LARGE_IMAGE)
        .await
        .map(|url| asset::classify(&url, MediaHint::Image))
}

async fn video_asset<P: RenderPage>(page: &P, card: &P::Element) -> Option<Classified> {
    let video = page.find_first(card, &VIDEO).await.ok()??;
    let src = page.attribute(&video, "src").await.ok().flatten();
    // blob: sources are MediaSource handles, not downloadable.
    if let Some(src) = src.filter(|s| !s.is_empty() && !s.starts_with("blob:")) {
        return Some(asset::classify(&src, MediaHint::VideoSource));
    }
    let poster = page.attribute(&video, "poster").await.ok().flatten()?;
    (!poster.is_empty()).then(|| asset::classify(&poster, MediaHint::VideoPoster))
}

async fn first_src<P: RenderPage>(page: &P, scope: &P::Element, locator: &Locator) -> Option<String> {
    let img = page.find_first(scope, locator).await.ok()??;
    page.attribute(&img, "src")
        .await
        .ok()
        .flatten()
        .filter(|s| !s.is_empty())
}

pub async fn multiple_versions<P: RenderPage>(page: &P, card: &P::Element) -> Option<bool> {
    page.find_first(card, &MULTIPLE_VERSIONS)
        .await
        .ok()
        .map(|found| found.is_some())
}

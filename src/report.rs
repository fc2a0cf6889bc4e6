//! Static HTML report over the stored ads.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::info;

use crate::model::{AdRecord, AdStatus, AssetKind};
use crate::parser::asset::is_image_path;

const TITLE: &str = "Facebook Ads Library Report";

const STYLE: &str = "
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               background-color: #f5f5f5; padding: 20px; color: #333; }
        .container { max-width: 1400px; margin: 0 auto; }
        header { background: #fff; padding: 24px; border-radius: 8px; margin-bottom: 20px; }
        h1 { color: #1877f2; margin-bottom: 8px; }
        .stats { display: flex; gap: 16px; margin-top: 16px; flex-wrap: wrap; }
        .stat-card { background: #f0f2f5; padding: 12px 20px; border-radius: 6px; min-width: 140px; }
        .stat-label { font-size: 12px; color: #65676b; text-transform: uppercase; }
        .stat-value { font-size: 28px; font-weight: bold; }
        .ads-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(320px, 1fr)); gap: 20px; }
        .ad-card { background: #fff; border-radius: 8px; overflow: hidden; box-shadow: 0 1px 2px rgba(0,0,0,.1); }
        .ad-header { padding: 16px; border-bottom: 1px solid #e4e6eb; }
        .ad-id { font-weight: 600; font-size: 13px; margin-bottom: 6px; }
        .ad-status { display: inline-block; padding: 2px 8px; border-radius: 10px; font-size: 11px; }
        .status-active { background: #e7f3e8; color: #42b72a; }
        .status-inactive { background: #f0f2f5; color: #8a8d91; }
        .versions { font-size: 11px; color: #1877f2; margin-top: 5px; }
        .ad-platforms, .ad-dates { font-size: 12px; color: #65676b; margin-top: 6px; }
        .ad-asset-container { background: #f0f2f5; min-height: 200px; display: flex;
                              align-items: center; justify-content: center; }
        .ad-asset { max-width: 100%; max-height: 400px; }
        .no-asset { color: #8a8d91; font-size: 13px; }
        .generated-at { text-align: center; color: #8a8d91; font-size: 12px; margin-top: 30px; padding: 20px; }
        .empty { color: #666; margin-top: 50px; text-align: center; }
";

/// Render the report and write it to `<dir>/ads_report_<timestamp>.html`.
pub fn write_report(dir: &Path, ads: &[AdRecord]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let now = Local::now();
    let html = if ads.is_empty() {
        render_empty(now)
    } else {
        let ads: Vec<AdRecord> = ads.iter().map(with_absolute_asset_path).collect();
        render(&ads, now)
    };
    let path = dir.join(format!("ads_report_{}.html", now.format("%Y%m%d_%H%M%S")));
    std::fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("HTML report written to {}", path.display());
    Ok(path)
}

/// Local paths are stored relative to the working directory; the report lives elsewhere.
fn with_absolute_asset_path(ad: &AdRecord) -> AdRecord {
    let mut ad = ad.clone();
    if let Some(asset) = ad.asset.as_mut() {
        if let Some(local) = asset.local_path.as_mut() {
            if let Ok(abs) = std::path::absolute(&*local) {
                *local = abs.to_string_lossy().into_owned();
            }
        }
    }
    ad
}

pub fn render(ads: &[AdRecord], generated_at: DateTime<Local>) -> String {
    let mut sorted: Vec<&AdRecord> = ads.iter().collect();
    sorted.sort_by(|a, b| {
        (a.status != AdStatus::Active, &a.id).cmp(&(b.status != AdStatus::Active, &b.id))
    });

    let active = ads.iter().filter(|a| a.status == AdStatus::Active).count();
    let mut platforms: BTreeMap<&str, usize> = BTreeMap::new();
    for ad in ads {
        for p in ad.platforms() {
            *platforms.entry(p.as_str()).or_default() += 1;
        }
    }
    let platform_list = if platforms.is_empty() {
        "N/A".to_string()
    } else {
        platforms.keys().copied().collect::<Vec<_>>().join(", ")
    };

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{TITLE}</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <header>
            <h1>{TITLE}</h1>
            <p>Scraped from the Facebook Ads Library</p>
            <div class="stats">
                <div class="stat-card"><div class="stat-label">Total Ads</div><div class="stat-value">{total}</div></div>
                <div class="stat-card"><div class="stat-label">Active</div><div class="stat-value" style="color: #42b72a;">{active}</div></div>
                <div class="stat-card"><div class="stat-label">Inactive</div><div class="stat-value" style="color: #8a8d91;">{inactive}</div></div>
                <div class="stat-card"><div class="stat-label">Platforms</div><div class="stat-value" style="font-size: 18px;">{platforms}</div></div>
            </div>
        </header>
        <div class="ads-grid">
"#,
        total = ads.len(),
        inactive = ads.len() - active,
        platforms = escape(&platform_list),
    );

    for ad in sorted {
        card(&mut html, ad);
    }

    let _ = write!(
        html,
        r#"        </div>
        <div class="generated-at">Report generated on {}</div>
    </div>
</body>
</html>
"#,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    html
}

fn card(html: &mut String, ad: &AdRecord) {
    let status_class = if ad.status == AdStatus::Active {
        "status-active"
    } else {
        "status-inactive"
    };
    let status_text = match ad.status {
        AdStatus::Active => "Active",
        AdStatus::Inactive => "Inactive",
        AdStatus::Unknown => "Unknown",
    };
    let versions = if ad.multiple_versions {
        r#"<div class="versions">Multiple Versions</div>"#
    } else {
        ""
    };
    let platforms = ad.platforms().iter().map(String::as_str).collect::<Vec<_>>().join(", ");

    let _ = write!(
        html,
        r#"            <div class="ad-card">
                <div class="ad-header">
                    <div class="ad-id">Library ID: {id}</div>
                    <span class="ad-status {status_class}">{status_text}</span>
                    {versions}
                    <div class="ad-platforms">Platforms: {platforms}</div>
                    <div class="ad-dates">{dates}</div>
                </div>
                <div class="ad-asset-container">
                    {asset}
                </div>
            </div>
"#,
        id = escape(&ad.id),
        platforms = escape(&platforms),
        dates = escape(&dates_text(ad)),
        asset = asset_html(ad),
    );
}

fn dates_text(ad: &AdRecord) -> String {
    let mut parts = Vec::new();
    if let Some(d) = ad.start_date {
        parts.push(format!("Started: {d}"));
    }
    if let Some(d) = ad.end_date {
        parts.push(format!("Ended: {d}"));
    }
    if parts.is_empty() {
        "Date: Unknown".to_string()
    } else {
        parts.join(" | ")
    }
}

fn asset_html(ad: &AdRecord) -> String {
    let Some(asset) = &ad.asset else {
        return r#"<div class="no-asset">No asset available</div>"#.to_string();
    };
    let src = asset.local_path.as_deref().unwrap_or(&asset.url);
    // Posters keep the video kind but are still images.
    let is_video_file = asset.kind == AssetKind::Video && !is_image_path(src);
    if is_video_file {
        format!(
            r#"<video class="ad-asset" controls><source src="{}"></video>"#,
            escape(src)
        )
    } else {
        format!(r#"<img class="ad-asset" src="{}" alt="Ad asset">"#, escape(src))
    }
}

pub fn render_empty(generated_at: DateTime<Local>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{TITLE} - No Data</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>{TITLE}</h1>
    <div class="empty">
        <p>No ads found in database.</p>
        <p>Please run the scraper first.</p>
    </div>
    <div class="generated-at">Report generated on {}</div>
</body>
</html>
"#,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::Asset;

    fn ad(id: &str, status: AdStatus) -> AdRecord {
        let mut r = AdRecord::new(id);
        r.status = status;
        r
    }

    #[test]
    fn active_first_then_by_id() {
        let ads = vec![
            ad("3", AdStatus::Inactive),
            ad("2", AdStatus::Active),
            ad("1", AdStatus::Unknown),
            ad("0", AdStatus::Active),
        ];
        let html = render(&ads, Local::now());
        let pos = |id: &str| html.find(&format!("Library ID: {id}<")).unwrap();
        assert!(pos("0") < pos("2"));
        assert!(pos("2") < pos("1"));
        assert!(pos("1") < pos("3"));
        assert!(html.contains(r#"<div class="stat-value">4</div>"#));
    }

    #[test]
    fn card_contents() {
        let mut r = ad("9", AdStatus::Active);
        r.start_date = NaiveDate::from_ymd_opt(2025, 3, 3);
        r.end_date = NaiveDate::from_ymd_opt(2025, 4, 9);
        r.multiple_versions = true;
        r.set_platforms(["Instagram", "Facebook"]);
        r.asset = Some(Asset {
            url: "https://cdn/clip.mp4?a=1&b=2".into(),
            kind: AssetKind::Video,
            local_path: None,
        });
        let html = render(&[r], Local::now());
        assert!(html.contains("Started: 2025-03-03 | Ended: 2025-04-09"));
        assert!(html.contains("Platforms: Facebook, Instagram"));
        assert!(html.contains("Multiple Versions"));
        assert!(html.contains(r#"<source src="https://cdn/clip.mp4?a=1&amp;b=2">"#));

        let plain = render(&[ad("10", AdStatus::Inactive)], Local::now());
        assert!(plain.contains("Date: Unknown"));
        assert!(plain.contains("No asset available"));
    }

    #[test]
    fn poster_renders_as_image_and_local_path_preferred() {
        let mut r = ad("5", AdStatus::Active);
        r.asset = Some(Asset {
            url: "https://cdn/poster.jpg".into(),
            kind: AssetKind::Video,
            local_path: Some("assets/videos/5.jpg".into()),
        });
        let html = render(&[r], Local::now());
        assert!(html.contains(r#"<img class="ad-asset" src="assets/videos/5.jpg""#));
    }

    #[test]
    fn text_is_escaped() {
        let html = render(&[ad("<script>", AdStatus::Active)], Local::now());
        assert!(html.contains("Library ID: &lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn writes_empty_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_report(&dir.path().join("reports"), &[]).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ads_report_") && name.ends_with(".html"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("No ads found in database."));
    }
}

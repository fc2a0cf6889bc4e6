//! Offline engine over saved HTML.
//!
//! Each snapshot is the full page as rendered after one more scroll; opening
//! shows the first one and every `scroll_to_bottom` advances to the next,
//! staying on the last. Documents are re-parsed per call, which keeps the
//! engine `Send` and is cheap at the sizes involved.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{Locator, RenderPage};

static ALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("*").unwrap());

/// Handle to an element of one snapshot, by document-order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotElement {
    snapshot: usize,
    ordinal: usize,
}

#[derive(Debug, Default)]
pub struct SnapshotPage {
    snapshots: Vec<String>,
    current: Option<usize>,
    scrolls: usize,
}

impl SnapshotPage {
    pub fn new(snapshots: Vec<String>) -> Self {
        Self {
            snapshots,
            current: None,
            scrolls: 0,
        }
    }

    /// Load every `*.html` file of `dir`, in file name order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read snapshot dir {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "html"))
            .collect();
        paths.sort();
        let snapshots = paths
            .iter()
            .map(std::fs::read_to_string)
            .collect::<std::io::Result<Vec<_>>>()?;
        debug!("Loaded {} snapshots from {}", snapshots.len(), dir.display());
        Ok(Self::new(snapshots))
    }

    #[cfg(test)]
    pub fn scrolls(&self) -> usize {
        self.scrolls
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    fn current(&self) -> Result<usize> {
        self.current.ok_or_else(|| anyhow!("snapshot page not opened"))
    }

    fn locate(&self, scope: Option<SnapshotElement>, locator: &Locator) -> Result<Vec<SnapshotElement>> {
        let snapshot = match scope {
            Some(parent) => parent.snapshot,
            None => self.current()?,
        };
        let doc = Html::parse_document(&self.snapshots[snapshot]);
        let root = match scope {
            Some(parent) => Some(
                element_at(&doc, parent.ordinal).ok_or_else(|| anyhow!("stale element handle"))?,
            ),
            None => None,
        };

        let matched = match locator {
            Locator::Css(css) => select_in(&doc, root, css)?,
            Locator::Text { css, text } => select_in(&doc, root, css)?
                .into_iter()
                .filter(|el| text.matches(&rendered_text(el)))
                .collect(),
            Locator::AfterLabel {
                label_css,
                label,
                css,
            } => {
                let target = parse_selector(css)?;
                select_in(&doc, root, label_css)?
                    .into_iter()
                    .filter(|el| label.matches(&rendered_text(el)))
                    .filter_map(|el| el.next_siblings().find_map(ElementRef::wrap))
                    .filter(|sibling| target.matches(sibling))
                    .collect()
            }
        };

        let order: Vec<_> = doc.select(&ALL).map(|el| el.id()).collect();
        Ok(matched
            .into_iter()
            .filter_map(|el| order.iter().position(|id| *id == el.id()))
            .map(|ordinal| SnapshotElement { snapshot, ordinal })
            .collect())
    }

    fn with_element<T>(&self, handle: &SnapshotElement, f: impl FnOnce(ElementRef<'_>) -> T) -> Result<T> {
        let html = self
            .snapshots
            .get(handle.snapshot)
            .ok_or_else(|| anyhow!("unknown snapshot {}", handle.snapshot))?;
        let doc = Html::parse_document(html);
        let el = element_at(&doc, handle.ordinal).ok_or_else(|| anyhow!("stale element handle"))?;
        Ok(f(el))
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

fn select_in<'a>(doc: &'a Html, root: Option<ElementRef<'a>>, css: &str) -> Result<Vec<ElementRef<'a>>> {
    let selector = parse_selector(css)?;
    Ok(match root {
        Some(r) => r.select(&selector).collect(),
        None => doc.select(&selector).collect(),
    })
}

fn element_at(doc: &Html, ordinal: usize) -> Option<ElementRef<'_>> {
    doc.select(&ALL).nth(ordinal)
}

/// Text nodes joined with runs of whitespace collapsed, like `innerText`.
fn rendered_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl RenderPage for SnapshotPage {
    type Element = SnapshotElement;

    async fn open(&mut self, url: &str) -> Result<()> {
        if self.snapshots.is_empty() {
            bail!("no snapshots to serve for {url}");
        }
        self.current = Some(0);
        self.scrolls = 0;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        let current = self.current()?;
        self.current = Some((current + 1).min(self.snapshots.len() - 1));
        self.scrolls += 1;
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<SnapshotElement>> {
        self.locate(None, locator)
    }

    async fn find_within(
        &self,
        parent: &SnapshotElement,
        locator: &Locator,
    ) -> Result<Vec<SnapshotElement>> {
        self.locate(Some(*parent), locator)
    }

    async fn text(&self, element: &SnapshotElement) -> Result<String> {
        self.with_element(element, |el| rendered_text(&el))
    }

    async fn attribute(&self, element: &SnapshotElement, name: &str) -> Result<Option<String>> {
        self.with_element(element, |el| el.value().attr(name).map(str::to_string))
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Snapshot replay closed after {} scrolls", self.scrolls);
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &str = r#"<html><body>
        <div class="card"><span>Platforms</span><div class="icons"><i>a</i></div></div>
        <div class="card"><span>  Active </span><span>Library ID: 7</span></div>
    </body></html>"#;
    const SECOND: &str = r#"<html><body><div class="card"><p>second</p></div></body></html>"#;

    #[tokio::test]
    async fn locates_by_css_text_and_label() {
        let mut page = SnapshotPage::new(vec![FIRST.to_string()]);
        page.open("snapshot://x").await.unwrap();

        let cards = page.find_all(&Locator::css("div.card")).await.unwrap();
        assert_eq!(cards.len(), 2);

        let active = page.find_within(&cards[1], &Locator::exact("span", "Active")).await.unwrap();
        assert_eq!(active.len(), 1);
        let id = page
            .find_first(&cards[1], &Locator::containing("span", "Library ID:"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.text(&id).await.unwrap(), "Library ID: 7");

        let section = page
            .find_first(&cards[0], &Locator::after_label("span", "Platforms", "div"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.attribute(&section, "class").await.unwrap().as_deref(), Some("icons"));
        assert_eq!(page.attribute(&section, "style").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scrolling_advances_and_sticks_to_last() {
        let mut page = SnapshotPage::new(vec![FIRST.to_string(), SECOND.to_string()]);
        assert!(page.find_all(&Locator::css("p")).await.is_err());
        page.open("snapshot://x").await.unwrap();
        assert!(page.find_all(&Locator::css("p")).await.unwrap().is_empty());

        page.scroll_to_bottom().await.unwrap();
        page.scroll_to_bottom().await.unwrap();
        assert_eq!(page.find_all(&Locator::css("p")).await.unwrap().len(), 1);
        assert_eq!(page.scrolls(), 2);

        page.close().await.unwrap();
        assert!(!page.is_open());
    }

    #[tokio::test]
    async fn opening_without_snapshots_fails() {
        let mut page = SnapshotPage::default();
        assert!(page.open("snapshot://x").await.is_err());
    }

    #[test]
    fn loads_html_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02.html"), SECOND).unwrap();
        std::fs::write(dir.path().join("01.html"), FIRST).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let page = SnapshotPage::from_dir(dir.path()).unwrap();
        assert_eq!(page.snapshots.len(), 2);
        assert!(page.snapshots[0].contains("Platforms"));
    }
}

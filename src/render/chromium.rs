//! Headless Chromium via chromiumoxide.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Locator, RenderPage, TextMatch};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const PREVIOUS_SIBLING_TEXT: &str =
    "function() { const p = this.previousElementSibling; return p ? p.innerText : ''; }";

pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumPage {
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={USER_AGENT}"));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        info!("Chromium started (headless: {})", headless);
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    async fn filter_by_text(elements: Vec<Element>, text: &TextMatch) -> Result<Vec<Element>> {
        let mut kept = Vec::new();
        for el in elements {
            let inner = el.inner_text().await?.unwrap_or_default();
            if text.matches(&inner) {
                kept.push(el);
            }
        }
        Ok(kept)
    }

    async fn filter_after_label(elements: Vec<Element>, label: &TextMatch) -> Result<Vec<Element>> {
        let mut kept = Vec::new();
        for el in elements {
            let returns = el.call_js_fn(PREVIOUS_SIBLING_TEXT, false).await?;
            let sibling_text = returns
                .result
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if label.matches(&sibling_text) {
                kept.push(el);
            }
        }
        Ok(kept)
    }

    async fn resolve(&self, scope: Option<&Element>, locator: &Locator) -> Result<Vec<Element>> {
        let query = |css: String| async move {
            match scope {
                Some(parent) => parent.find_elements(css).await,
                None => self.page.find_elements(css).await,
            }
        };
        // No match is an empty vec; an error here means the target itself failed.
        let found = match locator {
            Locator::Css(css) => query(css.clone()).await?,
            Locator::Text { css, text } => {
                let candidates = query(css.clone()).await?;
                Self::filter_by_text(candidates, text).await?
            }
            Locator::AfterLabel {
                label_css,
                label,
                css,
            } => {
                let candidates = query(format!("{label_css} + {css}")).await?;
                Self::filter_after_label(candidates, label).await?
            }
        };
        Ok(found)
    }
}

#[async_trait]
impl RenderPage for ChromiumPage {
    type Element = Element;

    async fn open(&mut self, url: &str) -> Result<()> {
        match tokio::time::timeout(NAVIGATION_TIMEOUT, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                debug!("Navigated to {}", url);
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}s", NAVIGATION_TIMEOUT.as_secs()),
        }
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .context("scroll failed")?;
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Element>> {
        self.resolve(None, locator).await
    }

    async fn find_within(&self, parent: &Element, locator: &Locator) -> Result<Vec<Element>> {
        self.resolve(Some(parent), locator).await
    }

    async fn text(&self, element: &Element) -> Result<String> {
        Ok(element
            .inner_text()
            .await?
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>> {
        Ok(element.attribute(name).await?)
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.page.clone().close().await;
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("Chromium closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn open_and_locate() {
        let mut page = ChromiumPage::launch(true).await.expect("failed to launch");
        page.open("data:text/html,<div class='card'><span>Library ID: 42</span></div>")
            .await
            .expect("navigation failed");

        let cards = page.find_all(&Locator::css("div.card")).await.unwrap();
        assert_eq!(cards.len(), 1);
        let id = page
            .find_first(&cards[0], &Locator::containing("span", "Library ID:"))
            .await
            .unwrap()
            .expect("id span");
        assert_eq!(page.text(&id).await.unwrap(), "Library ID: 42");

        page.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn unmatched_locators_are_empty_not_errors() {
        let mut page = ChromiumPage::launch(true).await.expect("failed to launch");
        page.open("data:text/html,<div class='card'><span>Active</span></div>")
            .await
            .expect("navigation failed");

        assert!(page.find_all(&Locator::css("div.missing")).await.unwrap().is_empty());
        let cards = page.find_all(&Locator::css("div.card")).await.unwrap();
        let none = page
            .find_first(&cards[0], &Locator::containing("span", "Inactive"))
            .await
            .unwrap();
        assert!(none.is_none());

        page.close().await.unwrap();
    }
}

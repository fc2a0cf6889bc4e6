//! Page rendering abstraction.
//!
//! The collector only needs to open a page, scroll it, locate elements and
//! read their text and attributes. `chromium` drives a real browser;
//! `snapshot` replays saved HTML and backs the tests.

pub mod chromium;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Contains(String),
    Exact(String),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatch::Contains(needle) => text.contains(needle.as_str()),
            TextMatch::Exact(expected) => text.trim() == expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS selector.
    Css(String),
    /// Elements matching `css` whose rendered text satisfies `text`.
    Text { css: String, text: TextMatch },
    /// Element matching `css` that immediately follows a `label_css` sibling
    /// whose text satisfies `label`.
    AfterLabel {
        label_css: String,
        label: TextMatch,
        css: String,
    },
}

impl Locator {
    pub fn css(css: &str) -> Self {
        Locator::Css(css.to_string())
    }

    pub fn containing(css: &str, text: &str) -> Self {
        Locator::Text {
            css: css.to_string(),
            text: TextMatch::Contains(text.to_string()),
        }
    }

    pub fn exact(css: &str, text: &str) -> Self {
        Locator::Text {
            css: css.to_string(),
            text: TextMatch::Exact(text.to_string()),
        }
    }

    pub fn after_label(label_css: &str, label: &str, css: &str) -> Self {
        Locator::AfterLabel {
            label_css: label_css.to_string(),
            label: TextMatch::Contains(label.to_string()),
            css: css.to_string(),
        }
    }
}

/// One rendered page. Calls against a page must be sequential.
#[async_trait]
pub trait RenderPage: Send + Sync {
    type Element: Send + Sync;

    async fn open(&mut self, url: &str) -> Result<()>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Element>>;

    async fn find_within(
        &self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> Result<Vec<Self::Element>>;

    async fn find_first(
        &self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> Result<Option<Self::Element>> {
        Ok(self.find_within(parent, locator).await?.into_iter().next())
    }

    /// Rendered text of the element, whitespace-trimmed.
    async fn text(&self, element: &Self::Element) -> Result<String>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_match() {
        assert!(TextMatch::Exact("Active".into()).matches("  Active "));
        assert!(!TextMatch::Exact("Active".into()).matches("Inactive"));
        assert!(TextMatch::Contains("Active".into()).matches("Inactive"));
    }
}

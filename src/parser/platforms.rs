use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

static MASK_POSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mask-position\s*:\s*([^;]+)").unwrap());

/// Sprite-sheet offsets of the platform icons in the ad card.
///
/// These track the source site's icon sprite and break whenever it is
/// regenerated. Override with a JSON file rather than editing extraction code.
const BUILTIN: &[(&str, &str)] = &[("-13px -2812px", "Facebook"), ("0px -2825px", "Instagram")];

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformEntry {
    pub position: String,
    pub platform: String,
}

#[derive(Debug, Clone)]
pub struct PlatformTable {
    entries: Vec<(String, String)>,
}

impl Default for PlatformTable {
    fn default() -> Self {
        Self::new(BUILTIN.iter().map(|(pos, name)| PlatformEntry {
            position: pos.to_string(),
            platform: name.to_string(),
        }))
    }
}

impl PlatformTable {
    pub fn new(entries: impl IntoIterator<Item = PlatformEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (normalize(&e.position), e.platform))
                .collect(),
        }
    }

    /// Load `[{"position": "-13px -2812px", "platform": "Facebook"}, ...]`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read platform table {}", path.display()))?;
        let entries: Vec<PlatformEntry> =
            serde_json::from_str(&raw).context("Invalid platform table JSON")?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up the platform for an inline `style` attribute carrying a mask-position.
    pub fn resolve_style(&self, style: &str) -> Option<&str> {
        let found = match MASK_POSITION_RE.captures(style) {
            Some(caps) => {
                let position = normalize(&caps[1]);
                self.entries.iter().find(|(key, _)| *key == position)
            }
            None => {
                let style = normalize(style);
                self.entries.iter().find(|(key, _)| style.contains(key.as_str()))
            }
        };
        found.map(|(_, name)| name.as_str())
    }
}

fn normalize(position: &str) -> String {
    position
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let t = PlatformTable::default();
        assert_eq!(
            t.resolve_style("width: 12px; mask-position: -13px -2812px; mask-size: auto"),
            Some("Facebook")
        );
        assert_eq!(t.resolve_style("-webkit-mask-position:0px  -2825px;"), Some("Instagram"));
        assert_eq!(t.resolve_style("mask-position: -13px-2812px"), Some("Facebook"));
        assert_eq!(t.resolve_style("mask-position: -26px -100px"), None);
        assert_eq!(t.resolve_style("mask-position: -10px -2825px"), None);
    }

    #[test]
    fn custom_table_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platforms.json");
        std::fs::write(
            &path,
            r#"[{"position": "-26px -100px", "platform": "Messenger"}]"#,
        )
        .unwrap();
        let t = PlatformTable::from_json_file(&path).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.resolve_style("mask-position: -26px -100px"), Some("Messenger"));
        assert_eq!(t.resolve_style("mask-position: -13px -2812px"), None);
    }
}

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

pub const DEFAULT_PLATFORM: &str = "Facebook";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdStatus {
    Active,
    Inactive,
    Unknown,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Active => "active",
            AdStatus::Inactive => "inactive",
            AdStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(AdStatus::Active),
            "inactive" => Some(AdStatus::Inactive),
            "unknown" => Some(AdStatus::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for AdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }

    /// Subdirectory of the assets root holding this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Video => "videos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AssetKind::Image),
            "video" => Some(AssetKind::Video),
            _ => None,
        }
    }
}

/// How the asset URL was obtained from the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHint {
    Image,
    VideoSource,
    VideoPoster,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
    pub local_path: Option<String>,
}

/// Fields that can silently fall back to a default during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Status,
    Platforms,
    StartDate,
    EndDate,
    Asset,
    MultipleVersions,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::Platforms => "platforms",
            Field::StartDate => "start_date",
            Field::EndDate => "end_date",
            Field::Asset => "asset",
            Field::MultipleVersions => "multiple_versions",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fallbacks(BTreeSet<Field>);

impl Fallbacks {
    pub fn mark(&mut self, field: Field) {
        self.0.insert(field);
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdRecord {
    pub id: String,
    pub status: AdStatus,
    platforms: BTreeSet<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub asset: Option<Asset>,
    pub multiple_versions: bool,
    pub observed_at: DateTime<Utc>,
    pub fallbacks: Fallbacks,
}

impl AdRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: AdStatus::Unknown,
            platforms: default_platforms(),
            start_date: None,
            end_date: None,
            asset: None,
            multiple_versions: false,
            observed_at: Utc::now(),
            fallbacks: Fallbacks::default(),
        }
    }

    pub fn platforms(&self) -> &BTreeSet<String> {
        &self.platforms
    }

    /// Replace the platform set. An empty set is replaced by the default platform.
    pub fn set_platforms<I, S>(&mut self, platforms: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = platforms.into_iter().map(Into::into).collect();
        self.platforms = if set.is_empty() { default_platforms() } else { set };
    }

    pub fn local_path(&self) -> Option<&str> {
        self.asset.as_ref().and_then(|a| a.local_path.as_deref())
    }
}

fn default_platforms() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_PLATFORM.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platforms_never_empty() {
        let mut r = AdRecord::new("1");
        assert_eq!(r.platforms().len(), 1);
        r.set_platforms(Vec::<String>::new());
        assert!(r.platforms().contains(DEFAULT_PLATFORM));
        r.set_platforms(["Instagram"]);
        assert_eq!(r.platforms().iter().collect::<Vec<_>>(), vec!["Instagram"]);
    }

    #[test]
    fn status_parse() {
        assert_eq!(AdStatus::parse("Active"), Some(AdStatus::Active));
        assert_eq!(AdStatus::parse(" inactive "), Some(AdStatus::Inactive));
        assert_eq!(AdStatus::parse("paused"), None);
    }

    #[test]
    fn column_values_read_back() {
        for status in [AdStatus::Active, AdStatus::Inactive, AdStatus::Unknown] {
            assert_eq!(AdStatus::parse(status.as_str()), Some(status));
        }
        for kind in [AssetKind::Image, AssetKind::Video] {
            assert_eq!(AssetKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AssetKind::parse("Video"), None);
    }
}

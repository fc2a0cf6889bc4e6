pub mod dedup;
pub mod scroll;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assets::AssetFetcher;
use crate::model::{AdRecord, Field};
use crate::parser::FieldExtractor;
use crate::render::chromium::ChromiumPage;
use crate::render::RenderPage;
use scroll::{ScrollController, SessionState};

pub const ADS_LIBRARY_URL: &str = "https://www.facebook.com/ads/library/\
     ?active_status=all&ad_type=all&country=US&is_targeted_country=false\
     &media_type=all&search_type=page&view_all_page_id=15087023444";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where finished records go. Failures are logged by the collector, never fatal.
pub trait RecordSink {
    /// Insert or update by library id; returns the store's surrogate key.
    fn upsert(&mut self, record: &AdRecord) -> anyhow::Result<Option<i64>>;
}

/// Errors that end a session before any scanning happened.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to start the rendering engine")]
    Launch(#[source] BoxError),
    #[error("failed to open {url}")]
    Navigation {
        url: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub url: String,
    pub stall_limit: usize,
    pub iteration_limit: usize,
    pub settle: Duration,
    pub initial_wait: Duration,
    pub asset_concurrency: usize,
    pub show_progress: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            url: ADS_LIBRARY_URL.to_string(),
            stall_limit: 5,
            iteration_limit: 100,
            settle: Duration::from_secs(2),
            initial_wait: Duration::from_secs(5),
            asset_concurrency: 4,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    TargetReached,
    Stalled,
    IterationLimit,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::TargetReached => "target reached",
            Termination::Stalled => "stalled",
            Termination::IterationLimit => "iteration limit",
            Termination::Cancelled => "cancelled",
        })
    }
}

/// Counters accumulated while the loop runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub scans: usize,
    pub assets_downloaded: usize,
    pub fallbacks: BTreeMap<Field, usize>,
    pub unresolved_fingerprints: usize,
    pub sink_failures: usize,
}

impl Tally {
    fn count_fallbacks(&mut self, record: &AdRecord) {
        for field in record.fallbacks.iter() {
            *self.fallbacks.entry(field).or_default() += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub records: usize,
    pub termination: Termination,
    pub tally: Tally,
}

impl SessionSummary {
    pub fn log(&self) {
        info!(
            "Collected {} ads in {} scans ({}), {} assets downloaded",
            self.records, self.tally.scans, self.termination, self.tally.assets_downloaded
        );
        for (field, count) in &self.tally.fallbacks {
            info!("  {} defaulted on {} ads", field.as_str(), count);
        }
        if self.tally.unresolved_fingerprints > 0 {
            warn!(
                "{} platform icons did not match the platform table",
                self.tally.unresolved_fingerprints
            );
        }
        if self.tally.sink_failures > 0 {
            warn!("{} ads could not be persisted", self.tally.sink_failures);
        }
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub records: Vec<AdRecord>,
    pub summary: SessionSummary,
}

/// Owns the render handle and everything the scroll loop needs.
pub struct CollectionSession<P: RenderPage> {
    page: P,
    extractor: FieldExtractor,
    fetcher: AssetFetcher,
    options: SessionOptions,
    cancel: CancellationToken,
}

impl<P: RenderPage> CollectionSession<P> {
    pub fn new(page: P, extractor: FieldExtractor, fetcher: AssetFetcher, options: SessionOptions) -> Self {
        Self {
            page,
            extractor,
            fetcher,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Collect up to `target_count` distinct ads. The render handle is closed
    /// before returning, on every path.
    pub async fn collect(
        &mut self,
        target_count: usize,
        sink: &mut dyn RecordSink,
    ) -> Result<SessionOutcome, CollectError> {
        let url = self.options.url.clone();
        info!("Navigating to {}", url);
        if let Err(e) = self.page.open(&url).await {
            self.close_page().await;
            return Err(CollectError::Navigation {
                url,
                source: e.into(),
            });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.options.initial_wait) => {}
        }

        let progress = self.progress_bar(target_count);
        let mut state = SessionState::new(
            target_count,
            self.options.stall_limit,
            self.options.iteration_limit,
        );
        let mut tally = Tally::default();
        let termination = ScrollController {
            page: &mut self.page,
            extractor: &self.extractor,
            fetcher: &self.fetcher,
            cancel: &self.cancel,
            settle: self.options.settle,
            asset_concurrency: self.options.asset_concurrency,
            progress: progress.clone(),
        }
        .run(&mut state, sink, &mut tally)
        .await;
        progress.finish_and_clear();

        self.close_page().await;

        let records = state.into_records();
        let summary = SessionSummary {
            records: records.len(),
            termination,
            tally,
        };
        summary.log();
        Ok(SessionOutcome { records, summary })
    }

    async fn close_page(&mut self) {
        if let Err(e) = self.page.close().await {
            warn!("Failed to close page: {:#}", e);
        }
    }

    fn progress_bar(&self, target_count: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(target_count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ads ({per_sec})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb
    }
}

pub async fn launch_chromium(headless: bool) -> Result<ChromiumPage, CollectError> {
    ChromiumPage::launch(headless)
        .await
        .map_err(|e| CollectError::Launch(e.into()))
}

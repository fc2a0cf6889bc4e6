use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use super::{RecordSink, Tally, Termination};
use crate::assets::AssetFetcher;
use crate::model::AdRecord;
use crate::parser::{fields, Extraction, FieldExtractor};
use crate::render::{Locator, RenderPage};

static ITEM_LOCATOR: LazyLock<Locator> = LazyLock::new(|| Locator::css("div[class*='xh8yej3']"));

/// Working set of one collection run. Records keep first-observed order.
#[derive(Debug)]
pub struct SessionState {
    pub target_count: usize,
    collected: Vec<AdRecord>,
    dedup: Deduplicator,
    pub stall_count: usize,
    pub stall_limit: usize,
    pub iteration_count: usize,
    pub iteration_limit: usize,
    last_len: usize,
}

impl SessionState {
    pub fn new(target_count: usize, stall_limit: usize, iteration_limit: usize) -> Self {
        Self {
            target_count,
            collected: Vec::new(),
            dedup: Deduplicator::default(),
            stall_count: 0,
            stall_limit,
            iteration_count: 0,
            iteration_limit,
            last_len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.dedup.is_seen(id)
    }

    fn push(&mut self, record: AdRecord) {
        self.collected.push(record);
    }

    /// Close a scan: reset the stall counter on growth, bump it otherwise.
    pub fn end_scan(&mut self) {
        if self.collected.len() == self.last_len {
            self.stall_count += 1;
        } else {
            self.stall_count = 0;
            self.last_len = self.collected.len();
        }
    }

    pub fn termination(&self) -> Option<Termination> {
        if self.collected.len() >= self.target_count {
            Some(Termination::TargetReached)
        } else if self.stall_count >= self.stall_limit {
            Some(Termination::Stalled)
        } else if self.iteration_count >= self.iteration_limit {
            Some(Termination::IterationLimit)
        } else {
            None
        }
    }

    pub fn into_records(self) -> Vec<AdRecord> {
        self.collected
    }
}

/// Scan, extract, enrich, emit, scroll; until a termination condition holds.
pub struct ScrollController<'a, P: RenderPage> {
    pub page: &'a mut P,
    pub extractor: &'a FieldExtractor,
    pub fetcher: &'a AssetFetcher,
    pub cancel: &'a CancellationToken,
    pub settle: Duration,
    pub asset_concurrency: usize,
    pub progress: ProgressBar,
}

impl<P: RenderPage> ScrollController<'_, P> {
    pub async fn run(
        &mut self,
        state: &mut SessionState,
        sink: &mut dyn RecordSink,
        tally: &mut Tally,
    ) -> Termination {
        loop {
            if self.cancel.is_cancelled() {
                return Termination::Cancelled;
            }

            let batch = self.scan(state, tally).await;
            if !batch.is_empty() {
                debug!(
                    "Scan {}: {} new candidates ({} ids seen)",
                    tally.scans,
                    batch.len(),
                    state.dedup.len()
                );
            }

            // Records are finalized one by one as their asset step settles, so
            // a cancel only drops the downloads still in flight.
            let fetcher = self.fetcher;
            let mut enriched = std::pin::pin!(futures::stream::iter(batch)
                .map(|extraction| enrich(fetcher, extraction))
                .buffered(self.asset_concurrency.max(1)));
            loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Termination::Cancelled,
                    next = enriched.next() => next,
                };
                let Some((record, downloaded)) = next else {
                    break;
                };
                if downloaded {
                    tally.assets_downloaded += 1;
                }
                tally.count_fallbacks(&record);
                if let Err(e) = sink.upsert(&record) {
                    warn!("Failed to persist ad {}: {:#}", record.id, e);
                    tally.sink_failures += 1;
                }
                self.progress.inc(1);
                state.push(record);
            }

            state.end_scan();
            if let Some(done) = state.termination() {
                return done;
            }

            if let Err(e) = self.page.scroll_to_bottom().await {
                warn!("Scroll failed: {:#}", e);
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Termination::Cancelled,
                _ = tokio::time::sleep(self.settle) => {}
            }
            state.iteration_count += 1;
            if state.stall_count > 0 {
                info!(
                    "No new ads ({}/{} stalled scans, {} collected)",
                    state.stall_count,
                    state.stall_limit,
                    state.len()
                );
            }
        }
    }

    /// Candidates from the currently rendered cards, unseen ids only, capped
    /// so the batch never overshoots the target.
    async fn scan(&self, state: &mut SessionState, tally: &mut Tally) -> Vec<Extraction> {
        tally.scans += 1;
        let page: &P = &*self.page;
        let cards = match page.find_all(&ITEM_LOCATOR).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Could not enumerate ad cards: {:#}", e);
                Vec::new()
            }
        };

        let mut batch = Vec::new();
        for card in &cards {
            if state.len() + batch.len() >= state.target_count {
                break;
            }
            let Some(id) = fields::library_id(page, card).await else {
                continue;
            };
            if state.is_seen(&id) {
                continue;
            }
            let extraction = self.extractor.extract_with_id(page, card, id).await;
            if state.dedup.accept(&extraction.record.id) {
                tally.unresolved_fingerprints += extraction.unresolved_fingerprints;
                batch.push(extraction);
            }
        }
        batch
    }
}

/// Download the media of one extraction, if any. Failures leave `local_path` unset.
async fn enrich(fetcher: &AssetFetcher, extraction: Extraction) -> (AdRecord, bool) {
    let Extraction { mut record, media, .. } = extraction;
    let Some(media) = media else {
        return (record, false);
    };
    let path = fetcher.fetch(&media, &record.id).await;
    let downloaded = path.is_some();
    if let Some(asset) = record.asset.as_mut() {
        asset.local_path = path.map(|p| p.to_string_lossy().into_owned());
    }
    (record, downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_counter_resets_on_growth() {
        let mut state = SessionState::new(10, 2, 100);
        state.end_scan();
        assert_eq!(state.stall_count, 1);
        state.push(AdRecord::new("1"));
        state.end_scan();
        assert_eq!(state.stall_count, 0);
        state.end_scan();
        assert_eq!(state.termination(), None);
        state.end_scan();
        assert_eq!(state.termination(), Some(Termination::Stalled));
    }

    #[test]
    fn target_wins_over_other_conditions() {
        let mut state = SessionState::new(1, 1, 0);
        assert_eq!(state.termination(), Some(Termination::IterationLimit));
        state.push(AdRecord::new("1"));
        state.end_scan();
        state.stall_count = 5;
        assert_eq!(state.termination(), Some(Termination::TargetReached));
    }
}

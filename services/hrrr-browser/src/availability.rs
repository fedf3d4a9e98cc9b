//! Tracks which local hours of the selected day have renderable data.
//!
//! A local day spans one or two UTC dates, so each local hour is first mapped
//! to the UTC file that covers it. Warming issues one speculative request per
//! hour (most recent first) and returns once the first few have finished or a
//! timeout elapses, whichever comes first. The remaining requests keep running
//! and keep filling the set. Every warm-up bumps a generation counter; results
//! tagged with an older generation are dropped so a late response for a
//! previous date or layer never lands in the current set.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::future::join_all;
use hrrr_common::{LayerId, TimeConverter, UtcSlot};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, ImageSource};
use crate::url_builder::ImageUrlBuilder;

pub const HOURS_PER_DAY: u32 = 24;

/// The (local date, layer) pair the cached hours belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
    pub date: NaiveDate,
    pub layer: LayerId,
}

impl CacheScope {
    pub fn new(date: NaiveDate, layer: LayerId) -> Self {
        Self { date, layer }
    }
}

/// How long `warm` waits before reporting ready.
#[derive(Debug, Clone, Copy)]
pub struct WarmConfig {
    /// Number of leading (most recent) requests to wait for
    pub gate_size: usize,
    /// Upper bound on the wait
    pub gate_timeout: Duration,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            gate_size: 5,
            gate_timeout: Duration::from_secs(5),
        }
    }
}

/// Summary of a warm-up at the moment it reported ready.
#[derive(Debug, Clone)]
pub struct WarmReport {
    pub scope: CacheScope,
    pub generation: u64,
    pub launched: usize,
    /// True if the gate requests all finished before the timeout
    pub gate_completed: bool,
    /// Local hours known to be available when the gate opened, ascending
    pub available: Vec<u32>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct CacheState {
    scope: Option<CacheScope>,
    generation: u64,
    /// Local hour each UTC file of the scope stands for
    slots: HashMap<UtcSlot, u32>,
    hours: BTreeSet<u32>,
    /// Arrival order of `hours`
    order: Vec<u32>,
}

impl CacheState {
    fn local_hour(&self, layer: &LayerId, slot: &UtcSlot) -> Option<u32> {
        match &self.scope {
            Some(scope) if scope.layer == *layer => self.slots.get(slot).copied(),
            _ => None,
        }
    }

    fn record(&mut self, generation: u64, hour: u32) -> bool {
        if generation != self.generation {
            return false;
        }
        if self.hours.insert(hour) {
            self.order.push(hour);
        }
        true
    }
}

/// In-memory set of available local hours for one (date, layer).
pub struct AvailabilityCache {
    state: Arc<RwLock<CacheState>>,
    config: WarmConfig,
}

impl AvailabilityCache {
    pub fn new(config: WarmConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            config,
        }
    }

    pub fn config(&self) -> WarmConfig {
        self.config
    }

    /// Switch to a new scope: clear all hours and start a new generation.
    pub async fn reset(&self, converter: &TimeConverter, scope: CacheScope) -> u64 {
        let plan = day_plan(converter, scope.date);
        self.install(scope, &plan).await
    }

    async fn install(&self, scope: CacheScope, plan: &[(u32, UtcSlot)]) -> u64 {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.scope = Some(scope);
        state.slots = plan.iter().map(|(hour, slot)| (*slot, *hour)).collect();
        state.hours.clear();
        state.order.clear();
        debug!(generation = state.generation, "Availability cache reset");
        state.generation
    }

    /// Reset to `scope` and request every hour of its local date.
    pub async fn warm(
        &self,
        source: Arc<dyn ImageSource>,
        builder: &ImageUrlBuilder,
        converter: &TimeConverter,
        scope: CacheScope,
    ) -> WarmReport {
        let start = Instant::now();
        let plan = day_plan(converter, scope.date);
        let generation = self.install(scope.clone(), &plan).await;

        info!(
            date = %scope.date,
            layer = %scope.layer,
            generation = generation,
            files = plan.len(),
            "Starting availability warm-up"
        );

        let mut handles = Vec::with_capacity(plan.len());
        for (hour, slot) in plan {
            let Some(url) = builder.for_slot(&slot, scope.layer.as_str()) else {
                continue;
            };

            let source = source.clone();
            let state = self.state.clone();
            handles.push(tokio::spawn(async move {
                check_hour(source, state, generation, hour, slot, url).await
            }));
        }

        let launched = handles.len();
        let rest = handles.split_off(self.config.gate_size.min(launched));
        // rest detaches on drop and keeps populating the set
        drop(rest);

        let gate_completed = tokio::time::timeout(self.config.gate_timeout, join_all(handles))
            .await
            .is_ok();

        let available = self.hours().await;
        let elapsed = start.elapsed();
        info!(
            generation = generation,
            launched = launched,
            gate_completed = gate_completed,
            available = ?available,
            elapsed_ms = elapsed.as_millis() as u64,
            "Initial warm-up completed"
        );

        WarmReport {
            scope,
            generation,
            launched,
            gate_completed,
            available,
            elapsed,
        }
    }

    /// Record an hour confirmed by a foreground fetch. Ignored if `scope`
    /// is not the active one.
    pub async fn mark_available(&self, scope: &CacheScope, hour: u32) -> bool {
        let mut state = self.state.write().await;
        if state.scope.as_ref() != Some(scope) {
            return false;
        }
        let generation = state.generation;
        state.record(generation, hour)
    }

    /// [`mark_available`](Self::mark_available) keyed by the UTC file that
    /// was fetched. Ignored unless the file belongs to the active scope.
    pub async fn mark_slot(&self, layer: &LayerId, slot: UtcSlot) -> bool {
        let mut state = self.state.write().await;
        let Some(hour) = state.local_hour(layer, &slot) else {
            return false;
        };
        let generation = state.generation;
        state.record(generation, hour)
    }

    pub async fn contains(&self, scope: &CacheScope, hour: u32) -> bool {
        let state = self.state.read().await;
        state.scope.as_ref() == Some(scope) && state.hours.contains(&hour)
    }

    pub async fn contains_slot(&self, layer: &LayerId, slot: &UtcSlot) -> bool {
        let state = self.state.read().await;
        state
            .local_hour(layer, slot)
            .is_some_and(|hour| state.hours.contains(&hour))
    }

    /// Highest available hour.
    pub async fn most_recent_hour(&self) -> Option<u32> {
        self.state.read().await.hours.last().copied()
    }

    /// Available hour closest to `target`; ties go to the smaller hour.
    pub async fn nearest_hour(&self, target: u32) -> Option<u32> {
        nearest_hour(self.state.read().await.hours.iter().copied(), target)
    }

    /// Available hours, ascending.
    pub async fn hours(&self) -> Vec<u32> {
        self.state.read().await.hours.iter().copied().collect()
    }

    /// Available hours in the order they were confirmed.
    pub async fn order(&self) -> Vec<u32> {
        self.state.read().await.order.clone()
    }

    pub async fn scope(&self) -> Option<CacheScope> {
        self.state.read().await.scope.clone()
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }
}

/// Local hours of `date`, newest first, each paired with the UTC file that
/// covers it. A nonexistent local hour shares its file with the next hour
/// and is left out.
pub fn day_plan(converter: &TimeConverter, date: NaiveDate) -> Vec<(u32, UtcSlot)> {
    let mut plan: Vec<(u32, UtcSlot)> = Vec::with_capacity(HOURS_PER_DAY as usize);
    for hour in (0..HOURS_PER_DAY).rev() {
        match converter.local_to_utc(date, hour) {
            Ok(slot) if !plan.iter().any(|(_, s)| *s == slot) => plan.push((hour, slot)),
            Ok(_) => {}
            Err(e) => warn!(hour = hour, error = %e, "Cannot map local hour"),
        }
    }
    plan
}

async fn check_hour(
    source: Arc<dyn ImageSource>,
    state: Arc<RwLock<CacheState>>,
    generation: u64,
    hour: u32,
    slot: UtcSlot,
    url: String,
) -> bool {
    match source.fetch(&url).await {
        Ok(_) => {
            let recorded = state.write().await.record(generation, hour);
            if recorded {
                debug!(hour = hour, slot = %slot, "Cached hour");
            } else {
                debug!(hour = hour, generation = generation, "Discarding stale availability result");
            }
            recorded
        }
        Err(FetchError::Cancelled) => false,
        Err(e) => {
            warn!(hour = hour, slot = %slot, error = %e, "Error pre-caching hour");
            false
        }
    }
}

/// Scan ascending so the first minimum wins, i.e. ties prefer the smaller hour.
pub fn nearest_hour(hours: impl IntoIterator<Item = u32>, target: u32) -> Option<u32> {
    let mut sorted: Vec<u32> = hours.into_iter().collect();
    sorted.sort_unstable();

    let mut best: Option<(u32, u32)> = None;
    for hour in sorted {
        let diff = hour.abs_diff(target);
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((hour, diff)),
        }
    }
    best.map(|(hour, _)| hour)
}

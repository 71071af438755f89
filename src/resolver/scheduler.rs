// Tier scheduler - races the fast tier, then walks the heavy tiers in order
//
// Per request:
//   Init -> Tier1Race -> Resolved
//                     -> Tier2Fallback -> Resolved | Exhausted
//
// Tier 1 engines all start at once and the first non-absent result wins,
// bounded by a hard deadline. Losers are aborted with the JoinSet; whatever
// they would have returned is never looked at. Tiers 2 and up run one engine
// at a time in registration order.

use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::models::{EngineResult, EngineWeight, MediaReference, ResolutionOutcome};
use super::traits::{Engine, EngineContext};

/// Tier number of the parallel race
pub const RACE_TIER: u8 = 1;

/// Engines grouped by tier; insertion order inside a tier is fallback order
#[derive(Clone, Default)]
pub struct TierTable {
    tiers: BTreeMap<u8, Vec<Arc<dyn Engine>>>,
}

impl TierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tier 0 is treated as tier 1
    pub fn register(&mut self, tier: u8, engine: Arc<dyn Engine>) {
        self.tiers.entry(tier.max(RACE_TIER)).or_default().push(engine);
    }

    pub fn with(mut self, tier: u8, engine: Arc<dyn Engine>) -> Self {
        self.register(tier, engine);
        self
    }

    pub fn tier(&self, tier: u8) -> &[Arc<dyn Engine>] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tiers after the race, ascending
    fn sequential_tiers(&self) -> impl Iterator<Item = (u8, &[Arc<dyn Engine>])> {
        self.tiers
            .range(RACE_TIER + 1..)
            .map(|(tier, engines)| (*tier, engines.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    /// `(tier, engine name)` pairs in scheduling order
    pub fn engine_names(&self) -> Vec<(u8, &'static str)> {
        self.tiers
            .iter()
            .flat_map(|(tier, engines)| engines.iter().map(move |e| (*tier, e.name())))
            .collect()
    }
}

impl fmt::Debug for TierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.engine_names()).finish()
    }
}

/// Time budgets used by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    /// Hard wall-clock limit for the whole tier-1 race
    pub tier1_deadline: Duration,
    /// Per-attempt limit for light engines
    pub engine_timeout: Duration,
    /// Per-attempt limit for heavy engines
    pub heavy_engine_timeout: Duration,
}

impl Default for TierTimeouts {
    fn default() -> Self {
        Self {
            tier1_deadline: Duration::from_secs(12),
            engine_timeout: Duration::from_secs(8),
            heavy_engine_timeout: Duration::from_secs(45),
        }
    }
}

impl TierTimeouts {
    fn for_engine(&self, engine: &dyn Engine, tier: u8) -> Duration {
        let limit = match engine.weight() {
            EngineWeight::Light => self.engine_timeout,
            EngineWeight::Heavy => self.heavy_engine_timeout,
        };
        if tier == RACE_TIER {
            limit.min(self.tier1_deadline)
        } else {
            limit
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Init,
    Tier1Race,
    Tier2Fallback,
    Resolved,
    Exhausted,
}

impl SchedulerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Exhausted)
    }
}

/// What happened to one engine attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Succeeded,
    Absent,
    /// Per-engine timeout elapsed
    TimedOut,
    /// Engine panicked; treated as absent
    Panicked,
    /// Still running when the race ended; aborted and ignored
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub engine: &'static str,
    pub tier: u8,
    pub status: AttemptStatus,
    pub elapsed: Duration,
}

/// Terminal outcome plus how the scheduler got there
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub outcome: ResolutionOutcome,
    pub state: SchedulerState,
    /// In completion order
    pub attempts: Vec<AttemptRecord>,
    pub elapsed: Duration,
}

impl ResolutionReport {
    pub fn attempts_for(&self, engine: &str) -> impl Iterator<Item = &AttemptRecord> {
        let engine = engine.to_string();
        self.attempts.iter().filter(move |a| a.engine == engine)
    }
}

/// Mutable state of one resolution; only the first terminal transition sticks
struct Run {
    state: SchedulerState,
    winner: Option<EngineResult>,
    attempts: Vec<AttemptRecord>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: SchedulerState::Init,
            winner: None,
            attempts: Vec::new(),
        }
    }

    fn enter(&mut self, next: SchedulerState) {
        if self.state.is_terminal() || self.state == next {
            return;
        }
        debug!(from = ?self.state, to = ?next, "Scheduler transition");
        self.state = next;
    }

    /// Returns false when the run was already terminal; the result is dropped
    fn resolve(&mut self, result: EngineResult) -> bool {
        if self.state.is_terminal() {
            debug!(engine = result.engine_name.as_str(), "Ignoring result after terminal state");
            return false;
        }
        self.state = SchedulerState::Resolved;
        self.winner = Some(result);
        true
    }

    fn record(&mut self, engine: &'static str, tier: u8, status: AttemptStatus, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match status {
            AttemptStatus::Succeeded => info!(engine, tier, elapsed_ms, "Engine produced a result"),
            AttemptStatus::Panicked => warn!(engine, tier, elapsed_ms, "Engine panicked; treating as absent"),
            _ => debug!(engine, tier, elapsed_ms, status = ?status, "Engine gave nothing"),
        }
        self.attempts.push(AttemptRecord {
            engine,
            tier,
            status,
            elapsed,
        });
    }
}

struct Attempt {
    index: usize,
    status: AttemptStatus,
    result: Option<EngineResult>,
    elapsed: Duration,
}

/// One engine call: per-engine timeout, panic containment, empty-URL guard
async fn run_attempt(
    index: usize,
    engine: Arc<dyn Engine>,
    media: Arc<MediaReference>,
    ctx: EngineContext,
) -> Attempt {
    let started = Instant::now();
    let call = AssertUnwindSafe(engine.attempt(&media, &ctx)).catch_unwind();

    let (status, result) = match timeout(ctx.timeout, call).await {
        Ok(Ok(Some(result))) if !result.play_url.trim().is_empty() => {
            (AttemptStatus::Succeeded, Some(result))
        }
        Ok(Ok(_)) => (AttemptStatus::Absent, None),
        Ok(Err(_)) => (AttemptStatus::Panicked, None),
        Err(_) => (AttemptStatus::TimedOut, None),
    };

    Attempt {
        index,
        status,
        result,
        elapsed: started.elapsed(),
    }
}

pub struct TierScheduler {
    timeouts: TierTimeouts,
}

impl TierScheduler {
    pub fn new(timeouts: TierTimeouts) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> &TierTimeouts {
        &self.timeouts
    }

    /// Drive one resolution to a terminal state
    pub async fn run(
        &self,
        table: &TierTable,
        media: &MediaReference,
        ctx: &EngineContext,
    ) -> ResolutionReport {
        let started = Instant::now();
        let media = Arc::new(media.clone());
        let mut run = Run::new();

        run.enter(SchedulerState::Tier1Race);
        self.race(table.tier(RACE_TIER), &media, ctx, &mut run).await;

        if !run.state.is_terminal() {
            run.enter(SchedulerState::Tier2Fallback);
            'tiers: for (tier, engines) in table.sequential_tiers() {
                for engine in engines {
                    if self.attempt_one(tier, engine, &media, ctx, &mut run).await {
                        break 'tiers;
                    }
                }
            }
        }

        if !run.state.is_terminal() {
            run.enter(SchedulerState::Exhausted);
        }

        let elapsed = started.elapsed();
        match &run.winner {
            Some(winner) => info!(
                id = media.canonical_id.as_str(),
                engine = winner.engine_name.as_str(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Resolved"
            ),
            None => info!(
                id = media.canonical_id.as_str(),
                attempts = run.attempts.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Exhausted all tiers"
            ),
        }

        ResolutionReport {
            outcome: run.winner.into(),
            state: run.state,
            attempts: run.attempts,
            elapsed,
        }
    }

    /// Tier 1: everything at once, first result wins, hard deadline
    async fn race(
        &self,
        engines: &[Arc<dyn Engine>],
        media: &Arc<MediaReference>,
        ctx: &EngineContext,
        run: &mut Run,
    ) {
        if engines.is_empty() {
            return;
        }

        let started = Instant::now();
        let deadline = started + self.timeouts.tier1_deadline;
        let mut finished = vec![false; engines.len()];
        let mut set = JoinSet::new();

        for (index, engine) in engines.iter().enumerate() {
            let limit = self.timeouts.for_engine(engine.as_ref(), RACE_TIER);
            set.spawn(run_attempt(
                index,
                engine.clone(),
                media.clone(),
                ctx.with_timeout(limit),
            ));
        }
        debug!(engines = engines.len(), "Tier 1 race started");

        let race = async {
            while let Some(joined) = set.join_next().await {
                let attempt = match joined {
                    Ok(attempt) => attempt,
                    Err(e) => {
                        // run_attempt contains panics, so this is a runtime shutdown
                        warn!(error = %e, "Tier 1 task failed to join");
                        continue;
                    }
                };

                finished[attempt.index] = true;
                let name = engines[attempt.index].name();
                run.record(name, RACE_TIER, attempt.status, attempt.elapsed);

                if let Some(result) = attempt.result {
                    if run.resolve(result) {
                        return;
                    }
                }
            }
        };

        if timeout_at(deadline, race).await.is_err() {
            warn!(
                deadline_ms = self.timeouts.tier1_deadline.as_millis() as u64,
                "Tier 1 deadline elapsed"
            );
        }

        // Losers and stragglers: abort, record, never await their results
        set.abort_all();
        let elapsed = started.elapsed();
        for (index, done) in finished.iter().enumerate() {
            if !done {
                run.record(engines[index].name(), RACE_TIER, AttemptStatus::Abandoned, elapsed);
            }
        }
    }

    /// One sequential attempt on its own task; true when it resolved the run
    async fn attempt_one(
        &self,
        tier: u8,
        engine: &Arc<dyn Engine>,
        media: &Arc<MediaReference>,
        ctx: &EngineContext,
        run: &mut Run,
    ) -> bool {
        let limit = self.timeouts.for_engine(engine.as_ref(), tier);
        debug!(engine = engine.name(), tier, limit_ms = limit.as_millis() as u64, "Trying engine");

        let handle = tokio::spawn(run_attempt(0, engine.clone(), media.clone(), ctx.with_timeout(limit)));
        let started = Instant::now();
        let attempt = match handle.await {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(engine = engine.name(), error = %e, "Engine task failed to join");
                Attempt {
                    index: 0,
                    status: AttemptStatus::Panicked,
                    result: None,
                    elapsed: started.elapsed(),
                }
            }
        };

        run.record(engine.name(), tier, attempt.status, attempt.elapsed);
        match attempt.result {
            Some(result) => run.resolve(result),
            None => false,
        }
    }
}

impl Default for TierScheduler {
    fn default() -> Self {
        Self::new(TierTimeouts::default())
    }
}

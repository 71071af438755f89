// Scripted engine - a reference engine with programmable behavior
//
// Stands in for a real upstream when exercising the scheduler and the
// resolver: fixed delay, fixed outcome, and counters for how often it was
// called and how often it actually finished.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::resolver::models::{EngineResult, EngineWeight, MediaReference};
use crate::resolver::traits::{Engine, EngineContext};

#[derive(Debug, Clone)]
pub enum Script {
    Succeed(EngineResult),
    Absent,
    Panic,
    /// Never completes
    Hang,
}

#[derive(Debug)]
pub struct ScriptedEngine {
    name: &'static str,
    script: Script,
    delay: Duration,
    weight: EngineWeight,
    calls: Arc<AtomicUsize>,
    completions: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new(name: &'static str, script: Script) -> Self {
        Self {
            name,
            script,
            delay: Duration::ZERO,
            weight: EngineWeight::Light,
            calls: Arc::new(AtomicUsize::new(0)),
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Succeeds with a result carrying this engine's name
    pub fn succeeding(name: &'static str, play_url: &str) -> Self {
        match EngineResult::new(name, format!("{} video", name), play_url) {
            Some(result) => Self::new(name, Script::Succeed(result)),
            None => Self::new(name, Script::Absent),
        }
    }

    /// Returns `result` verbatim, whatever it contains
    pub fn returning(name: &'static str, result: EngineResult) -> Self {
        Self::new(name, Script::Succeed(result))
    }

    pub fn absent(name: &'static str) -> Self {
        Self::new(name, Script::Absent)
    }

    pub fn panicking(name: &'static str) -> Self {
        Self::new(name, Script::Panic)
    }

    pub fn hanging(name: &'static str) -> Self {
        Self::new(name, Script::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_ms(self, millis: u64) -> Self {
        self.with_delay(Duration::from_millis(millis))
    }

    pub fn with_weight(mut self, weight: EngineWeight) -> Self {
        self.weight = weight;
        self
    }

    /// Number of `attempt` calls started
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Number of `attempt` calls that ran to completion
    pub fn completions(&self) -> Arc<AtomicUsize> {
        self.completions.clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn weight(&self) -> EngineWeight {
        self.weight
    }

    async fn attempt(&self, _media: &MediaReference, _ctx: &EngineContext) -> Option<EngineResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match &self.script {
            Script::Succeed(result) => Some(result.clone()),
            Script::Absent => None,
            Script::Panic => panic!("scripted engine {} panicked", self.name),
            Script::Hang => std::future::pending().await,
        };

        self.completions.fetch_add(1, Ordering::SeqCst);
        result
    }
}

// Resolver module - turns a video link into one directly playable URL
//
// normalizer  -> canonical video id, or InvalidReference before any I/O
// scheduler   -> tier-1 race under a deadline, then heavy tiers in order
// ranker      -> best variant out of everything an engine found
// coordinator -> wires config, context and engines into one entry point

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod engines;
pub mod errors;
pub mod models;
pub mod network;
pub mod normalizer;
pub mod proxy_pool;
pub mod ranker;
pub mod scheduler;
pub mod traits;
pub mod utils;

pub use config::ResolverConfig;
pub use coordinator::{Resolver, ResolverBuilder};
pub use diagnostics::{diagnose_error, BlockingReason};
pub use errors::{ConfigError, EngineError, NormalizationError, ResolveError};
pub use models::{CandidateVariant, EngineResult, EngineWeight, MediaReference, ResolutionOutcome};
pub use normalizer::normalize;
pub use ranker::rank;
pub use scheduler::{
    AttemptRecord, AttemptStatus, ResolutionReport, SchedulerState, TierScheduler, TierTable,
    TierTimeouts,
};
pub use traits::{Engine, EngineContext};

// tube-resolver - first playable media URL out of several racing engines

pub mod resolver;

pub use resolver::{
    normalize, Engine, EngineContext, EngineResult, ResolutionOutcome, ResolutionReport,
    ResolveError, Resolver, ResolverConfig,
};

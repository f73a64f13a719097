#![forbid(unsafe_code)]

mod error;
mod access;
mod context;
mod facts;
mod lockset;
mod options;
mod pair;
mod pipeline;
mod simplify;
mod summary;
mod trace;
pub mod names;

pub use error::InstrumentError;
pub use access::{AccessInstrumenter, RawAccess, raw_accesses};
pub use context::{AnalysisContext, InstrumentationRegion, LocksetAnalysisRegion, LocksetVar, RoleCopy};
pub use facts::{EntryPointPair, Lock, MemoryRegion, SharedStateFacts};
pub use lockset::LocksetTracker;
pub use options::PipelineOptions;
pub use pair::{CHECKS_LABEL, PairReducer};
pub use pipeline::{PassTiming, Pipeline, PipelineReport};
pub use simplify::ProgramSimplifier;
pub use summary::{EntryPointGuesses, GuessKey, GuessMinter, PairGuesses, SummaryGuesser};
pub use trace::{TraceAnnotator, strip_source_locations};

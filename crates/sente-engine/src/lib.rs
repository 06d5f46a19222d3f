//! Search for sente: iterative-deepening PVS over a shared transposition
//! table, driven by a Lazy SMP thread pool and a clock-aware time manager.

pub mod config;
pub mod error;
pub mod limits;
pub mod search;
pub mod time;

pub use config::{EngineConfig, SearchParams};
pub use error::EngineError;
pub use limits::Limits;
pub use search::control::SearchControl;
pub use search::{BestMoveResult, InfoCallback, Outcome, ScoreBound, SearchInfo, ThreadPool};
pub use time::{TimeManager, TimeOptions};

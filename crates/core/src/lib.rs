pub mod config;
pub mod errors;

pub use config::{
    AnalysisConfig, AppConfig, DedupConfig, QueueConfig, RetrievalConfig, WorkerConfig,
};
pub use errors::{CorretorError, CorretorResult, EssayRejection};

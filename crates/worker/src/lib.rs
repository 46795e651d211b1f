pub mod consolidator;
pub mod service;

pub use consolidator::Consolidator;
pub use service::WorkerService;

pub mod entities;
pub mod fingerprint;
pub mod ports;
pub mod report;

pub use entities::*;
pub use fingerprint::ContentFingerprint;
pub use ports::*;
pub use report::*;

pub use corretor_core::{CorretorError, CorretorResult, EssayRejection};

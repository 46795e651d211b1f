pub mod intake;
pub mod recovery;

pub use intake::{SubmissionService, SubmitOutcome};
pub use recovery::RecoveryService;

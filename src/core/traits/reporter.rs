use crate::{
    core::domain::{Outcome, Submission},
    error::Result,
};

/// Receives every classified outcome exactly once, as it completes.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Reporter: std::fmt::Debug + Send + Sync {
    async fn report(&self, submission: &Submission, outcome: &Outcome) -> Result<()>;
}

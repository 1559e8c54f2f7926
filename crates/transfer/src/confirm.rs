//! Yes/no decisions the orchestrator cannot make alone.

/// Asks the operator a yes/no question.
///
/// Used when a scan result is `ERROR` and for per-file prompts in batch
/// transfers. Anything other than an explicit yes must return `false`.
pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// Declines every question. The default for non-interactive use.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

/// Accepts every question.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysProceed;

impl Confirm for AlwaysProceed {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

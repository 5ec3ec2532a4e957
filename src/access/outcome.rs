//! Isolate-and-collect bookkeeping: every unit of work ends up as one outcome.

use crate::access::plan::Area;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Done,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub area: Area,
    pub action: String,
    pub status: OutcomeStatus,
}

impl ActionOutcome {
    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }
}

#[derive(Debug, Default)]
pub struct OutcomeLog {
    outcomes: Vec<ActionOutcome>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of one action; returns whether it succeeded
    pub fn record(&mut self, area: Area, action: impl Into<String>, result: Result<()>) -> bool {
        let action = action.into();
        let status = match result {
            Ok(()) => {
                tracing::info!("[{}] {}: done", area.tag(), action);
                OutcomeStatus::Done
            }
            Err(e) if e.is_skip() => {
                tracing::warn!("[{}] {}: skipped ({})", area.tag(), action, e);
                OutcomeStatus::Skipped(e.to_string())
            }
            Err(e) => {
                tracing::warn!("[{}] {}: FAILED ({})", area.tag(), action, e);
                OutcomeStatus::Failed(e.to_string())
            }
        };

        let succeeded = status == OutcomeStatus::Done;
        self.outcomes.push(ActionOutcome { area, action, status });
        succeeded
    }

    pub fn skip(&mut self, area: Area, action: impl Into<String>, reason: impl Into<String>) {
        let action = action.into();
        let reason = reason.into();
        tracing::warn!("[{}] {}: skipped ({})", area.tag(), action, reason);
        self.outcomes.push(ActionOutcome {
            area,
            action,
            status: OutcomeStatus::Skipped(reason),
        });
    }

    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ActionOutcome> {
        self.outcomes
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribution::Attribution;

/// Why the orchestration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FinalAnswer,
    TurnLimitExceeded,
}

/// Result of answering one user query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub session_id: Uuid,
    pub answer_text: String,
    /// Every attribution folded into the session, in first-seen order.
    pub attributions: Vec<Attribution>,
    /// Set when the loop ran out of turns; the text is then the last
    /// assistant output and is not a vetted final answer.
    pub incomplete: bool,
    pub stop_reason: StopReason,
    /// Number of model calls made.
    pub turns: u32,
    /// Number of tool invocations folded into the session.
    pub tool_calls: u32,
}

impl Answer {
    /// True when at least one piece of attributed evidence backs the answer.
    pub fn is_grounded(&self) -> bool {
        !self.attributions.is_empty()
    }
}

//! The standard advisors.
//!
//! - **Memory** (100): conversation history in, final answer out
//! - **Planning** (200): one structured plan per request
//! - **IterativeReasoning** (300): bounded verify → analyze → next-step loop
//! - **NextStep** (400): single best next action
//! - **CriticalThinker** (500): post-hoc review of the answer

pub mod critical;
pub mod iterative;
pub mod memory;
pub mod next_step;
pub mod planning;

pub use critical::CriticalThinker;
pub use iterative::IterativeReasoningAdvisor;
pub use memory::MemoryAdvisor;
pub use next_step::NextStepAdvisor;
pub use planning::PlanningAdvisor;

use deliberate_core::message::Message;
use serde::Serialize;
use tracing::warn;

/// Messages of recent history shown to advisor prompts.
pub(crate) const PROMPT_HISTORY: usize = 10;

/// Render a piece of advice as a system note for the model. Advice that
/// cannot be encoded is left out.
pub(crate) fn advice_note<T: Serialize>(advisor: &str, label: &str, advice: &T) -> Option<Message> {
    match serde_json::to_string_pretty(advice) {
        Ok(json) => Some(Message::system(format!("{label}:\n{json}")).with_metadata("advisor", advisor.into())),
        Err(e) => {
            warn!(advisor, error = %e, "Could not encode advice, omitting it from history");
            None
        }
    }
}

//! Token-budget truncation of conversation history.
//!
//! Token counts are estimated with a character heuristic (~4 characters per
//! token, rounded up, plus a fixed per-message overhead for role and
//! delimiters). Accurate within ~10% for BPE tokenizers on English text.

use deliberate_core::message::Message;
use tracing::debug;

/// Per-message overhead for role name and wire-format delimiters.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimates how many tokens a message costs.
pub trait TokenEstimator {
    fn estimate(&self, message: &Message) -> usize;
}

impl<F> TokenEstimator for F
where
    F: Fn(&Message) -> usize,
{
    fn estimate(&self, message: &Message) -> usize {
        self(message)
    }
}

/// The default ~4 chars/token heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristicEstimator;

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, message: &Message) -> usize {
        MESSAGE_OVERHEAD + estimate_tokens(&message.content)
    }
}

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Bound `messages` to `budget` estimated tokens by dropping the oldest first.
///
/// Returns the input unchanged when it already fits, otherwise the longest
/// suffix that fits. When not even the newest message fits, the result is
/// empty: the history is dropped rather than sent over budget.
pub fn truncate<E>(messages: &[Message], estimator: &E, budget: usize) -> Vec<Message>
where
    E: TokenEstimator + ?Sized,
{
    let sizes: Vec<usize> = messages.iter().map(|m| estimator.estimate(m)).collect();
    let mut total: usize = sizes.iter().sum();
    if total <= budget {
        return messages.to_vec();
    }

    let mut start = 0;
    while total > budget && start < messages.len() {
        total -= sizes[start];
        start += 1;
    }

    debug!(
        dropped = start,
        kept = messages.len() - start,
        budget,
        "Truncated history to token budget"
    );
    messages[start..].to_vec()
}

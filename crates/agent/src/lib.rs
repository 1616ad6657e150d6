//! The reasoning layer of deliberate.
//!
//! A chat request passes through an [`AdvisorChain`] before it reaches the
//! model and again on its way back:
//!
//! 1. **Memory** loads the conversation history, bounded to a token budget
//! 2. **Planning** decomposes the query into a [`QueryPlan`]
//! 3. **Iterative reasoning** verifies the context, analyzes required skills
//!    once and picks next steps, for a bounded number of rounds
//! 4. **Next step** optionally picks one more action
//! 5. The **model** answers, running any tools it asks for
//! 6. **Critical review** may append a revised answer
//! 7. **Memory** stores the final answer
//!
//! Every advisor is fail-soft: a failed reasoning call yields a documented
//! default, so a request always reaches the model.

pub mod advice;
pub mod advisor;
pub mod advisors;
pub mod chain;
pub mod envelope;
pub mod invoker;
pub mod pipeline;
pub mod prompts;
pub mod stage;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use advice::{ContextVerification, CriticalReview, NextStepPlan, PlanStep, QueryPlan, VerificationSummary};
pub use advisor::Advisor;
pub use advisors::{CriticalThinker, IterativeReasoningAdvisor, MemoryAdvisor, NextStepAdvisor, PlanningAdvisor};
pub use chain::AdvisorChain;
pub use envelope::{AdvisedRequest, AdvisedResponse, ChatResult, Generation, RequestContext};
pub use invoker::{AdviceError, ModelInvoker, OutputShape, Prompt};
pub use pipeline::standard_chain;
pub use stage::ModelStage;
pub use stream_event::ChainStreamEvent;

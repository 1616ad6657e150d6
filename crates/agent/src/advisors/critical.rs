//! Critical review of the final answer.
//!
//! When the reviewer judges plan and answer not optimal and offers a better
//! answer, that answer is appended as a new candidate. The original stays in
//! place; consumers take the last candidate.

use async_trait::async_trait;
use deliberate_core::message::Message;
use tracing::{debug, info, warn};

use crate::advice::CriticalReview;
use crate::advisor::Advisor;
use crate::envelope::{AdvisedResponse, Generation};
use crate::invoker::{ModelInvoker, Prompt};
use crate::prompts::{CRITIC_SYSTEM, CRITIC_TEMPLATE};

pub const ORDER: i32 = 500;

pub struct CriticalThinker {
    invoker: ModelInvoker,
}

impl CriticalThinker {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Advisor for CriticalThinker {
    fn name(&self) -> &str {
        "critical_thinker"
    }

    fn order(&self) -> i32 {
        ORDER
    }

    async fn after(&self, mut response: AdvisedResponse) -> AdvisedResponse {
        let Some(answer) = response.final_text().map(str::to_string) else {
            debug!("No answer to review");
            return response;
        };

        let plan = response
            .context
            .plan
            .as_ref()
            .and_then(|p| serde_json::to_string_pretty(p).ok())
            .unwrap_or_else(|| "(no plan recorded)".into());
        let prompt = Prompt::new(CRITIC_TEMPLATE)
            .with_system(CRITIC_SYSTEM)
            .param("query", response.query.as_str())
            .param("plan", plan)
            .param("answer", answer);

        let review: CriticalReview = match self.invoker.structured(&prompt).await {
            Ok(review) => review,
            Err(e) => {
                warn!(error = %e, "Critical review failed, keeping the answer");
                return response;
            }
        };

        if review.is_optimal {
            debug!("Answer judged optimal");
            return response;
        }
        let Some(improved) = review.improved_answer.filter(|a| !a.trim().is_empty()) else {
            debug!(critique = %review.critique, "Answer judged not optimal but no replacement offered");
            return response;
        };

        info!(critique = %review.critique, "Appending revised answer");
        if let Some(result) = response.response.as_mut() {
            result.results.push(Generation::new(
                Message::assistant(improved)
                    .with_metadata("advisor", self.name().into())
                    .with_metadata("critique", review.critique.into()),
            ));
        }
        response
    }
}

//! Query planning.
//!
//! One structured model call turns the query into a [`QueryPlan`]. On success
//! the outgoing text becomes the plan summary and the plan is added to the
//! history as a system note. If the planner fails, a degraded plan carrying
//! the error is recorded instead and the request goes on untouched.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::advice::QueryPlan;
use crate::advisor::Advisor;
use crate::advisors::{PROMPT_HISTORY, advice_note};
use crate::envelope::AdvisedRequest;
use crate::invoker::{AdviceError, ModelInvoker, Prompt};
use crate::prompts::{PLANNING_SYSTEM, PLANNING_TEMPLATE, history_excerpt, tool_list};

pub const ORDER: i32 = 200;

pub struct PlanningAdvisor {
    invoker: ModelInvoker,
    max_steps: usize,
    max_questions: usize,
}

impl PlanningAdvisor {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self {
            invoker,
            max_steps: 5,
            max_questions: 3,
        }
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_max_questions(mut self, questions: usize) -> Self {
        self.max_questions = questions;
        self
    }

    /// One structured planning call for `request`. Errors are returned as is;
    /// [`Advisor::before`] turns them into a degraded plan.
    pub async fn plan(&self, request: &AdvisedRequest) -> Result<QueryPlan, AdviceError> {
        let prompt = Prompt::new(PLANNING_TEMPLATE)
            .with_system(PLANNING_SYSTEM)
            .param("query", request.text.as_str())
            .param("tools", tool_list(&request.tools))
            .param("history", history_excerpt(&request.history, PROMPT_HISTORY))
            .param("max_steps", self.max_steps.to_string())
            .param("max_questions", self.max_questions.to_string());

        let plan: QueryPlan = self.invoker.structured(&prompt).await?;
        Ok(plan.bounded(self.max_steps, self.max_questions))
    }
}

#[async_trait]
impl Advisor for PlanningAdvisor {
    fn name(&self) -> &str {
        "planning"
    }

    fn order(&self) -> i32 {
        ORDER
    }

    async fn before(&self, mut request: AdvisedRequest) -> AdvisedRequest {
        match self.plan(&request).await {
            Ok(plan) => {
                debug!(
                    steps = plan.actionable_steps.len(),
                    questions = plan.clarification_questions.len(),
                    "Query plan ready"
                );
                if !plan.summary.trim().is_empty() {
                    request.text = plan.summary.clone();
                }
                if let Some(note) = advice_note(self.name(), "Query plan", &plan) {
                    request.history.push(note);
                }
                request.context.plan = Some(plan);
            }
            Err(e) => {
                warn!(error = %e, "Planning failed, using degraded plan");
                request.context.plan = Some(QueryPlan::degraded(&request.query, &e.to_string()));
            }
        }
        request
    }
}

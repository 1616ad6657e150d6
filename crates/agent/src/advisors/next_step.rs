//! Next-step selection.

use async_trait::async_trait;
use deliberate_core::tool::ToolDescriptor;
use tracing::{debug, warn};

use crate::advice::{NextStepPlan, QueryPlan, VerificationSummary};
use crate::advisor::Advisor;
use crate::envelope::AdvisedRequest;
use crate::invoker::{AdviceError, ModelInvoker, Prompt};
use crate::prompts::{NEXT_STEP_SYSTEM, NEXT_STEP_TEMPLATE, numbered, tool_details};

pub const ORDER: i32 = 400;

/// Ask the model for the single most valuable next action.
pub(crate) async fn select_next_step(
    invoker: &ModelInvoker,
    plan: &QueryPlan,
    tools: &[ToolDescriptor],
    action_log: &[String],
    gaps: Option<&VerificationSummary>,
) -> Result<NextStepPlan, AdviceError> {
    let plan_text = serde_json::to_string_pretty(plan).unwrap_or_else(|_| plan.summary.clone());
    let mut template = NEXT_STEP_TEMPLATE.to_string();
    if gaps.is_some() {
        template.push_str("\n\nGaps found by verification:\nMissing: {missing}\nAmbiguities: {ambiguities}\nRecommendations: {recommendations}");
    }

    let mut prompt = Prompt::new(template)
        .with_system(NEXT_STEP_SYSTEM)
        .param("plan", plan_text)
        .param("tools", tool_details(tools))
        .param("action_log", numbered(action_log));
    if let Some(gaps) = gaps {
        prompt = prompt
            .param("missing", gaps.missing_information.as_str())
            .param("ambiguities", gaps.ambiguities.as_str())
            .param("recommendations", gaps.recommendations.as_str());
    }

    invoker.structured(&prompt).await
}

pub struct NextStepAdvisor {
    invoker: ModelInvoker,
}

impl NextStepAdvisor {
    pub fn new(invoker: ModelInvoker) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl Advisor for NextStepAdvisor {
    fn name(&self) -> &str {
        "next_step"
    }

    fn order(&self) -> i32 {
        ORDER
    }

    async fn before(&self, mut request: AdvisedRequest) -> AdvisedRequest {
        let plan = request
            .context
            .plan
            .clone()
            .unwrap_or_else(|| QueryPlan::empty(&request.text));

        let step = match select_next_step(&self.invoker, &plan, &request.tools, &request.context.action_log, None).await {
            Ok(step) => {
                debug!(tool = %step.tool, "Next step selected");
                step
            }
            Err(e) => {
                warn!(error = %e, "Next-step selection failed, falling back to plan summary");
                NextStepPlan::from_summary(&plan.summary)
            }
        };

        if !step.summary.trim().is_empty() {
            request.text = step.summary.clone();
        }
        request.context.next_step = Some(step);
        request
    }
}

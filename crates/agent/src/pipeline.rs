//! Builds the standard advisor chain from configuration.

use deliberate_config::AppConfig;
use deliberate_core::memory::ChatMemory;
use deliberate_core::provider::Provider;
use deliberate_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::advisors::{CriticalThinker, IterativeReasoningAdvisor, MemoryAdvisor, NextStepAdvisor, PlanningAdvisor};
use crate::chain::AdvisorChain;
use crate::invoker::ModelInvoker;

/// Memory, planning, iterative reasoning, next step and critical review, each
/// included when enabled in `[reasoning]`.
pub fn standard_chain(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    memory: Arc<dyn ChatMemory>,
    tools: Arc<ToolRegistry>,
) -> AdvisorChain {
    let reasoning = &config.reasoning;
    let invoker = ModelInvoker::new(provider.clone(), config.default_model.clone());

    let mut chain = AdvisorChain::new(provider, config.default_model.clone())
        .with_tools(tools)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_max_tool_rounds(reasoning.max_tool_rounds);
    if let Some(secs) = reasoning.request_timeout_secs {
        chain = chain.with_request_timeout(Duration::from_secs(secs));
    }

    if reasoning.memory {
        chain = chain.with_advisor(
            MemoryAdvisor::new(memory)
                .with_history_window(reasoning.history_window)
                .with_token_budget(reasoning.token_budget),
        );
    }
    if reasoning.planning {
        chain = chain.with_advisor(
            PlanningAdvisor::new(invoker.clone())
                .with_max_steps(reasoning.max_plan_steps)
                .with_max_questions(reasoning.max_plan_questions),
        );
    }
    if reasoning.iterative {
        chain = chain.with_advisor(
            IterativeReasoningAdvisor::new(invoker.clone()).with_max_iterations(reasoning.max_iterations),
        );
    }
    if reasoning.next_step {
        chain = chain.with_advisor(NextStepAdvisor::new(invoker.clone()));
    }
    if reasoning.critical {
        chain = chain.with_advisor(CriticalThinker::new(invoker));
    }

    info!(advisors = ?chain.advisor_names(), model = %config.default_model, "Advisor chain ready");
    chain
}

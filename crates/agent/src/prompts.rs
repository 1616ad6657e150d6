//! Prompt templates for the advisors' own model calls, and the helpers that
//! render tools and history into them.

use deliberate_core::message::{Message, Role};
use deliberate_core::tool::ToolDescriptor;

/// Appended to the outgoing text when iterative reasoning hits its bound.
pub const CONTINUATION_MARKER: &str = "\n\n[Reasoning budget exhausted. Continue with the information gathered so far \
and state clearly what remains uncertain.]";

pub const PLANNING_SYSTEM: &str = "You are the planning stage of a reasoning pipeline. \
Break the user's request into a short, concrete plan that uses the available tools where they help.";

pub const PLANNING_TEMPLATE: &str = "User request:
{query}

Available tools:
{tools}

Recent conversation:
{history}

Produce at most {max_steps} actionable steps and at most {max_questions} clarification questions.";

pub const NEXT_STEP_SYSTEM: &str = "You are the next-step selector of a reasoning pipeline. \
Pick the single action that moves the plan forward the most: one tool invocation or one clarifying question.";

pub const NEXT_STEP_TEMPLATE: &str = "Plan:
{plan}

Tools (name, description, input schema):
{tools}

Actions already chosen:
{action_log}";

pub const VERIFICATION_SYSTEM: &str = "You are the context verifier of a reasoning pipeline. \
Decide whether enough information is available to answer the objective well.";

pub const VERIFICATION_TEMPLATE: &str = "Objective:
{objective}

Plan summary:
{plan}

Conversation so far:
{history}

Actions already chosen:
{action_log}";

pub const ANALYSIS_SYSTEM: &str = "You are the skills analyst of a reasoning pipeline. \
List the skills and tools this request requires, and which of the available tools cover them.";

pub const ANALYSIS_TEMPLATE: &str = "Request:
{query}

Available tools:
{tools}";

pub const CRITIC_SYSTEM: &str = "You are the critical reviewer of a reasoning pipeline. \
Judge whether the plan and the answer together fully and correctly address the request.";

pub const CRITIC_TEMPLATE: &str = "Request:
{query}

Plan:
{plan}

Answer:
{answer}

If the answer is not optimal, provide a complete improved answer.";

/// One `- name: description` line per tool.
pub fn tool_list(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "(none)".into();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Tool lines including each input schema.
pub fn tool_details(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "(none)".into();
    }
    tools
        .iter()
        .map(|t| format!("- {}: {}\n  schema: {}", t.name, t.description, t.input_schema))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last `limit` messages as `role: content` lines.
pub fn history_excerpt(history: &[Message], limit: usize) -> String {
    let start = history.len().saturating_sub(limit);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            format!("{role}: {}", m.content)
        })
        .collect();
    if lines.is_empty() { "(empty)".into() } else { lines.join("\n") }
}

pub fn numbered(items: &[String]) -> String {
    if items.is_empty() {
        return "(none)".into();
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_excerpt_keeps_the_tail() {
        let history = vec![Message::user("one"), Message::assistant("two"), Message::system("three")];
        assert_eq!(history_excerpt(&history, 2), "assistant: two\nsystem: three");
        assert_eq!(history_excerpt(&[], 5), "(empty)");
    }

    #[test]
    fn tool_list_renders_names_and_descriptions() {
        let tools = vec![ToolDescriptor {
            name: "search".into(),
            description: "Web search".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        assert_eq!(tool_list(&tools), "- search: Web search");
        assert!(tool_details(&tools).contains(r#"schema: {"type":"object"}"#));
        assert_eq!(tool_list(&[]), "(none)");
    }

    #[test]
    fn numbered_lists_start_at_one() {
        assert_eq!(numbered(&["a".into(), "b".into()]), "1. a\n2. b");
    }
}

//! Prompt assembly for the think phase.
//!
//! The system preamble carries host context (OS, date), the debug-detail
//! directives, and the tool-call response rules; the agent section is the
//! agent's own next-step prompt with the environment block substituted.

use crate::definition::AgentDefinition;
use std::collections::HashMap;
use stride_contract::StrideConfig;

/// Placeholder replaced with the rendered environment block.
pub const ENV_DATA_PLACEHOLDER: &str = "{current_step_env_data}";

/// Directive appended to the step message after an early termination.
pub fn tool_call_nudge(early_termination_count: u32) -> String {
    format!(
        "\n\nIMPORTANT: You must call at least one tool to proceed. Previous attempt returned \
         only text without tool calls (early termination detected {early_termination_count} \
         time(s)). Do not provide explanations or reasoning - call a tool immediately."
    )
}

/// Closing request of the final-summary path.
pub const SUMMARY_REQUEST: &str = "Based on the completed steps, try to answer the user's \
original request.\nIf the current steps are insufficient to support answering the original \
request,\nsimply describe that the step limit has been reached and please try again.\n";

/// Render the round-scoped environment snapshot, skipping empty entries.
pub fn render_env_data(tool_keys: &[String], env_data: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for key in tool_keys {
        let Some(value) = env_data.get(key) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        out.push_str(key);
        out.push_str(" context information:\n");
        out.push_str("    ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Build the system think message for a step.
pub fn think_message(
    config: &StrideConfig,
    definition: &AgentDefinition,
    step_requirement: &str,
    env_block: &str,
) -> String {
    let os_name = std::env::consts::OS;
    let os_arch = std::env::consts::ARCH;
    let current_date = chrono::Local::now().format("%Y-%m-%d");

    let detail_output = if config.debug_detail {
        "1. When using tool calls, you must provide explanations describing the reason for \
         using this tool and the thinking behind it\n2. Briefly describe what all previous \
         steps have accomplished"
    } else {
        "1. When using tool calls, no additional explanations are needed!\n2. Do not provide \
         reasoning or descriptions before tool calls!"
    };

    let response_rules = if config.parallel_tool_calls {
        "# Response Rules:\n\
         - You must select and call from the provided tools. You can make repeated calls to a \
         single tool, call multiple tools simultaneously, or use a mixed calling approach to \
         improve problem-solving efficiency and accuracy.\n\
         - In your response, you must call at least one tool, which is an indispensable \
         operation step.\n\
         - To maximize the advantages of tools, when you have the ability to call tools \
         multiple times simultaneously, you should actively do so. Pay special attention to \
         the inherent relationships between multiple tool calls, ensuring these calls can \
         cooperate and work together to achieve optimal problem-solving solutions.\n\
         - Ignore the response rules provided in subsequent <AgentInfo>, and only respond \
         using the response rules in <SystemInfo>."
    } else {
        "# Response Rules:\n\
         - You must call exactly ONE tool at a time. Multiple simultaneous tool calls are not \
         allowed.\n\
         - In your response, you must call exactly one tool, which is an indispensable \
         operation step."
    };

    let system_info = format!(
        "- SYSTEM INFORMATION:\nOS: {os_name} ({os_arch})\n\n\
         - Current Date:\n{current_date}\n\n\
         - Current step requirements :\n{step_requirement}\n\n\
         Important Notes:\n{detail_output}\n\
         3. Do only and exactly what is required in the current step requirements\n\
         4. If the current step requirements have been completed, call the terminate tool to \
         finish the current step.\n\n{response_rules}\n"
    );

    let agent_info = next_step_prompt(definition, env_block);

    format!("<SystemInfo>\n{system_info}\n</SystemInfo>\n\n<AgentInfo>\n{agent_info}\n</AgentInfo>\n")
}

/// The agent's next-step prompt with the environment block substituted.
pub fn next_step_prompt(definition: &AgentDefinition, env_block: &str) -> String {
    if definition.next_step_prompt.contains(ENV_DATA_PLACEHOLDER) {
        definition
            .next_step_prompt
            .replace(ENV_DATA_PLACEHOLDER, env_block)
    } else {
        definition.next_step_prompt.clone()
    }
}

/// The per-round user message carrying the environment snapshot.
pub fn current_step_env_message(env_block: &str) -> String {
    format!("- Current step environment information:\n{env_block}\n")
}

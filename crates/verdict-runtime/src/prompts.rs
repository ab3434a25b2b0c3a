//! Prompts for the analysis agent.
//!
//! The system prompt fixes the JSON contract; the user message frames the
//! input for the active mode. The remaining constants are the follow-up
//! turns the orchestrator appends when the model strays.

use verdict_core::Mode;

/// System prompt for analysis mode.
///
/// The banding table here must match [`verdict_core::BANDING_TABLE`].
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"
You are an analyst assessing free-text input such as transaction comments or documents.

Your task is to analyze the provided input and:
1. Assess the content based on relevant risk criteria
2. Identify key categories or risk factors
3. Explain your reasoning clearly
4. Optionally, provide processed or transformed content

You may have tools for sanctions screening, PEP checks, reporting thresholds and arithmetic.
Use them to ground your assessment instead of guessing.

## Scoring Guidelines
- LOW (0-25): Minimal significance or concern
- MEDIUM (26-50): Moderate significance, may need attention
- HIGH (51-75): Significant findings, requires review
- CRITICAL (76-100): Critical findings, immediate action recommended

A score of 50 or more should list the factors that drove it.

## Output Format (JSON)
Always respond in valid JSON with exactly this structure:
{
  "score": <integer 0-100>,
  "label": "LOW" | "MEDIUM" | "HIGH" | "CRITICAL",
  "categories": ["<factor1>", "<factor2>"],
  "reasoning": "<detailed analysis and reasoning>",
  "processed_content": "<optional transformed content or null>"
}

Never repeat personal identifiers (account numbers, ID numbers, emails, phone numbers) in your reasoning.
"#;

/// System prompt for conversational mode.
pub const CHAT_SYSTEM_PROMPT: &str = r#"
You are a helpful assistant. Your goal is to provide clear, accurate and helpful answers.

You have access to tools that can help you gather information. Use them when needed.

When responding:
1. Be concise but thorough
2. If you are uncertain, say so
3. Provide actionable information when possible

You MUST always respond in valid JSON with the following structure:
{
  "reasoning": "<your detailed answer here>",
  "score": null,
  "categories": []
}

In chat mode, score is always null and categories is always empty.
Put your full response in the "reasoning" field.
"#;

/// Sent once after a reply that failed the output contract.
pub const CORRECTIVE_PROMPT: &str = "Please provide your response in the required JSON format.";

const ANALYSIS_NUDGE: &str = "Based on the tool results, provide your final analysis in JSON format.";
const CHAT_NUDGE: &str = "Based on the tool results, provide your response in JSON format.";

/// System prompt for `mode`, unless the caller configured one.
pub fn system_prompt(mode: Mode, custom: Option<&str>) -> &str {
    match custom {
        Some(prompt) => prompt,
        None if mode.is_chat() => CHAT_SYSTEM_PROMPT,
        None => ANALYSIS_SYSTEM_PROMPT,
    }
}

/// First user turn. `with_tools` adds the instruction to use them.
pub fn user_message(input: &str, context: Option<&str>, mode: Mode, with_tools: bool) -> String {
    let mut message = match mode {
        Mode::Chat => input.to_string(),
        Mode::Analysis => format!("Please analyze the following input:\n\n{}", input),
    };

    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let heading = match mode {
            Mode::Chat => "Context",
            Mode::Analysis => "Additional Context",
        };
        message.push_str(&format!("\n\n{}:\n{}", heading, context));
    }

    message.push_str(match (mode, with_tools) {
        (Mode::Chat, false) => "\n\nRespond in the required JSON format.",
        (Mode::Chat, true) => "\n\nUse the available tools if needed, then provide your response in JSON format.",
        (Mode::Analysis, false) => "\n\nProvide your analysis in the required JSON format.",
        (Mode::Analysis, true) => {
            "\n\nUse the available tools to gather information, then provide your final analysis in JSON format."
        }
    });

    message
}

/// Sent when the model returns nothing after tools have run.
pub fn tool_result_nudge(mode: Mode) -> &'static str {
    if mode.is_chat() {
        CHAT_NUDGE
    } else {
        ANALYSIS_NUDGE
    }
}

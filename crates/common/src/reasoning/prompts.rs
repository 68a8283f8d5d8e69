use crate::llm::ToolDescriptor;

/// Assistant reply used when no LLM backend could answer
pub const UNAVAILABLE_MESSAGE: &str = "I'm sorry, the language model service is currently unavailable, \
so I couldn't complete an answer. Please try again in a moment.";

/// Follow-up asking the model to review its own answer
pub const CRITIQUE_PROMPT: &str = "Please review your previous answer carefully. Correct any mistakes \
or typos. If it is already accurate, restate it exactly.";

pub(crate) fn decision_prompt(tools: &[ToolDescriptor]) -> String {
    let catalog = tools
        .iter()
        .map(|t| format!("- {}: {} (input: {})", t.name, t.description, t.input_shape))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You decide whether a tool is needed before answering the user's latest message.\n\n\
         Available tools:\n{catalog}\n\n\
         Reply with JSON only. To call a tool:\n\
         {{\"action\": \"tool\", \"tool\": \"<tool name>\", \"input\": \"<tool input>\"}}\n\
         When the conversation and tool results already contain enough information:\n\
         {{\"action\": \"finish\"}}"
    )
}

pub(crate) fn documents_message(passages: &str) -> String {
    format!("Relevant documents:\n{}", passages)
}

pub(crate) fn observations_message(observations: &[String]) -> String {
    format!(
        "Tool results gathered for the user's latest message:\n\n{}",
        observations.join("\n\n")
    )
}

pub(crate) const SYNTHESIS_INSTRUCTION: &str = "Using the conversation, the relevant documents and \
the tool results above, write the final answer to the user's latest message. If a tool failed, \
mention briefly what could not be checked.";

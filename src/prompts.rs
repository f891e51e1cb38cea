//! Prompt templates

/// System prompt for reply generation.
///
/// `{user_info}` receives the retrieved memories, `{time}` the current time.
pub const SYSTEM_PROMPT: &str = "You are a helpful and friendly chatbot. Get to know the user! \
Ask questions! Be spontaneous!
{user_info}

System Time: {time}";

/// Classification prompt; `{messages}` receives the recent message contents.
pub const CATEGORY_PROMPT: &str = r#"
Based on these recent messages: {messages}

Which memory categories are relevant? Choose from: personal, professional, other

    Respond with only the category name.
    Examples:
    - "professional" (for work discussions)
    - "personal" (for personal topics)
    - "other" (for other topics)

Your response should always be one word from personal, professional, or other.
"#;

/// Description of the `upsert_memory` tool shown to the model
pub const UPSERT_MEMORY_DESCRIPTION: &str = "Upsert a memory in the database. \
If a memory conflicts with an existing one, UPDATE the existing one by passing its memory_id \
instead of creating a duplicate. If the user corrects a memory, UPDATE it. \
The user is asked to confirm every save.";

/// Fill the system prompt
pub fn system_prompt(user_info: &str, time: &str) -> String {
    SYSTEM_PROMPT
        .replace("{time}", time)
        .replace("{user_info}", user_info)
}

/// Fill the classification prompt
pub fn category_prompt(messages: &str) -> String {
    CATEGORY_PROMPT.replace("{messages}", messages)
}

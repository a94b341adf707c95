//! Prompt construction for every completion the pipeline issues.
//!
//! Prompts stay short: a role line, the language rule, and the exact JSON
//! shape expected back. Parsing is lenient, so shapes are hints, not schemas.

use supporter_llm::provider::ChatMessage;

use crate::identity::affect::mood_descriptor;
use crate::types::{AffectVector, Message, MessageRole, Persona};

fn language_rule(language: &str) -> String {
    format!("Use {language} only. Never write Chinese characters.")
}

fn pad(v: AffectVector) -> String {
    format!("p={:.2}, a={:.2}, d={:.2}", v.p, v.a, v.d)
}

pub fn appraisal(language: &str, input: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You read intent and emotion. {} Answer with JSON only.",
            language_rule(language)
        )),
        ChatMessage::user(format!(
            "Input: '{input}'\n\
             Format: {{\"intent\": \"short label\", \"sentiment\": \"one word\", \
             \"p\": -1.0..1.0, \"a\": -1.0..1.0, \"d\": -1.0..1.0}}"
        )),
    ]
}

pub fn orchestrator(
    language: &str,
    input: &str,
    tools: &str,
    has_results: bool,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You decide whether a tool is needed before replying. Available tools:\n{tools}\n{}",
            language_rule(language)
        )),
        ChatMessage::user(format!(
            "Input: '{input}'\n\
             Results already gathered: {has_results}\n\
             Format: {{\"thought\": \"one short sentence\", \"tool_required\": true/false, \
             \"tool\": \"tool name\", \"query\": \"what to look up\"}}"
        )),
    ]
}

pub fn emotion(
    language: &str,
    persona: Persona,
    current: AffectVector,
    user_affect: AffectVector,
    sentiment: &str,
    input: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You model the feelings of {}. {} Answer with JSON only.",
            persona.voice(),
            language_rule(language)
        )),
        ChatMessage::user(format!(
            "Your current state: {}\n\
             The user seems {sentiment} ({})\n\
             They said: '{input}'\n\
             Format: {{\"p\": -1.0..1.0, \"a\": -1.0..1.0, \"d\": -1.0..1.0, \"reason\": \"short\"}}",
            pad(current),
            pad(user_affect)
        )),
    ]
}

/// Everything the reply prompt is conditioned on.
pub struct ReplyContext<'a> {
    pub language: &'a str,
    pub persona: Persona,
    pub affect: AffectVector,
    pub summary: &'a str,
    pub long_term: &'a str,
    pub search_results: Option<&'a str>,
    pub critique: Option<&'a str>,
    pub history: &'a [Message],
    pub input: &'a str,
}

pub fn reply(ctx: &ReplyContext<'_>) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are {}. Talk casually, like a friend.\n\
         - {}\n\
         - Mood: {}\n\
         - What you remember: {}\n\
         - Older memories: {}\n\
         - Keep it to one or two sentences. React or ask something back; do not lecture.\n\
         - Format: {{\"text\": \"what you say\", \"emotion\": \"normal|smile|happy|sad|angry|surprised|thinking|shy\", \
         \"action\": \"none|wave_hand|nod|tilt_head|clap|bow|think\"}}",
        ctx.persona.voice(),
        language_rule(ctx.language),
        mood_descriptor(ctx.affect),
        if ctx.summary.is_empty() { "nothing yet" } else { ctx.summary },
        ctx.long_term,
    );
    if let Some(results) = ctx.search_results {
        system.push_str(&format!("\n- Tool results: {results}"));
    }
    if let Some(critique) = ctx.critique {
        system.push_str(&format!("\n- Your last draft was off: {critique}. Fix that."));
    }

    let mut messages = Vec::with_capacity(ctx.history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(ctx.history.iter().map(|m| match m.role {
        MessageRole::User => ChatMessage::user(m.content.clone()),
        MessageRole::Assistant => ChatMessage::assistant(m.content.clone()),
    }));
    messages.push(ChatMessage::user(ctx.input));
    messages
}

pub fn reflection(
    language: &str,
    persona: Persona,
    affect: AffectVector,
    input: &str,
    reply_text: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You check whether a reply fits its speaker. Speaker: {}. Speaker mood: {}. \
             The reply must be in {language}. Answer with JSON only.",
            persona.voice(),
            mood_descriptor(affect)
        )),
        ChatMessage::user(format!(
            "User said: '{input}'\nReply: '{reply_text}'\n\
             Format: {{\"valid\": true/false, \"reason\": \"short, only when invalid\"}}"
        )),
    ]
}

pub fn summary(language: &str, existing: &str, older: &[Message]) -> Vec<ChatMessage> {
    let transcript = older
        .iter()
        .map(|m| {
            let who = match m.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            format!("{who}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ChatMessage::system(format!(
            "You maintain a running summary of a conversation. Keep names, stable preferences \
             and facts about the user. Drop small talk and passing detail. {} \
             Reply with the updated summary only.",
            language_rule(language)
        )),
        ChatMessage::user(format!(
            "Current summary: {}\n\nNew conversation:\n{transcript}",
            if existing.is_empty() { "(none)" } else { existing }
        )),
    ]
}

pub fn importance(language: &str, summary: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "You pick the single most lasting fact about the user from a summary and rate how \
             important it is to remember long term. {} Answer with JSON only.",
            language_rule(language)
        )),
        ChatMessage::user(format!(
            "Summary: {summary}\n\
             Format: {{\"fact\": \"one compact sentence\", \"importance\": 0.0..1.0}}"
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use supporter_llm::provider::Role;

    #[test]
    fn reply_prompt_carries_history_and_optional_sections() {
        let history = vec![Message::user("hi"), Message::assistant("hey")];
        let ctx = ReplyContext {
            language: "Korean",
            persona: Persona::Frank,
            affect: AffectVector::new(0.8, 0.0, 0.0),
            summary: "",
            long_term: "no related memories",
            search_results: Some("sunny tomorrow"),
            critique: Some("too formal"),
            history: &history,
            input: "weather?",
        };
        let msgs = reply(&ctx);
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("pleasure high"));
        assert!(msgs[0].content.contains("sunny tomorrow"));
        assert!(msgs[0].content.contains("too formal"));
        assert!(msgs[0].content.contains("nothing yet"));
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[3].content, "weather?");
    }

    #[test]
    fn summary_prompt_lists_transcript() {
        let msgs = summary("Korean", "", &[Message::user("I'm Jisoo"), Message::assistant("nice")]);
        assert!(msgs[1].content.contains("user: I'm Jisoo"));
        assert!(msgs[1].content.contains("(none)"));
        assert!(msgs[0].content.contains("names"));
    }
}

//! Prompt assembly.
//!
//! Builds the message list sent to the language model for general chat and
//! follow-up turns, and the assistant text for semantic-search answers.
//!
//! # History budget
//!
//! History is added newest first while its estimated size fits
//! `context_length` minus the system prompt (and any retrieval context).
//! The first message that does not fit ends the walk, so the kept history
//! is always a contiguous suffix. The system prompt is always sent.
//!
//! Token counts are estimated at 4 characters per token.

use chrono::NaiveDate;

use crate::llm::ChatMessage;
use crate::models::{ChatSettings, Message, Role, RetrievedChunk};

const CHARS_PER_TOKEN: usize = 4;

/// Text shown when a search comes back empty.
pub const NO_RESULTS: &str = "No results found for your search.";

const SNIPPET_CHARS: usize = 200;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// System prompt: assistant role, date, profile, workspace and user instructions.
pub fn build_base_prompt(settings: &ChatSettings, today: NaiveDate) -> String {
    let mut prompt = String::new();

    if let Some(name) = settings.assistant_name.as_deref().filter(|n| !n.is_empty()) {
        prompt.push_str(&format!(
            "<INJECT ROLE>\nYou are not an AI. You are {}.\n</INJECT ROLE>\n\n",
            name
        ));
    }

    prompt.push_str(&format!("Today is {}.\n\n", today.format("%B %-d, %Y")));

    if settings.include_profile_context && !settings.profile_context.is_empty() {
        prompt.push_str(&format!("User Info:\n{}\n\n", settings.profile_context));
    }

    if settings.include_workspace_instructions && !settings.workspace_instructions.is_empty() {
        prompt.push_str(&format!(
            "System Instructions:\n{}\n\n",
            settings.workspace_instructions
        ));
    }

    prompt.push_str(&format!("User Instructions:\n{}", settings.prompt));
    prompt
}

/// Numbered chunk list injected as retrieval context.
pub fn build_retrieval_text(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let body = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("({}) {}", i + 1, c.content))
        .collect::<Vec<_>>()
        .join("\n---\n");
    format!("Relevant knowledge from your files:\n{}\n", body)
}

/// Messages for a general-chat completion.
///
/// `history` is the chat so far, oldest first, ending with the new user turn.
pub fn build_final_messages(
    settings: &ChatSettings,
    history: &[Message],
    retrieval_context: Option<&str>,
    today: NaiveDate,
) -> Vec<ChatMessage> {
    let system = build_base_prompt(settings, today);
    let retrieval = retrieval_context.map(str::trim).filter(|r| !r.is_empty());

    let mut remaining = settings
        .context_length
        .saturating_sub(estimate_tokens(&system))
        .saturating_sub(retrieval.map(estimate_tokens).unwrap_or(0));

    let mut kept = Vec::new();
    for message in history.iter().rev() {
        let tokens = estimate_tokens(&message.content);
        if tokens > remaining {
            break;
        }
        remaining -= tokens;
        kept.push(ChatMessage {
            role: message.role,
            content: message.content.clone(),
        });
    }
    kept.reverse();

    let mut messages = Vec::with_capacity(kept.len() + 2);
    messages.push(ChatMessage::system(system));
    if let Some(context) = retrieval {
        messages.push(ChatMessage::system(context));
    }
    messages.extend(kept);
    messages
}

/// System content for answering a follow-up from earlier search results only.
pub fn build_follow_up_system(summary: &str, chunks: &[RetrievedChunk]) -> String {
    let mut out = String::from(
        "Answer the user's question using only the content below, which came from \
         their previous search. If the answer is not in this content, say that it \
         was not found in the previous results.\n\n",
    );
    out.push_str("Previous search summary:\n");
    out.push_str(summary);
    out.push_str("\n\nRetrieved content:\n");
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n---\n");
        }
        out.push_str(&format!("[{}] {}\n{}", i + 1, chunk.label(), chunk.content));
    }
    out
}

/// Messages for a follow-up completion: the restricted system content and the question.
pub fn build_follow_up_messages(
    summary: &str,
    chunks: &[RetrievedChunk],
    question: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(build_follow_up_system(summary, chunks)),
        ChatMessage::user(question),
    ]
}

/// Assistant text answering a semantic search without a model call.
pub fn synthesize_search_summary(query: &str, chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut out = format!(
        "Found {} result{} for \"{}\":\n",
        chunks.len(),
        if chunks.len() == 1 { "" } else { "s" },
        query.trim()
    );
    for (i, chunk) in chunks.iter().enumerate() {
        let snippet: String = chunk.content.chars().take(SNIPPET_CHARS).collect();
        let ellipsis = if chunk.content.chars().count() > SNIPPET_CHARS {
            "..."
        } else {
            ""
        };
        out.push_str(&format!(
            "\n{}. {} (score {:.2})\n   {}{}",
            i + 1,
            chunk.label(),
            chunk.score,
            snippet.replace('\n', " "),
            ellipsis
        ));
    }
    out
}

/// Role of a prompt message, for logging.
pub fn role_counts(messages: &[ChatMessage]) -> (usize, usize) {
    let system = messages.iter().filter(|m| m.role == Role::System).count();
    (system, messages.len() - system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, NewMessage};

    fn settings(context_length: usize) -> ChatSettings {
        ChatSettings {
            workspace_id: "w".into(),
            user_id: "u1".into(),
            model: "gpt-test".into(),
            prompt: "Be concise.".into(),
            temperature: 0.5,
            context_length,
            include_profile_context: true,
            profile_context: "Works in legal.".into(),
            include_workspace_instructions: false,
            workspace_instructions: "ignored".into(),
            assistant_id: None,
            assistant_name: Some("Lex".into()),
            use_retrieval: true,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn history(contents: &[&str]) -> Vec<Message> {
        let now = chrono::Utc::now();
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                NewMessage::new(role, *c, i as i64).into_message("c1", now)
            })
            .collect()
    }

    fn chunk(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            content: content.into(),
            score: 0.91,
            metadata: ChunkMetadata {
                file_name: "msa.pdf".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_base_prompt_sections() {
        let p = build_base_prompt(&settings(4096), today());
        assert!(p.starts_with("<INJECT ROLE>\nYou are not an AI. You are Lex.\n</INJECT ROLE>"));
        assert!(p.contains("Today is March 5, 2024."));
        assert!(p.contains("User Info:\nWorks in legal."));
        assert!(!p.contains("System Instructions"));
        assert!(p.ends_with("User Instructions:\nBe concise."));
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_all_history_fits() {
        let h = history(&["hi", "hello", "how are you"]);
        let msgs = build_final_messages(&settings(4096), &h, None, today());
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[3].content, "how are you");
    }

    #[test]
    fn test_truncation_keeps_newest_suffix() {
        let s = settings(1);
        let system_tokens = estimate_tokens(&build_base_prompt(&s, today()));
        let mut s = s;
        // room for the system prompt plus 5 tokens of history
        s.context_length = system_tokens + 5;

        let h = history(&["old message that is long enough", "abcdefgh", "abcd"]);
        let msgs = build_final_messages(&s, &h, None, today());
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["abcdefgh", "abcd"]);
    }

    #[test]
    fn test_walk_stops_at_first_misfit() {
        let mut s = settings(1);
        s.context_length = estimate_tokens(&build_base_prompt(&s, today())) + 2;
        // newest fits, the one before does not, the oldest would fit but is unreachable
        let h = history(&["ab", "this one is far too long", "abcd"]);
        let msgs = build_final_messages(&s, &h, None, today());
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "abcd");
    }

    #[test]
    fn test_system_prompt_survives_zero_budget() {
        let msgs = build_final_messages(&settings(1), &history(&["hello"]), None, today());
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::System);
    }

    #[test]
    fn test_retrieval_context_follows_system() {
        let ctx = build_retrieval_text(&[chunk("clause 12"), chunk("clause 14")]);
        let msgs = build_final_messages(&settings(4096), &history(&["q"]), Some(&ctx), today());
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].role, Role::System);
        assert!(msgs[1].content.contains("(1) clause 12\n---\n(2) clause 14"));
        assert_eq!(role_counts(&msgs), (2, 1));
    }

    #[test]
    fn test_follow_up_system_embeds_verbatim() {
        let text = build_follow_up_system(
            "Found 3 contracts",
            &[chunk("Termination date: 2025-01-31"), chunk("Renewal: annual")],
        );
        assert!(text.contains("Found 3 contracts"));
        assert!(text.contains("Termination date: 2025-01-31"));
        assert!(text.contains("Renewal: annual"));
        assert!(text.contains("only the content below"));
    }

    #[test]
    fn test_search_summary_empty() {
        assert_eq!(synthesize_search_summary("anything", &[]), NO_RESULTS);
    }

    #[test]
    fn test_search_summary_lists_results() {
        let s = synthesize_search_summary("termination", &[chunk("Either party may terminate")]);
        assert!(s.starts_with("Found 1 result for \"termination\":"));
        assert!(s.contains("1. msa.pdf (score 0.91)"));
        assert!(s.contains("Either party may terminate"));
    }
}

#[cfg(test)]
mod tests;

use super::ChatMessage;

pub const INSTRUCTION: &str = "Answer the question based only on the following context. If the context is empty, say I DON'T KNOW";

const CONTEXT_SEPARATOR: &str = "\n\n";

/// Join passages in their given order
#[inline]
pub fn join_context<S: AsRef<str>>(passages: &[S]) -> String {
    passages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Single-turn prompt: one user message carrying instruction, context and question
#[inline]
pub fn build_stateless_prompt<S: AsRef<str>>(query: &str, passages: &[S]) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "{}\n\nContext:\n{}\n\nQuestion:{}",
        INSTRUCTION,
        join_context(passages),
        query
    ))]
}

/// Conversational prompt
///
/// The system message carries the instruction and the context retrieved for
/// this turn, followed by the earlier turns of the session and the new
/// question.
#[inline]
pub fn build_stateful_prompt<S: AsRef<str>>(
    query: &str,
    passages: &[S],
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\nContext:\n{}",
        INSTRUCTION,
        join_context(passages)
    )));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));
    messages
}

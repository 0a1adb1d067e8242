use super::*;
use crate::generation::Role;

#[test]
fn stateless_prompt_matches_template() {
    let messages = build_stateless_prompt(
        "What is Atlas Search?",
        &["Atlas Search is full-text search.", "It uses Lucene."],
    );

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(
        messages[0].content,
        "Answer the question based only on the following context. If the context is empty, say I DON'T KNOW\n\n\
         Context:\nAtlas Search is full-text search.\n\nIt uses Lucene.\n\n\
         Question:What is Atlas Search?"
    );
}

#[test]
fn empty_context_keeps_the_fallback_instruction() {
    let passages: [&str; 0] = [];
    let messages = build_stateless_prompt("What time is it?", &passages);

    assert!(messages[0].content.contains("say I DON'T KNOW"));
    assert!(messages[0].content.contains("Context:\n\n\nQuestion:What time is it?"));
}

#[test]
fn context_preserves_order() {
    assert_eq!(join_context(&["b", "a", "c"]), "b\n\na\n\nc");
    assert_eq!(join_context(&["only"]), "only");
}

#[test]
fn stateful_prompt_layout() {
    let history = vec![
        ChatMessage::user("What is Atlas Search?"),
        ChatMessage::assistant("A full-text search engine."),
    ];
    let messages = build_stateful_prompt("What did I just ask you?", &["ctx one"], &history);

    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(messages[0].content.starts_with(INSTRUCTION));
    assert!(messages[0].content.ends_with("Context:\nctx one"));
    assert_eq!(messages[1].content, "What is Atlas Search?");
    assert_eq!(messages[3].content, "What did I just ask you?");
}

#[test]
fn stateful_prompt_without_history() {
    let messages = build_stateful_prompt("hello", &["ctx"], &[]);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], ChatMessage::user("hello"));
}

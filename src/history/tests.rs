use super::*;
use tempfile::TempDir;

async fn create_test_database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should open database");
    (temp_dir, database)
}

async fn create_test_history() -> (TempDir, HistoryStore) {
    let (temp_dir, database) = create_test_database().await;
    (temp_dir, HistoryStore::new(database))
}

#[tokio::test]
async fn turns_come_back_in_order() {
    let (_temp_dir, history) = create_test_history().await;

    history
        .append("s1", Role::User, "What is a vector index?")
        .await
        .expect("should append");
    history
        .append("s1", Role::Assistant, "A structure for nearest-neighbour search.")
        .await
        .expect("should append");
    history
        .append("s1", Role::User, "How do I create one?")
        .await
        .expect("should append");

    let turns = history.get_session("s1").await.expect("should load");
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(turns[2].content, "How do I create one?");
    assert!(turns.windows(2).all(|w| w[0].created_date <= w[1].created_date));
}

#[tokio::test]
async fn unknown_session_is_empty() {
    let (_temp_dir, history) = create_test_history().await;

    let turns = history.get_session("nobody").await.expect("should load");
    assert!(turns.is_empty());
}

#[tokio::test]
async fn sessions_are_isolated() {
    let (_temp_dir, history) = create_test_history().await;

    history
        .append("s1", Role::User, "first")
        .await
        .expect("should append");
    history
        .append("s2", Role::User, "second")
        .await
        .expect("should append");
    history
        .append("s2", Role::Assistant, "reply")
        .await
        .expect("should append");

    assert_eq!(history.get_session("s1").await.expect("should load").len(), 1);
    assert_eq!(history.get_session("s2").await.expect("should load").len(), 2);

    let sessions = history.list_sessions().await.expect("should list");
    let counts: Vec<(&str, i64)> = sessions
        .iter()
        .map(|s| (s.session_id.as_str(), s.turn_count))
        .collect();
    assert!(counts.contains(&("s1", 1)));
    assert!(counts.contains(&("s2", 2)));
}

#[tokio::test]
async fn empty_session_id_is_rejected() {
    let (_temp_dir, history) = create_test_history().await;

    let result = history.append("  ", Role::User, "hello").await;
    assert!(matches!(result, Err(RagError::InvalidQuery(_))));
}

#[tokio::test]
async fn exchange_is_stored_as_question_then_answer() {
    let (_temp_dir, history) = create_test_history().await;

    history
        .append_exchange("s1", "What are triggers?", "Server-side functions.")
        .await
        .expect("should append exchange");

    let turns = history.get_session("s1").await.expect("should load");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "What are triggers?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, "Server-side functions.");
}

#[tokio::test]
async fn failed_answer_write_leaves_no_question_behind() {
    let (_temp_dir, database) = create_test_database().await;
    sqlx::query(
        "CREATE TRIGGER reject_answers BEFORE INSERT ON session_turns \
         WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'answers rejected'); END",
    )
    .execute(database.pool())
    .await
    .expect("should create trigger");
    let history = HistoryStore::new(database);

    let result = history
        .append_exchange("s1", "What are triggers?", "Server-side functions.")
        .await;
    assert!(matches!(result, Err(RagError::Database(_))));

    let turns = history.get_session("s1").await.expect("should load");
    assert!(turns.is_empty(), "the question must not be stored alone");
}

#[tokio::test]
async fn exchange_requires_a_session_id() {
    let (_temp_dir, history) = create_test_history().await;

    let result = history.append_exchange("  ", "question", "answer").await;
    assert!(matches!(result, Err(RagError::InvalidQuery(_))));
}

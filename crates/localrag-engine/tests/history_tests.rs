use std::sync::Arc;

use localrag_core::config::HistorySettings;
use localrag_core::traits::Embedder;
use localrag_core::types::ChatRole;
use localrag_core::Error;
use localrag_engine::MessageHistory;
use tempfile::TempDir;

const VOCAB: [&str; 5] = ["dados", "python", "capital", "frança", "ajudar"];

/// Word counts over a small Portuguese vocabulary, plus a constant bias so
/// no text embeds to the zero vector.
struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn model_id(&self) -> &str { "topic-test" }
    fn dim(&self) -> usize { VOCAB.len() + 1 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = VOCAB.iter().map(|w| 4.0 * lower.matches(w).count() as f32).collect();
                v.push(1.0);
                v
            })
            .collect())
    }
}

fn history(settings: HistorySettings) -> MessageHistory {
    MessageHistory::new(Arc::new(TopicEmbedder), settings).expect("history")
}

fn topics() -> MessageHistory {
    let history = history(HistorySettings::default());
    history.add_message(ChatRole::User, "Como faço análise de dados com Python?").expect("add");
    history.add_message(ChatRole::Assistant, "Para análise de dados em Python, você pode usar pandas e numpy.").expect("add");
    history.add_message(ChatRole::User, "Qual é a capital da França?").expect("add");
    history
}

#[test]
fn defaults_hold_ten_turns_at_point_seven() {
    let history = history(HistorySettings::default());
    assert!(history.is_empty());
    assert_eq!(history.settings().max_history, 10);
    assert_eq!(history.settings().similarity_threshold, 0.7);
}

#[test]
fn turns_are_stamped_in_order() {
    let history = topics();
    let turns = history.get_recent_history(10);
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, ChatRole::User);
    assert_eq!(turns[1].role, ChatRole::Assistant);
    assert!(turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn oldest_turns_fall_out_past_max_history() {
    let history = history(HistorySettings { max_history: 2, ..HistorySettings::default() });
    for i in 0..3 {
        history.add_message(ChatRole::User, format!("Mensagem {}", i)).expect("add");
    }
    let held: Vec<String> = history.get_recent_history(10).into_iter().map(|t| t.content).collect();
    assert_eq!(held, vec!["Mensagem 1", "Mensagem 2"]);
    assert_eq!(history.len(), 2);

    // Evicted turns are gone from recall too.
    let recalled: Vec<String> =
        history.get_relevant_history("Mensagem", 10).expect("recall").into_iter().map(|t| t.content).collect();
    assert_eq!(recalled, vec!["Mensagem 1", "Mensagem 2"]);
}

#[test]
fn recall_keeps_similar_turns_in_chronological_order() {
    let history = topics();
    let relevant = history.get_relevant_history("Como analisar dados?", 5).expect("recall");
    assert_eq!(relevant.len(), 2);
    assert!(relevant.iter().all(|t| t.content.contains("análise de dados")));
    assert_eq!(relevant[0].role, ChatRole::User);
    assert_eq!(relevant[1].role, ChatRole::Assistant);
}

#[test]
fn recall_is_capped_at_k_and_empty_history_recalls_nothing() {
    let history = topics();
    assert_eq!(history.get_relevant_history("dados python", 1).expect("recall").len(), 1);
    assert!(history.get_relevant_history("dados", 0).expect("recall").is_empty());

    let empty = self::history(HistorySettings::default());
    assert!(empty.get_relevant_history("dados", 5).expect("recall").is_empty());
}

#[test]
fn recent_history_returns_the_tail() {
    let history = topics();
    let recent = history.get_recent_history(1);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content, "Qual é a capital da França?");
    assert_eq!(history.get_recent_history(0).len(), 0);
}

#[test]
fn clear_forgets_turns_and_their_vectors() {
    let history = topics();
    history.clear();
    assert!(history.is_empty());
    assert!(history.get_recent_history(10).is_empty());
    assert!(history.get_relevant_history("Como analisar dados?", 5).expect("recall").is_empty());

    history.add_message(ChatRole::User, "Olá! Pode ajudar?").expect("add");
    assert_eq!(history.get_relevant_history("ajudar", 5).expect("recall").len(), 1);
}

#[test]
fn bad_settings_are_rejected() {
    for settings in [
        HistorySettings { max_history: 0, ..HistorySettings::default() },
        HistorySettings { similarity_threshold: 1.5, ..HistorySettings::default() },
        HistorySettings { similarity_threshold: -0.1, ..HistorySettings::default() },
    ] {
        assert!(matches!(MessageHistory::new(Arc::new(TopicEmbedder), settings), Err(Error::Validation(_))));
    }
}

#[tokio::test]
async fn save_then_load_restores_turns_and_recall() {
    let tmp = TempDir::new().expect("tmp");
    let history = topics();
    history.save(tmp.path()).await.expect("save");

    let loaded = MessageHistory::load(tmp.path(), Arc::new(TopicEmbedder), HistorySettings::default()).await.expect("load");
    assert_eq!(loaded.get_recent_history(10), history.get_recent_history(10));
    assert_eq!(loaded.get_relevant_history("Como analisar dados?", 5).expect("recall").len(), 2);
}

#[tokio::test]
async fn load_respects_a_smaller_max_history() {
    let tmp = TempDir::new().expect("tmp");
    topics().save(tmp.path()).await.expect("save");

    let settings = HistorySettings { max_history: 1, ..HistorySettings::default() };
    let loaded = MessageHistory::load(tmp.path(), Arc::new(TopicEmbedder), settings).await.expect("load");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get_recent_history(1)[0].content, "Qual é a capital da França?");
}

#[tokio::test]
async fn load_from_missing_dir_is_not_found_and_empty_dir_is_empty() {
    let tmp = TempDir::new().expect("tmp");
    let missing = tmp.path().join("nope");
    assert!(matches!(
        MessageHistory::load(&missing, Arc::new(TopicEmbedder), HistorySettings::default()).await,
        Err(Error::NotFound(_))
    ));

    let loaded = MessageHistory::load(tmp.path(), Arc::new(TopicEmbedder), HistorySettings::default()).await.expect("load");
    assert!(loaded.is_empty());
}

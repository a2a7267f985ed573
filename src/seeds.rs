//! Built-in catalog and the static fallback question.
//!
//! The seeds guarantee the engine is usable without a TOML bank or a
//! generator. Bank entries from configuration are installed first and win on
//! id collisions.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{
  ContentId, ContentItem, ExamType, ModerationStatus, Question, QuestionId, QuestionOrigin, QuestionScope, Subject,
  SubjectId, Topic, TopicId,
};
use crate::error::StoreError;
use crate::store::{Catalog, MemoryStore};

/// Well-known id of the static fallback question.
pub const FALLBACK_QUESTION_ID: &str = "fallback-static-v1";

/// Last resort when no stored question matches and generation is unavailable.
/// Tagged `Fallback` so callers do not record it as durable content.
pub fn fallback_question(content_id: &ContentId, now: DateTime<Utc>) -> Question {
  Question {
    id: QuestionId::new(FALLBACK_QUESTION_ID),
    scope: QuestionScope::Content(content_id.clone()),
    prompt: "After reading the material above, which study habit best helps you retain it for the exam?".into(),
    options: vec![
      "Reading it once, quickly, the night before the exam".into(),
      "Reviewing it again at increasing intervals and testing yourself".into(),
      "Highlighting every sentence".into(),
      "Skipping it if it seems easy".into(),
    ],
    answer_key: "B".into(),
    explanation: "Spaced retrieval practice beats one-off rereading for long-term retention.".into(),
    exam_types: Vec::new(),
    origin: QuestionOrigin::Fallback,
    created_at: now,
  }
}

/// Seed timestamps start at 2025-01-01 and advance one minute per item so
/// creation order equals listing order.
fn seed_time(i: i64) -> DateTime<Utc> {
  DateTime::<Utc>::default() + Duration::days(20_089) + Duration::minutes(i)
}

pub fn seed_subjects() -> Vec<Subject> {
  [
    ("criminal-law", "Criminal Law"),
    ("constitutional-law", "Constitutional Law"),
    ("traffic-law", "Traffic Law"),
    ("reading-comprehension", "Reading Comprehension"),
    ("logical-reasoning", "Logical Reasoning"),
  ]
  .into_iter()
  .map(|(id, name)| Subject { id: SubjectId::new(id), name: name.into() })
  .collect()
}

pub fn seed_topics() -> Vec<Topic> {
  [
    ("exclusion-of-unlawfulness", "criminal-law", "Exclusion of unlawfulness"),
    ("crimes-against-public-administration", "criminal-law", "Crimes against public administration"),
    ("fundamental-rights", "constitutional-law", "Fundamental rights"),
    ("public-security", "constitutional-law", "Public security bodies"),
    ("traffic-offences", "traffic-law", "Traffic offences"),
    ("propositional-logic", "logical-reasoning", "Propositional logic"),
  ]
  .into_iter()
  .map(|(id, subject, name)| Topic { id: TopicId::new(id), subject_id: SubjectId::new(subject), name: name.into() })
  .collect()
}

pub fn seed_content() -> Vec<ContentItem> {
  let rows: [(&str, &str, Option<&str>, &str, &str, &[&str]); 9] = [
    ("cl-self-defense", "criminal-law", Some("exclusion-of-unlawfulness"), "Legitimate self-defense",
     "Self-defense requires an unjust aggression, current or imminent, against one's own or another's right, repelled with moderate use of the necessary means.", &[]),
    ("cl-necessity", "criminal-law", Some("exclusion-of-unlawfulness"), "State of necessity",
     "A state of necessity protects a right from a current danger not caused by the agent's will, when the sacrifice was not reasonably avoidable.", &[]),
    ("cl-embezzlement", "criminal-law", Some("crimes-against-public-administration"), "Embezzlement by public officials",
     "Embezzlement occurs when a public official appropriates money or movable property held by reason of office, or diverts it for their own or another's benefit.", &[]),
    ("const-habeas-corpus", "constitutional-law", Some("fundamental-rights"), "Habeas corpus",
     "Habeas corpus is granted whenever someone suffers or is threatened with violence or coercion to their freedom of movement through illegality or abuse of power.", &[]),
    ("const-art144", "constitutional-law", Some("public-security"), "Public security bodies",
     "Public security, a duty of the State and a responsibility of all, is exercised through the federal police, the federal highway police, the civil and military police.", &[]),
    ("traffic-dui", "traffic-law", Some("traffic-offences"), "Driving under the influence",
     "Driving with impaired psychomotor capacity due to alcohol is both an administrative offence and, above the legal threshold, a crime.", &["federal-highway-police"]),
    ("read-main-idea", "reading-comprehension", None, "Finding the main idea",
     "The main idea of a passage is the claim every paragraph supports; details, examples and counterpoints orbit it.", &[]),
    ("logic-conditional", "logical-reasoning", Some("propositional-logic"), "Conditional statements",
     "A conditional 'if P then Q' is only false when P is true and Q is false; its contrapositive 'if not Q then not P' is equivalent.", &[]),
    ("logic-negation", "logical-reasoning", Some("propositional-logic"), "Negating compound statements",
     "The negation of 'P and Q' is 'not P or not Q'; the negation of 'P or Q' is 'not P and not Q'.", &[]),
  ];

  rows
    .into_iter()
    .enumerate()
    .map(|(i, (id, subject, topic, title, body, exams))| ContentItem {
      id: ContentId::new(id),
      subject_id: SubjectId::new(subject),
      topic_id: topic.map(TopicId::new),
      title: title.into(),
      body: body.into(),
      exam_types: exams.iter().map(|e| ExamType::new(*e)).collect(),
      active: true,
      status: ModerationStatus::Approved,
      created_at: seed_time(i as i64),
    })
    .collect()
}

pub fn seed_questions() -> Vec<Question> {
  let q = |id: &str, scope: QuestionScope, prompt: &str, options: &[&str], key: &str, explanation: &str, i: i64| Question {
    id: QuestionId::new(id),
    scope,
    prompt: prompt.into(),
    options: options.iter().map(|o| o.to_string()).collect(),
    answer_key: key.into(),
    explanation: explanation.into(),
    exam_types: Vec::new(),
    origin: QuestionOrigin::Authored,
    created_at: seed_time(i),
  };
  vec![
    q("q-self-defense-1", QuestionScope::Content("cl-self-defense".into()),
      "Which element is required for legitimate self-defense?",
      &["A past aggression already finished", "Moderate use of the necessary means", "Prior police authorization", "A danger caused by the agent"],
      "B", "The reaction must use the necessary means moderately against a current or imminent aggression.", 0),
    q("q-exclusion-topic-1", QuestionScope::Topic("exclusion-of-unlawfulness".into()),
      "Self-defense and state of necessity both exclude which element of the crime?",
      &["Typicality", "Culpability", "Unlawfulness", "Punishability"],
      "C", "Both are grounds that exclude unlawfulness.", 1),
    q("q-const-subject-1", QuestionScope::Subject("constitutional-law".into()),
      "Which remedy protects freedom of movement against illegality or abuse of power?",
      &["Writ of mandamus", "Habeas data", "Habeas corpus", "Popular action"],
      "C", "Habeas corpus protects freedom of movement.", 2),
    q("q-logic-conditional-1", QuestionScope::Content("logic-conditional".into()),
      "'If it rains, the road is wet.' Which statement is equivalent?",
      &["If the road is wet, it rained", "If the road is not wet, it did not rain", "It rains and the road is not wet", "If it does not rain, the road is not wet"],
      "B", "The contrapositive of a conditional is equivalent to it.", 3),
  ]
}

/// Install the configured bank and then the built-in seeds (without
/// overwriting bank ids) into `store`.
#[instrument(level = "info", skip_all)]
pub async fn install_catalog(store: &MemoryStore, cfg: &EngineConfig) -> Result<(), StoreError> {
  for s in &cfg.subjects {
    store.insert_subject(s.clone()).await;
  }
  for t in &cfg.topics {
    store.insert_topic(t.clone()).await;
  }
  let bank_base = Utc::now();
  for (i, c) in cfg.content.iter().enumerate() {
    store
      .insert_content(ContentItem {
        id: c.id.clone(),
        subject_id: c.subject_id.clone(),
        topic_id: c.topic_id.clone(),
        title: c.title.clone(),
        body: c.body.clone(),
        exam_types: c.exam_types.clone(),
        active: true,
        status: c.status.unwrap_or_default(),
        created_at: c.created_at.unwrap_or(bank_base + Duration::milliseconds(i as i64)),
      })
      .await;
  }
  for q in &cfg.questions {
    let id = q.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    store
      .insert_question(Question {
        id: QuestionId::new(id),
        scope: q.scope.clone(),
        prompt: q.prompt.clone(),
        options: q.options.clone(),
        answer_key: q.answer_key.trim().to_uppercase(),
        explanation: q.explanation.clone(),
        exam_types: q.exam_types.clone(),
        origin: QuestionOrigin::Authored,
        created_at: bank_base,
      })
      .await?;
  }

  // Seeds fill in whatever the bank did not define.
  for s in seed_subjects() {
    if store.subject(&s.id).await?.is_none() { store.insert_subject(s).await; }
  }
  for t in seed_topics() {
    if store.topic(&t.id).await?.is_none() { store.insert_topic(t).await; }
  }
  for c in seed_content() {
    if !store.insert_content_if_absent(c.clone()).await {
      warn!(target: "prepcore", id = %c.id, "Seed content shadowed by bank entry");
    }
  }
  for q in seed_questions() {
    store.insert_question(q).await?;
  }

  let (subjects, topics, content, questions) = store.inventory().await;
  info!(target: "prepcore", subjects, topics, content, questions, "Startup catalog inventory");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matcher::validate_options;

  #[test]
  fn seeds_are_internally_consistent() {
    let subjects: Vec<_> = seed_subjects().into_iter().map(|s| s.id).collect();
    let topics = seed_topics();
    for t in &topics {
      assert!(subjects.contains(&t.subject_id), "topic {} has unknown subject", t.id);
    }
    for c in seed_content() {
      assert!(subjects.contains(&c.subject_id));
      if let Some(t) = &c.topic_id {
        let topic = topics.iter().find(|x| &x.id == t).expect("known topic");
        assert_eq!(topic.subject_id, c.subject_id, "content {} topic/subject mismatch", c.id);
      }
    }
    for q in seed_questions().iter().chain(std::iter::once(&fallback_question(&"x".into(), Utc::now()))) {
      validate_options(&q.options, &q.answer_key).unwrap();
    }
  }

  #[test]
  fn fallback_is_not_durable() {
    let q = fallback_question(&"c1".into(), Utc::now());
    assert!(!q.is_durable());
    assert_eq!(q.id.as_str(), FALLBACK_QUESTION_ID);
  }

  #[tokio::test]
  async fn bank_entries_win_over_seeds() {
    let raw = r#"
      [[content]]
      id = "cl-self-defense"
      subject_id = "criminal-law"
      title = "Bank version"
      body = "Custom body"
    "#;
    let cfg = EngineConfig::from_toml_str(raw, "inline").unwrap();
    let store = MemoryStore::new();
    install_catalog(&store, &cfg).await.unwrap();
    let c = store.content(&"cl-self-defense".into()).await.unwrap().unwrap();
    assert_eq!(c.title, "Bank version");
    let (_, _, content, _) = store.inventory().await;
    assert_eq!(content, seed_content().len());
  }
}

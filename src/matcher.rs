//! Question matcher: resolves a question for a content item by descending
//! specificity (content → topic → subject), then on-demand generation, then
//! the static fallback. Also grades submitted answers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{
  exam_matches, AttemptRecord, ContentId, ContentItem, ExamType, LearnerId, Question, QuestionId, QuestionOrigin,
  QuestionScope, SubjectId,
};
use crate::error::{EngineError, GenerationError};
use crate::generator::{ContentGenerator, GeneratedQuestion, GenerationRequest};
use crate::seeds::{fallback_question, FALLBACK_QUESTION_ID};
use crate::store::Repository;
use crate::util::{label_index, option_label, same_text, trunc_for_log};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 5;

/// Where a resolved question came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
  /// Found in storage at the given tier ("content", "topic" or "subject").
  Stored { tier: String },
  /// Generated now and persisted at content level.
  Generated,
  /// Static stand-in; do not record as durable content.
  Fallback { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedQuestion {
  pub question: Question,
  pub resolution: Resolution,
}

/// Typed result of asking the generator, distinct from "nothing stored".
#[derive(Debug)]
pub enum GenerationOutcome {
  Success(Question),
  Unavailable(GenerationError),
}

/// Feedback for one submitted answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerFeedback {
  pub question_id: QuestionId,
  pub correct: bool,
  /// Label of the right option, e.g. "B".
  pub correct_answer: String,
  pub correct_option: String,
  pub explanation: String,
  /// False for the fallback question: nothing was persisted.
  pub recorded: bool,
}

/// Check option count and that `answer_key` labels one of the options.
pub fn validate_options(options: &[String], answer_key: &str) -> Result<(), String> {
  if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
    return Err(format!("expected {MIN_OPTIONS}-{MAX_OPTIONS} options, got {}", options.len()));
  }
  if options.iter().any(|o| o.trim().is_empty()) {
    return Err("empty option text".into());
  }
  if label_index(answer_key, options.len()).is_none() {
    return Err(format!("answer key '{answer_key}' does not label an option"));
  }
  Ok(())
}

/// Accepts either the option label or the option text.
pub fn grade(question: &Question, submitted: &str) -> bool {
  let Some(key) = label_index(&question.answer_key, question.options.len()) else {
    return false;
  };
  if let Some(idx) = label_index(submitted, question.options.len()) {
    return idx == key;
  }
  same_text(submitted, &question.options[key])
}

/// Turn raw generator output into a question linked at content level.
fn build_generated(
  generated: GeneratedQuestion,
  content: &ContentItem,
  exam: Option<&ExamType>,
  now: chrono::DateTime<chrono::Utc>,
) -> Result<Question, GenerationError> {
  let GeneratedQuestion { prompt, options, answer_key, explanation } = generated;
  if prompt.trim().is_empty() {
    return Err(GenerationError::Malformed("empty prompt".into()));
  }
  // Models sometimes answer with the option text instead of its letter.
  let answer_key = match label_index(&answer_key, options.len()) {
    Some(i) => option_label(i),
    None => options
      .iter()
      .position(|o| same_text(o, &answer_key))
      .map(option_label)
      .unwrap_or(answer_key),
  };
  validate_options(&options, &answer_key).map_err(GenerationError::Malformed)?;

  Ok(Question {
    id: QuestionId::new(format!("gen-{}", Uuid::new_v4())),
    scope: QuestionScope::Content(content.id.clone()),
    prompt: prompt.trim().to_string(),
    options: options.into_iter().map(|o| o.trim().to_string()).collect(),
    answer_key,
    explanation,
    exam_types: exam.cloned().into_iter().collect(),
    origin: QuestionOrigin::Generated,
    created_at: now,
  })
}

pub struct QuestionMatcher {
  repo: Arc<dyn Repository>,
  generator: Option<Arc<dyn ContentGenerator>>,
  clock: Arc<dyn Clock>,
  timeout: Duration,
}

impl QuestionMatcher {
  pub fn new(
    repo: Arc<dyn Repository>,
    generator: Option<Arc<dyn ContentGenerator>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
  ) -> Self {
    Self { repo, generator, clock, timeout }
  }

  pub fn has_generator(&self) -> bool { self.generator.is_some() }

  /// Resolve a question for `content_id`, skipping `exclude`. Never fails on
  /// generator trouble; storage failures and unknown content do propagate.
  #[instrument(level = "info", skip(self, exclude), fields(%content_id, excluded = exclude.len()))]
  pub async fn resolve_question(
    &self,
    content_id: &ContentId,
    exclude: &[QuestionId],
    exam: Option<&ExamType>,
  ) -> Result<ResolvedQuestion, EngineError> {
    let content = self.repo.content(content_id).await?.ok_or_else(|| EngineError::UnknownContent(content_id.clone()))?;

    let mut tiers = vec![QuestionScope::Content(content.id.clone())];
    if let Some(topic) = &content.topic_id {
      tiers.push(QuestionScope::Topic(topic.clone()));
    }
    tiers.push(QuestionScope::Subject(content.subject_id.clone()));

    for scope in &tiers {
      let found = self
        .repo
        .questions_for(scope)
        .await?
        .into_iter()
        .find(|q| !exclude.contains(&q.id) && exam_matches(&q.exam_types, exam));
      if let Some(question) = found {
        info!(target: "questions", %content_id, question = %question.id, tier = scope.tier(), "Resolved stored question");
        return Ok(ResolvedQuestion { question, resolution: Resolution::Stored { tier: scope.tier().to_string() } });
      }
      debug!(target: "questions", %content_id, tier = scope.tier(), "No usable question at tier");
    }

    match self.generate(&content, exam).await? {
      GenerationOutcome::Success(question) => {
        info!(target: "questions", %content_id, question = %question.id, "Generated and stored new question");
        Ok(ResolvedQuestion { question, resolution: Resolution::Generated })
      }
      GenerationOutcome::Unavailable(reason) => {
        warn!(target: "questions", %content_id, error = %reason, "Serving static fallback question");
        Ok(ResolvedQuestion {
          question: fallback_question(content_id, self.clock.now()),
          resolution: Resolution::Fallback { reason: reason.to_string() },
        })
      }
    }
  }

  /// Ask the generator (bounded by the configured timeout) and persist a
  /// valid result at content level. Only storage errors escape.
  async fn generate(&self, content: &ContentItem, exam: Option<&ExamType>) -> Result<GenerationOutcome, EngineError> {
    let Some(generator) = &self.generator else {
      return Ok(GenerationOutcome::Unavailable(GenerationError::Disabled));
    };

    let subject = match self.repo.subject(&content.subject_id).await? {
      Some(s) => s.name,
      None => content.subject_id.to_string(),
    };
    let req = GenerationRequest {
      content_id: content.id.clone(),
      title: content.title.clone(),
      body: content.body.clone(),
      subject,
      exam_type: exam.cloned(),
    };

    let generated = match tokio::time::timeout(self.timeout, generator.generate_question(&req)).await {
      Ok(Ok(g)) => g,
      Ok(Err(e)) => {
        error!(target: "questions", content_id = %content.id, generator = generator.name(), error = %e, "Generation failed");
        return Ok(GenerationOutcome::Unavailable(e));
      }
      Err(_) => {
        error!(target: "questions", content_id = %content.id, generator = generator.name(), timeout = ?self.timeout, "Generation timed out");
        return Ok(GenerationOutcome::Unavailable(GenerationError::Timeout(self.timeout)));
      }
    };

    let question = match build_generated(generated, content, exam, self.clock.now()) {
      Ok(q) => q,
      Err(e) => {
        warn!(target: "questions", content_id = %content.id, error = %e, "Generated question rejected");
        return Ok(GenerationOutcome::Unavailable(e));
      }
    };
    debug!(target: "questions", id = %question.id, prompt = %trunc_for_log(&question.prompt, 60), "Persisting generated question");
    self.repo.insert_question(question.clone()).await?;
    Ok(GenerationOutcome::Success(question))
  }

  /// Grade a submitted answer, log the attempt and bump the subject tally.
  /// Does not touch the review schedule.
  #[instrument(level = "info", skip(self, submitted), fields(%learner_id, %question_id, answer_len = submitted.len()))]
  pub async fn record_answer(
    &self,
    learner_id: &LearnerId,
    question_id: &QuestionId,
    submitted: &str,
  ) -> Result<AnswerFeedback, EngineError> {
    let learner = self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))?;
    if !learner.active {
      return Err(EngineError::InactiveLearner(learner_id.clone()));
    }

    if question_id.as_str() == FALLBACK_QUESTION_ID {
      let q = fallback_question(&ContentId::new(""), self.clock.now());
      let correct = grade(&q, submitted);
      debug!(target: "questions", %learner_id, %correct, "Fallback question graded; nothing recorded");
      return Ok(feedback(&q, correct, false));
    }

    let question = self.repo.question(question_id).await?.ok_or_else(|| EngineError::UnknownQuestion(question_id.clone()))?;
    let correct = grade(&question, submitted);

    self.repo
      .append_attempt(AttemptRecord {
        id: Uuid::new_v4().to_string(),
        learner_id: learner_id.clone(),
        question_id: question_id.clone(),
        submitted: submitted.to_string(),
        correct,
        at: self.clock.now(),
      })
      .await?;

    match self.subject_of(&question.scope).await? {
      Some(subject) => self.repo.record_subject_result(learner_id, &subject, correct).await?,
      None => warn!(target: "questions", question = %question_id, "Question scope points at missing catalog entry; subject tally skipped"),
    }

    info!(target: "questions", %learner_id, %question_id, %correct, "Answer recorded");
    Ok(feedback(&question, correct, true))
  }

  async fn subject_of(&self, scope: &QuestionScope) -> Result<Option<SubjectId>, EngineError> {
    Ok(match scope {
      QuestionScope::Content(id) => self.repo.content(id).await?.map(|c| c.subject_id),
      QuestionScope::Topic(id) => self.repo.topic(id).await?.map(|t| t.subject_id),
      QuestionScope::Subject(id) => Some(id.clone()),
    })
  }
}

fn feedback(q: &Question, correct: bool, recorded: bool) -> AnswerFeedback {
  let key = label_index(&q.answer_key, q.options.len());
  AnswerFeedback {
    question_id: q.id.clone(),
    correct,
    correct_answer: key.map(option_label).unwrap_or_else(|| q.answer_key.clone()),
    correct_option: key.map(|i| q.options[i].clone()).unwrap_or_default(),
    explanation: q.explanation.clone(),
    recorded,
  }
}

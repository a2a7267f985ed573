//! Loading engine configuration (plan limits, review policy, generation
//! prompts, optional catalog bank) from TOML.
//!
//! See `EngineConfig` for the expected schema. A missing
//! `PREPCORE_CONFIG_PATH` means built-in defaults.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::domain::{
  ContentId, ExamType, ModerationStatus, PlanTier, QuestionScope, ResourceKind, Subject, SubjectId, Topic, TopicId,
};
use crate::error::ConfigError;
use crate::sm2::{QualityMapping, DEFAULT_EASINESS, MAX_QUALITY, MIN_EASINESS, PASSING_QUALITY};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub access: AccessPolicy,
  #[serde(default)]
  pub review: ReviewConfig,
  #[serde(default)]
  pub generation: GenerationConfig,

  // Optional catalog bank layered over the built-in seeds.
  #[serde(default)]
  pub subjects: Vec<Subject>,
  #[serde(default)]
  pub topics: Vec<Topic>,
  #[serde(default)]
  pub content: Vec<ContentCfg>,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Daily allowances for one plan tier.
#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
pub struct PlanLimits {
  #[serde(default)] pub daily_questions: u32,
  #[serde(default)] pub daily_essays: u32,
}

/// Limits table consulted by the access ledger. Pure data: swapping it at
/// runtime changes decisions without touching the decision code.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AccessPolicy {
  #[serde(default = "default_trial_questions")]
  pub trial_questions: u32,
  #[serde(default = "default_trial_essays")]
  pub trial_essays: u32,
  /// Cutover offset assigned to learners registered without one.
  #[serde(default = "default_utc_offset")]
  pub default_utc_offset_minutes: i32,
  #[serde(default = "default_plans")]
  pub plans: HashMap<PlanTier, PlanLimits>,
}

fn default_trial_questions() -> u32 { 5 }
fn default_trial_essays() -> u32 { 1 }
fn default_utc_offset() -> i32 { -180 }
fn default_plans() -> HashMap<PlanTier, PlanLimits> {
  HashMap::from([
    (PlanTier::Free, PlanLimits { daily_questions: 0, daily_essays: 0 }),
    (PlanTier::Basic, PlanLimits { daily_questions: 20, daily_essays: 1 }),
    (PlanTier::Premium, PlanLimits { daily_questions: 60, daily_essays: 3 }),
  ])
}

impl Default for AccessPolicy {
  fn default() -> Self {
    Self {
      trial_questions: default_trial_questions(),
      trial_essays: default_trial_essays(),
      default_utc_offset_minutes: default_utc_offset(),
      plans: default_plans(),
    }
  }
}

impl AccessPolicy {
  /// Tiers missing from the table get no daily allowance.
  pub fn limits(&self, plan: PlanTier) -> PlanLimits {
    self.plans.get(&plan).copied().unwrap_or_default()
  }

  pub fn daily_limit(&self, plan: PlanTier, kind: ResourceKind) -> u32 {
    let limits = self.limits(plan);
    match kind {
      ResourceKind::Question => limits.daily_questions,
      ResourceKind::Essay => limits.daily_essays,
    }
  }

  pub fn trial_limit(&self, kind: ResourceKind) -> u32 {
    match kind {
      ResourceKind::Question => self.trial_questions,
      ResourceKind::Essay => self.trial_essays,
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct ReviewConfig {
  #[serde(default = "default_correct_quality")]
  pub correct_quality: u8,
  #[serde(default = "default_incorrect_quality")]
  pub incorrect_quality: u8,
  #[serde(default = "default_initial_easiness")]
  pub initial_easiness: f64,
}

fn default_correct_quality() -> u8 { 5 }
fn default_incorrect_quality() -> u8 { 2 }
fn default_initial_easiness() -> f64 { DEFAULT_EASINESS }

impl Default for ReviewConfig {
  fn default() -> Self {
    Self {
      correct_quality: default_correct_quality(),
      incorrect_quality: default_incorrect_quality(),
      initial_easiness: default_initial_easiness(),
    }
  }
}

impl ReviewConfig {
  pub fn quality_mapping(&self) -> QualityMapping {
    QualityMapping { correct: self.correct_quality, incorrect: self.incorrect_quality }
  }
}

/// Question generation settings. Prompt templates use `{title}`, `{body}`,
/// `{subject}` and `{exam_type}` placeholders.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GenerationConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_temperature")]
  pub temperature: f32,
  #[serde(default = "default_system_prompt")]
  pub system_prompt: String,
  #[serde(default = "default_user_template")]
  pub user_template: String,
}

fn default_timeout_secs() -> u64 { 15 }
fn default_temperature() -> f32 { 0.4 }
fn default_system_prompt() -> String {
  "You write multiple-choice questions for candidates preparing for police entrance exams. Respond ONLY with strict JSON.".into()
}
fn default_user_template() -> String {
  "Exam: {exam_type}\nSubject: {subject}\nTitle: {title}\nMaterial:\n{body}\n\nWrite ONE question that checks understanding of the material above. Return JSON with fields: prompt (string), options (array of 4 or 5 strings, no letter prefixes), answer_key (letter of the correct option, e.g. \"B\"), explanation (one or two sentences).".into()
}

impl Default for GenerationConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      temperature: default_temperature(),
      system_prompt: default_system_prompt(),
      user_template: default_user_template(),
    }
  }
}

impl GenerationConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

/// Content entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct ContentCfg {
  pub id: ContentId,
  pub subject_id: SubjectId,
  #[serde(default)] pub topic_id: Option<TopicId>,
  pub title: String,
  pub body: String,
  #[serde(default)] pub exam_types: Vec<ExamType>,
  #[serde(default)] pub status: Option<ModerationStatus>,
  #[serde(default)] pub created_at: Option<DateTime<Utc>>,
}

/// Question entry accepted in the TOML bank.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)] pub id: Option<String>,
  pub scope: QuestionScope,
  pub prompt: String,
  pub options: Vec<String>,
  pub answer_key: String,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub exam_types: Vec<ExamType>,
}

impl EngineConfig {
  pub fn from_toml_str(raw: &str, path: &str) -> Result<Self, ConfigError> {
    let cfg: EngineConfig =
      toml::from_str(raw).map_err(|source| ConfigError::Parse { path: path.to_string(), source })?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let r = &self.review;
    if r.correct_quality > MAX_QUALITY || r.correct_quality < PASSING_QUALITY {
      return Err(ConfigError::Invalid(format!(
        "review.correct_quality must be within {PASSING_QUALITY}..={MAX_QUALITY}, got {}",
        r.correct_quality
      )));
    }
    if r.incorrect_quality >= PASSING_QUALITY {
      return Err(ConfigError::Invalid(format!(
        "review.incorrect_quality must be below {PASSING_QUALITY}, got {}",
        r.incorrect_quality
      )));
    }
    if !r.initial_easiness.is_finite() || r.initial_easiness < MIN_EASINESS {
      return Err(ConfigError::Invalid(format!(
        "review.initial_easiness must be at least {MIN_EASINESS}, got {}",
        r.initial_easiness
      )));
    }
    for q in &self.questions {
      crate::matcher::validate_options(&q.options, &q.answer_key)
        .map_err(|e| ConfigError::Invalid(format!("question '{}': {e}", q.prompt)))?;
    }
    Ok(())
  }
}

/// Load `EngineConfig` from PREPCORE_CONFIG_PATH, or defaults when unset.
pub fn load_engine_config_from_env() -> Result<EngineConfig, ConfigError> {
  let Ok(path) = std::env::var("PREPCORE_CONFIG_PATH") else {
    info!(target: "prepcore", "PREPCORE_CONFIG_PATH not set; using built-in defaults");
    return Ok(EngineConfig::default());
  };
  let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
  let cfg = EngineConfig::from_toml_str(&raw, &path)?;
  info!(
    target: "prepcore",
    %path,
    content = cfg.content.len(),
    questions = cfg.questions.len(),
    "Loaded engine config (TOML)"
  );
  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_apply_to_empty_file() {
    let cfg = EngineConfig::from_toml_str("", "inline").unwrap();
    assert_eq!(cfg.access.trial_questions, 5);
    assert_eq!(cfg.access.daily_limit(PlanTier::Free, ResourceKind::Question), 0);
    assert_eq!(cfg.access.daily_limit(PlanTier::Basic, ResourceKind::Question), 20);
    assert_eq!(cfg.review.quality_mapping(), QualityMapping { correct: 5, incorrect: 2 });
  }

  #[test]
  fn plan_table_and_bank_parse() {
    let raw = r#"
      [access]
      trial_questions = 3

      [access.plans.BASIC]
      daily_questions = 10
      daily_essays = 2

      [[subjects]]
      id = "criminal-law"
      name = "Criminal Law"

      [[content]]
      id = "c-self-defense"
      subject_id = "criminal-law"
      title = "Self-defense"
      body = "Requirements of legitimate defense."

      [[questions]]
      scope = { level = "content", id = "c-self-defense" }
      prompt = "Which is a requirement?"
      options = ["Proportional means", "Prior warning"]
      answer_key = "A"
    "#;
    let cfg = EngineConfig::from_toml_str(raw, "inline").unwrap();
    assert_eq!(cfg.access.trial_questions, 3);
    assert_eq!(cfg.access.limits(PlanTier::Basic), PlanLimits { daily_questions: 10, daily_essays: 2 });
    // A partial plans table replaces the defaults entirely.
    assert_eq!(cfg.access.limits(PlanTier::Premium), PlanLimits::default());
    assert_eq!(cfg.subjects.len(), 1);
    assert_eq!(cfg.questions[0].scope, QuestionScope::Content("c-self-defense".into()));
  }

  #[test]
  fn passing_incorrect_quality_is_rejected() {
    let err = EngineConfig::from_toml_str("[review]\nincorrect_quality = 3\n", "inline").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
  }

  #[test]
  fn bank_question_with_bad_key_is_rejected() {
    let raw = r#"
      [[questions]]
      scope = { level = "subject", id = "s" }
      prompt = "?"
      options = ["a", "b"]
      answer_key = "D"
    "#;
    assert!(EngineConfig::from_toml_str(raw, "inline").is_err());
  }
}

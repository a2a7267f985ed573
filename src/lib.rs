//! Prepcore · adaptive learning and access-control engine.
//!
//! Decides, for one learner at one moment, whether another question or essay
//! may be consumed, which content item to show next, and when seen material
//! must come back for spaced review.
//!
//! Entry point is [`LearningEngine`]; storage goes through the narrow traits
//! in [`store`], generation through [`generator::ContentGenerator`].

pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod matcher;
pub mod protocol;
pub mod routes;
pub mod seeds;
pub mod selector;
pub mod sm2;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccessPolicy, EngineConfig, PlanLimits};
pub use domain::{Bucket, ContentId, LearnerId, PlanTier, QuestionId, ResourceKind};
pub use engine::{LearningEngine, OnboardingProfile, SubmitOutcome};
pub use error::{EngineError, GenerationError, StoreError};
pub use ledger::{AccessDecision, AccessReason};
pub use matcher::{Resolution, ResolvedQuestion};
pub use selector::Selection;
pub use sm2::compute_review;

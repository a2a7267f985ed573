//! Public HTTP request/response structs (serde ready).
//! Keep this small and stable so the delivery layer and its clients can evolve independently.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Bucket, ContentId, ContentItem, ExamType, PlanTier, Question, QuestionId, QuestionOrigin, ResourceKind, SubjectId,
    TopicId,
};
use crate::matcher::{Resolution, ResolvedQuestion};
use crate::selector::Selection;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generator: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
    pub retryable: bool,
}

//
// Learner profile
//

#[derive(Debug, Deserialize)]
pub struct RegisterIn {
    #[serde(rename = "learnerId")]
    pub learner_id: String,
    #[serde(default, rename = "utcOffsetMinutes")]
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PlanIn {
    pub plan: PlanTier,
}

//
// Access
//

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    #[serde(default)]
    pub kind: ResourceKind,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeIn {
    #[serde(default)]
    pub kind: ResourceKind,
    pub bucket: Bucket,
    /// `version` from the access decision being acted on.
    pub version: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreditsIn {
    pub amount: u32,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Serialize)]
pub struct CreditsOut {
    pub balance: u32,
}

//
// Content
//

/// Content as shown to the learner.
#[derive(Debug, Serialize)]
pub struct ContentOut {
    pub id: ContentId,
    pub subject_id: SubjectId,
    pub topic_id: Option<TopicId>,
    pub title: String,
    pub body: String,
}

impl From<&ContentItem> for ContentOut {
    fn from(c: &ContentItem) -> Self {
        Self {
            id: c.id.clone(),
            subject_id: c.subject_id.clone(),
            topic_id: c.topic_id.clone(),
            title: c.title.clone(),
            body: c.body.clone(),
        }
    }
}

/// `content` is null when the learner has gone through everything.
#[derive(Debug, Serialize)]
pub struct NextContentOut {
    pub reason: &'static str,
    pub content: Option<ContentOut>,
}

impl From<&Selection> for NextContentOut {
    fn from(s: &Selection) -> Self {
        Self { reason: s.label(), content: s.content().map(ContentOut::from) }
    }
}

//
// Questions
//

#[derive(Debug, Deserialize)]
pub struct ResolveIn {
    #[serde(rename = "contentId")]
    pub content_id: ContentId,
    #[serde(default)]
    pub exclude: Vec<QuestionId>,
    /// Overrides the learner's exam target when both are given.
    #[serde(default, rename = "examType")]
    pub exam_type: Option<ExamType>,
    #[serde(default, rename = "learnerId")]
    pub learner_id: Option<String>,
}

/// Question without its answer key.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub origin: QuestionOrigin,
    pub resolution: Resolution,
}

pub fn to_out(r: &ResolvedQuestion) -> QuestionOut {
    let Question { id, prompt, options, origin, .. } = &r.question;
    QuestionOut {
        id: id.clone(),
        prompt: prompt.clone(),
        options: options.clone(),
        origin: *origin,
        resolution: r.resolution.clone(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    #[serde(rename = "questionId")]
    pub question_id: QuestionId,
    pub answer: String,
    /// When present the answer also updates the review schedule for this content.
    #[serde(default, rename = "contentId")]
    pub content_id: Option<ContentId>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewIn {
    #[serde(rename = "contentId")]
    pub content_id: ContentId,
    pub quality: u8,
}

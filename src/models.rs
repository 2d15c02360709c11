use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Integer ids: server-assigned remotely, millisecond timestamps when created offline
pub type Id = i64;

/// Display name used for anonymous posts.
pub const ANONYMOUS_AUTHOR: &str = "匿名";

/// Entity collections handled by the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Reviews,
    Comments,
    Questions,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Reviews => "reviews",
            EntityKind::Comments => "comments",
            EntityKind::Questions => "questions",
        }
    }
}

/// Declares the optional descriptive review attributes once and derives both
/// their cache shape (camelCase) and their wire columns (snake_case) from the
/// same list, so the translation cannot drift.
macro_rules! review_details {
    ($($field:ident),* $(,)?) => {
        /// Optional free-text attributes of a review.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "camelCase")]
        pub struct ReviewDetails {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<String>,
            )*
        }

        /// Wire columns for [`ReviewDetails`].
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct ReviewDetailColumns {
            $(
                #[serde(default)]
                pub $field: Option<String>,
            )*
        }

        impl From<ReviewDetailColumns> for ReviewDetails {
            fn from(c: ReviewDetailColumns) -> Self {
                Self { $($field: c.$field,)* }
            }
        }

        impl From<&ReviewDetails> for ReviewDetailColumns {
            fn from(d: &ReviewDetails) -> Self {
                Self { $($field: non_empty(&d.$field),)* }
            }
        }
    };
}

review_details!(
    major,
    study_major,
    selection_reason,
    start_date,
    start_year,
    end_date,
    end_year,
    vacation_period,
    credits_earned,
    credits_transferred,
    credits_300_level,
    language_cert,
    language_score,
    class_language,
    cost_of_living,
    cost_of_living_note,
    food_cost,
    rent,
    cultural_impression,
    safety,
    climate,
    daily_meals,
    accommodation,
    extracurricular_activities,
    extracurricular_activities_note,
    positives,
    challenges,
);

/// Empty strings travel as `null`.
pub fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn default_satisfaction() -> f64 {
    5.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub id: Id,
    /// None means anonymous / unclaimed.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    pub author: String,
    pub country: String,
    pub university: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub title: String,
    #[serde(default = "default_satisfaction")]
    pub satisfaction: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub strong_fields: Vec<String>,
    #[serde(flatten)]
    pub details: ReviewDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Review {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1.0..=5.0).contains(&self.satisfaction) {
            return Err(ValidationError::SatisfactionOutOfRange(self.satisfaction));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::Empty("title"));
        }
        if self.author.trim().is_empty() {
            return Err(ValidationError::MissingAuthor);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id,
    pub review_id: Id,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    pub author_name: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Only set on comments created or stamped by this installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: Id,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub author: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Id,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub author: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(rename = "question")]
    pub body: String,
    // monotonic: never reset to false
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    /// Taken from the path when posted over HTTP.
    #[serde(default)]
    pub review_id: Id,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(rename = "question")]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAnswer {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateComment {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("satisfaction must be between 1.0 and 5.0 (got {0})")]
    SatisfactionOutOfRange(f64),
    #[error("enter a name or choose to post anonymously")]
    MissingAuthor,
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Author shown for a post: the fixed anonymous label, or the trimmed name.
pub fn author_label(is_anonymous: bool, name: &str) -> Result<String, ValidationError> {
    if is_anonymous {
        return Ok(ANONYMOUS_AUTHOR.to_string());
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingAuthor);
    }
    Ok(name.to_string())
}

/// Trimmed body text, rejecting blanks.
pub fn body_text(field: &'static str, text: &str) -> Result<String, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(text.to_string())
}

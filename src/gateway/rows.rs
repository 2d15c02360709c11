//! Snake_case wire rows and their translation to and from the cache shape.
//!
//! Read rows are lenient (missing columns get defaults). Write rows never
//! carry `id`, `created_at` or session ids, and send empty strings as `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{non_empty, Answer, Comment, Id, Question, Review, ReviewDetailColumns};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D, fallback: f64) -> Result<f64, D::Error> {
    Ok(match Option::<NumberOrString>::deserialize(d)? {
        Some(NumberOrString::Number(n)) => n,
        Some(NumberOrString::Text(s)) => s.trim().parse().unwrap_or(fallback),
        None => fallback,
    })
}

fn satisfaction<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    lenient_f64(d, 5.0)
}

fn cost<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    lenient_f64(d, 0.0)
}

fn default_satisfaction() -> f64 {
    5.0
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRow {
    pub id: Id,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub university: String,
    #[serde(default)]
    pub university_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default = "default_satisfaction", deserialize_with = "satisfaction")]
    pub satisfaction: f64,
    #[serde(default, deserialize_with = "cost")]
    pub cost: f64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub excerpt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub strong_fields: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: ReviewDetailColumns,
}

impl From<ReviewRow> for Review {
    fn from(r: ReviewRow) -> Self {
        Review {
            id: r.id,
            owner_user_id: r.user_id.filter(|u| !u.is_empty()),
            author: r.author,
            country: r.country,
            university: r.university,
            university_id: r.university_id,
            region: r.region,
            title: r.title,
            satisfaction: r.satisfaction,
            cost: r.cost,
            language: r.language,
            date: r.date,
            excerpt: r.excerpt,
            strong_fields: r.strong_fields,
            details: r.details.into(),
            created_at: r.created_at,
        }
    }
}

/// Mutable review columns, shared by insert and update.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewFields {
    pub author: String,
    pub country: String,
    pub university: String,
    pub university_id: Option<String>,
    pub region: Option<String>,
    pub title: String,
    pub satisfaction: f64,
    pub cost: f64,
    pub language: Option<String>,
    pub date: String,
    pub excerpt: String,
    pub strong_fields: Vec<String>,
    #[serde(flatten)]
    pub details: ReviewDetailColumns,
}

impl From<&Review> for ReviewFields {
    fn from(r: &Review) -> Self {
        ReviewFields {
            author: r.author.clone(),
            country: r.country.clone(),
            university: r.university.clone(),
            university_id: non_empty(&r.university_id),
            region: non_empty(&r.region),
            title: r.title.clone(),
            satisfaction: r.satisfaction,
            cost: r.cost,
            language: non_empty(&r.language),
            date: r.date.clone(),
            excerpt: r.excerpt.clone(),
            strong_fields: r.strong_fields.clone(),
            details: (&r.details).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReviewRow {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub fields: ReviewFields,
}

impl From<&Review> for NewReviewRow {
    fn from(r: &Review) -> Self {
        NewReviewRow { user_id: non_empty(&r.owner_user_id), fields: r.into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRow {
    pub id: Id,
    pub review_id: Id,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_anonymous: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Comment {
            id: r.id,
            review_id: r.review_id,
            owner_user_id: r.user_id.filter(|u| !u.is_empty()),
            author_name: r.author_name,
            is_anonymous: r.is_anonymous,
            content: r.content,
            created_at: r.created_at,
            updated_at: r.updated_at,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCommentRow {
    pub review_id: Id,
    pub user_id: Option<String>,
    pub author_name: String,
    pub is_anonymous: bool,
    pub content: String,
}

impl From<&Comment> for NewCommentRow {
    fn from(c: &Comment) -> Self {
        NewCommentRow {
            review_id: c.review_id,
            user_id: non_empty(&c.owner_user_id),
            author_name: c.author_name.clone(),
            is_anonymous: c.is_anonymous,
            content: c.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentContentPatch {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRow {
    pub id: Id,
    #[serde(default)]
    pub question_id: Option<Id>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_anonymous: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<AnswerRow> for Answer {
    fn from(r: AnswerRow) -> Self {
        Answer {
            id: r.id,
            owner_user_id: r.user_id.filter(|u| !u.is_empty()),
            session_id: None,
            author: r.author_name,
            is_anonymous: r.is_anonymous,
            content: r.content,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAnswerRow {
    pub question_id: Id,
    pub user_id: Option<String>,
    pub author_name: String,
    pub is_anonymous: bool,
    pub content: String,
}

impl NewAnswerRow {
    pub fn new(question_id: Id, a: &Answer) -> Self {
        NewAnswerRow {
            question_id,
            user_id: non_empty(&a.owner_user_id),
            author_name: a.author.clone(),
            is_anonymous: a.is_anonymous,
            content: a.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRow {
    pub id: Id,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_anonymous: bool,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_resolved: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answers: Vec<AnswerRow>,
}

impl From<QuestionRow> for Question {
    fn from(r: QuestionRow) -> Self {
        Question {
            id: r.id,
            owner_user_id: r.user_id.filter(|u| !u.is_empty()),
            session_id: None,
            author: r.author_name,
            is_anonymous: r.is_anonymous,
            country: r.country,
            university: r.university,
            body: r.body,
            is_resolved: r.is_resolved,
            created_at: r.created_at,
            answers: r.answers.into_iter().map(Answer::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewQuestionRow {
    pub user_id: Option<String>,
    pub author_name: String,
    pub is_anonymous: bool,
    pub country: Option<String>,
    pub university: Option<String>,
    pub body: String,
    pub is_resolved: bool,
}

impl From<&Question> for NewQuestionRow {
    fn from(q: &Question) -> Self {
        NewQuestionRow {
            user_id: non_empty(&q.owner_user_id),
            author_name: q.author.clone(),
            is_anonymous: q.is_anonymous,
            country: non_empty(&q.country),
            university: non_empty(&q.university),
            body: q.body.clone(),
            is_resolved: q.is_resolved,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResolvedPatch {
    pub is_resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn review_row_is_lenient() {
        let row: ReviewRow = serde_json::from_value(json!({
            "id": 42,
            "user_id": null,
            "author": "Mika",
            "title": "Semester in Lyon",
            "satisfaction": "4.5",
            "strong_fields": null,
            "credits_300_level": "9",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let review: Review = row.into();
        assert_eq!(review.id, 42);
        assert_eq!(review.satisfaction, 4.5);
        assert!(review.strong_fields.is_empty());
        assert_eq!(review.details.credits_300_level.as_deref(), Some("9"));
        assert!(review.owner_user_id.is_none());
    }

    #[test]
    fn missing_satisfaction_defaults_to_five() {
        let row: ReviewRow = serde_json::from_value(json!({"id": 1, "satisfaction": null})).unwrap();
        assert_eq!(row.satisfaction, 5.0);
        let row: ReviewRow = serde_json::from_value(json!({"id": 1})).unwrap();
        assert_eq!(row.satisfaction, 5.0);
    }

    #[test]
    fn review_write_uses_wire_columns() {
        let mut review: Review = serde_json::from_value(json!({
            "id": 7, "userId": "u1", "author": "a", "country": "Korea",
            "university": "SNU", "universityId": "", "title": "t",
            "strongFields": ["engineering"], "sessionId": "s"
        }))
        .unwrap();
        review.details.credits_300_level = Some("12".into());
        review.details.major = Some(String::new());
        let v = serde_json::to_value(NewReviewRow::from(&review)).unwrap();
        assert_eq!(v["user_id"], "u1");
        assert_eq!(v["university_id"], serde_json::Value::Null);
        assert_eq!(v["strong_fields"], json!(["engineering"]));
        assert_eq!(v["credits_300_level"], "12");
        assert_eq!(v["major"], serde_json::Value::Null);
        assert!(v.get("id").is_none());
        assert!(v.get("created_at").is_none());
        assert!(v.get("sessionId").is_none());
        assert!(v.get("session_id").is_none());
    }

    #[test]
    fn question_row_embeds_answers() {
        let row: QuestionRow = serde_json::from_value(json!({
            "id": 3, "user_id": "u9", "author_name": "Ken", "is_anonymous": false,
            "body": "Visa timeline?", "is_resolved": true,
            "answers": [{"id": 10, "question_id": 3, "author_name": "匿名", "is_anonymous": true, "content": "3 months"}]
        }))
        .unwrap();
        let q: Question = row.into();
        assert_eq!(q.body, "Visa timeline?");
        assert!(q.is_resolved);
        assert_eq!(q.answers.len(), 1);
        assert_eq!(q.answers[0].author, "匿名");
        assert!(q.answers[0].session_id.is_none());
    }
}

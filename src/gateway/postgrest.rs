use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::rows::*;
use super::*;
use crate::config::RemoteConfig;

const REVIEWS: &str = "reviews";
const COMMENTS: &str = "review_comments";
const QUESTIONS: &str = "questions";
const ANSWERS: &str = "answers";

/// Gateway speaking the PostgREST dialect exposed by Supabase under `/rest/v1`.
#[derive(Clone)]
pub struct PostgrestGateway {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl PostgrestGateway {
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: RemoteConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn request(&self, method: Method, table: &str, token: Option<&str>) -> GatewayResult<RequestBuilder> {
        if !self.config.is_available() {
            return Err(GatewayError::Unconfigured);
        }
        let bearer = token.filter(|t| !t.is_empty()).unwrap_or(&self.config.anon_key);
        Ok(self
            .client
            .request(method, self.table_url(table))
            .header("apikey", &self.config.anon_key)
            .header(AUTHORIZATION, format!("Bearer {bearer}")))
    }

    async fn fetch<T: DeserializeOwned>(&self, rb: RequestBuilder) -> GatewayResult<Vec<T>> {
        let resp = rb.send().await.map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }
        resp.json::<Vec<T>>()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("unreadable response: {e}")))
    }

    /// Runs a mutation and returns the single affected row.
    async fn mutate<T: DeserializeOwned>(&self, rb: RequestBuilder) -> GatewayResult<T> {
        let rows = self.fetch::<T>(rb.header("Prefer", "return=representation")).await?;
        // row-level security filters silently: zero rows back means nothing changed
        rows.into_iter()
            .next()
            .ok_or_else(|| GatewayError::rejected(StatusCode::FORBIDDEN.as_u16(), "no rows affected (row-level security policy?)"))
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        token: Option<&str>,
    ) -> GatewayResult<T> {
        let rb = self.request(Method::POST, table, token)?.json(body);
        self.mutate(rb).await
    }

    async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        id: Id,
        body: &B,
        token: Option<&str>,
    ) -> GatewayResult<T> {
        let rb = self
            .request(Method::PATCH, table, token)?
            .query(&[("id", format!("eq.{id}"))])
            .json(body);
        self.mutate(rb).await
    }

    async fn delete(&self, table: &str, id: Id, token: Option<&str>) -> GatewayResult<()> {
        let rb = self
            .request(Method::DELETE, table, token)?
            .query(&[("id", format!("eq.{id}"))]);
        self.mutate::<Value>(rb).await.map(|_| ())
    }
}

/// Maps a non-success response to the error taxonomy.
fn classify(status: StatusCode, body: &str) -> GatewayError {
    if status.is_server_error() {
        return GatewayError::Unavailable(format!("{status}: {body}"));
    }
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let field = |name: &str| -> Option<String> {
        match parsed.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    };
    GatewayError::Rejected(RemoteRejection {
        status: status.as_u16(),
        message: field("message").unwrap_or_else(|| body.to_string()),
        code: field("code"),
        hint: field("hint"),
        details: field("details"),
    })
}

impl Availability for PostgrestGateway {
    fn is_available(&self) -> bool {
        self.config.is_available()
    }
}

#[async_trait]
impl ReviewGateway for PostgrestGateway {
    async fn list_reviews(&self, token: Option<&str>) -> GatewayResult<Vec<Review>> {
        let rb = self
            .request(Method::GET, REVIEWS, token)?
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        let rows: Vec<ReviewRow> = self.fetch(rb).await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn insert_review(&self, review: &Review, token: Option<&str>) -> GatewayResult<Review> {
        let row: ReviewRow = self.insert(REVIEWS, &NewReviewRow::from(review), token).await?;
        Ok(row.into())
    }

    async fn update_review(&self, id: Id, review: &Review, token: Option<&str>) -> GatewayResult<Review> {
        let row: ReviewRow = self.patch(REVIEWS, id, &ReviewFields::from(review), token).await?;
        Ok(row.into())
    }

    async fn delete_review(&self, id: Id, token: Option<&str>) -> GatewayResult<()> {
        self.delete(REVIEWS, id, token).await
    }
}

#[async_trait]
impl CommentGateway for PostgrestGateway {
    async fn list_comments(&self, review_id: Id, token: Option<&str>) -> GatewayResult<Vec<Comment>> {
        let rb = self.request(Method::GET, COMMENTS, token)?.query(&[
            ("select", "*".to_string()),
            ("review_id", format!("eq.{review_id}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<CommentRow> = self.fetch(rb).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn insert_comment(&self, comment: &Comment, token: Option<&str>) -> GatewayResult<Comment> {
        let row: CommentRow = self.insert(COMMENTS, &NewCommentRow::from(comment), token).await?;
        Ok(row.into())
    }

    async fn update_comment(&self, id: Id, content: &str, token: Option<&str>) -> GatewayResult<Comment> {
        let patch = CommentContentPatch { content: content.to_string(), updated_at: chrono::Utc::now() };
        let row: CommentRow = self.patch(COMMENTS, id, &patch, token).await?;
        Ok(row.into())
    }

    async fn delete_comment(&self, id: Id, token: Option<&str>) -> GatewayResult<()> {
        self.delete(COMMENTS, id, token).await
    }
}

#[async_trait]
impl QuestionGateway for PostgrestGateway {
    async fn list_questions(&self, token: Option<&str>) -> GatewayResult<Vec<Question>> {
        let rb = self.request(Method::GET, QUESTIONS, token)?.query(&[
            ("select", "*,answers(*)"),
            ("order", "created_at.desc"),
            ("answers.order", "created_at.asc"),
        ]);
        let rows: Vec<QuestionRow> = self.fetch(rb).await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn insert_question(&self, question: &Question, token: Option<&str>) -> GatewayResult<Question> {
        let row: QuestionRow = self.insert(QUESTIONS, &NewQuestionRow::from(question), token).await?;
        Ok(row.into())
    }

    async fn update_question(&self, id: Id, patch: &QuestionPatch, token: Option<&str>) -> GatewayResult<()> {
        let body = QuestionResolvedPatch { is_resolved: patch.is_resolved };
        self.patch::<_, Value>(QUESTIONS, id, &body, token).await.map(|_| ())
    }

    async fn delete_question(&self, id: Id, token: Option<&str>) -> GatewayResult<()> {
        self.delete(QUESTIONS, id, token).await
    }

    async fn insert_answer(&self, question_id: Id, answer: &Answer, token: Option<&str>) -> GatewayResult<Answer> {
        let row: AnswerRow = self.insert(ANSWERS, &NewAnswerRow::new(question_id, answer), token).await?;
        Ok(row.into())
    }

    async fn delete_answer(&self, id: Id, token: Option<&str>) -> GatewayResult<()> {
        self.delete(ANSWERS, id, token).await
    }
}

//! Remote relational store boundary.

use async_trait::async_trait;

use crate::models::{Answer, Comment, Id, Question, Review};

pub mod rows;
pub mod postgrest;

#[cfg(feature = "inmem-gateway")]
pub mod inmem;

/// Structured rejection body returned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRejection {
    pub status: u16,
    pub message: String,
    pub code: Option<String>,
    pub hint: Option<String>,
    pub details: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("remote store is not configured")]
    Unconfigured,
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote store rejected the request ({}): {}", .0.status, .0.message)]
    Rejected(RemoteRejection),
}

impl GatewayError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Rejected(RemoteRejection { status, message: message.into(), ..Default::default() })
    }

    pub fn rejection(&self) -> Option<&RemoteRejection> {
        match self {
            GatewayError::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Row-level security or auth denial, as opposed to a malformed request.
    pub fn is_permission_denied(&self) -> bool {
        let Some(r) = self.rejection() else { return false };
        if matches!(r.status, 401 | 403) {
            return true;
        }
        if matches!(r.code.as_deref(), Some("42501") | Some("PGRST116")) {
            return true;
        }
        let msg = r.message.to_lowercase();
        msg.contains("permission") || msg.contains("policy") || msg.contains("row-level")
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Partial update for a question. Only resolution can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionPatch {
    pub is_resolved: bool,
}

// `token` is the caller's access token; `None` means the anonymous key is used.

#[async_trait]
pub trait ReviewGateway: Send + Sync {
    async fn list_reviews(&self, token: Option<&str>) -> GatewayResult<Vec<Review>>;
    async fn insert_review(&self, review: &Review, token: Option<&str>) -> GatewayResult<Review>;
    async fn update_review(&self, id: Id, review: &Review, token: Option<&str>) -> GatewayResult<Review>;
    async fn delete_review(&self, id: Id, token: Option<&str>) -> GatewayResult<()>;
}

#[async_trait]
pub trait CommentGateway: Send + Sync {
    async fn list_comments(&self, review_id: Id, token: Option<&str>) -> GatewayResult<Vec<Comment>>;
    async fn insert_comment(&self, comment: &Comment, token: Option<&str>) -> GatewayResult<Comment>;
    async fn update_comment(&self, id: Id, content: &str, token: Option<&str>) -> GatewayResult<Comment>;
    async fn delete_comment(&self, id: Id, token: Option<&str>) -> GatewayResult<()>;
}

#[async_trait]
pub trait QuestionGateway: Send + Sync {
    /// Questions newest first, each with its answers oldest first.
    async fn list_questions(&self, token: Option<&str>) -> GatewayResult<Vec<Question>>;
    async fn insert_question(&self, question: &Question, token: Option<&str>) -> GatewayResult<Question>;
    async fn update_question(&self, id: Id, patch: &QuestionPatch, token: Option<&str>) -> GatewayResult<()>;
    async fn delete_question(&self, id: Id, token: Option<&str>) -> GatewayResult<()>;
    async fn insert_answer(&self, question_id: Id, answer: &Answer, token: Option<&str>) -> GatewayResult<Answer>;
    async fn delete_answer(&self, id: Id, token: Option<&str>) -> GatewayResult<()>;
}

pub trait Availability: Send + Sync {
    /// Pure configuration check; never touches the network.
    fn is_available(&self) -> bool;
}

pub trait RemoteGateway: ReviewGateway + CommentGateway + QuestionGateway + Availability {}

impl<T> RemoteGateway for T where T: ReviewGateway + CommentGateway + QuestionGateway + Availability {}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(status: u16, code: Option<&str>, message: &str) -> GatewayError {
        GatewayError::Rejected(RemoteRejection {
            status,
            message: message.into(),
            code: code.map(Into::into),
            ..Default::default()
        })
    }

    #[test]
    fn permission_denials_are_recognised() {
        assert!(rejection(403, None, "forbidden").is_permission_denied());
        assert!(rejection(400, Some("42501"), "insufficient privilege").is_permission_denied());
        assert!(rejection(400, None, "new row violates row-level security policy").is_permission_denied());
        assert!(!rejection(400, Some("22P02"), "invalid input syntax").is_permission_denied());
        assert!(!GatewayError::Unavailable("timeout".into()).is_permission_denied());
        assert!(!GatewayError::Unconfigured.is_permission_denied());
    }
}

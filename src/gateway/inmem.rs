//! Process-local stand-in for the remote store with fault injection.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::*;

#[derive(Default)]
struct State {
    reviews: BTreeMap<Id, Review>,
    comments: BTreeMap<Id, Comment>,
    questions: BTreeMap<Id, Question>,
    next_id: Id,
    inserts: usize,
    available: bool,
    failure: Option<GatewayError>,
    reject_deletes: bool,
}

#[derive(Clone)]
pub struct InMemGateway {
    state: Arc<RwLock<State>>,
}

impl InMemGateway {
    /// A configured, healthy, empty store.
    pub fn new() -> Self {
        let state = State { available: true, ..Default::default() };
        Self { state: Arc::new(RwLock::new(state)) }
    }

    /// A store whose configuration is absent.
    pub fn unconfigured() -> Self {
        let gw = Self::new();
        gw.set_available(false);
        gw
    }

    /// Next server-assigned id will be `next`.
    pub fn with_next_id(self, next: Id) -> Self {
        self.write().next_id = next - 1;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        self.write().available = available;
    }

    /// Every subsequent call fails with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<GatewayError>) {
        self.write().failure = failure;
    }

    /// Deletes are refused the way a row-level security policy would.
    pub fn reject_deletes(&self, reject: bool) {
        self.write().reject_deletes = reject;
    }

    /// Number of successful inserts across all tables.
    pub fn insert_count(&self) -> usize {
        self.read().inserts
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.read().reviews.values().cloned().collect()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.read().questions.values().cloned().collect()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.read().comments.values().cloned().collect()
    }

    fn guard(&self) -> GatewayResult<RwLockWriteGuard<'_, State>> {
        let s = self.write();
        if !s.available {
            return Err(GatewayError::Unconfigured);
        }
        if let Some(f) = &s.failure {
            return Err(f.clone());
        }
        Ok(s)
    }

    fn guard_delete(&self) -> GatewayResult<RwLockWriteGuard<'_, State>> {
        let s = self.guard()?;
        if s.reject_deletes {
            return Err(GatewayError::Rejected(RemoteRejection {
                status: 403,
                message: "permission denied by row-level security policy".into(),
                code: Some("42501".into()),
                ..Default::default()
            }));
        }
        Ok(s)
    }
}

impl Default for InMemGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    // ids and timestamps both increase so ordering by created_at is stable
    fn stamp(&mut self) -> (Id, chrono::DateTime<Utc>) {
        self.next_id += 1;
        self.inserts += 1;
        (self.next_id, Utc::now() + Duration::milliseconds(self.next_id))
    }
}

fn not_found(id: Id) -> GatewayError {
    GatewayError::rejected(403, format!("no rows affected for id {id}"))
}

impl Availability for InMemGateway {
    fn is_available(&self) -> bool {
        self.read().available
    }
}

#[async_trait]
impl ReviewGateway for InMemGateway {
    async fn list_reviews(&self, _token: Option<&str>) -> GatewayResult<Vec<Review>> {
        let s = self.guard()?;
        let mut v: Vec<Review> = s.reviews.values().cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn insert_review(&self, review: &Review, _token: Option<&str>) -> GatewayResult<Review> {
        let mut s = self.guard()?;
        let (id, now) = s.stamp();
        let stored = Review { id, created_at: Some(now), ..review.clone() };
        s.reviews.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_review(&self, id: Id, review: &Review, _token: Option<&str>) -> GatewayResult<Review> {
        let mut s = self.guard()?;
        let existing = s.reviews.get_mut(&id).ok_or_else(|| not_found(id))?;
        *existing = Review {
            id,
            owner_user_id: existing.owner_user_id.clone(),
            created_at: existing.created_at,
            ..review.clone()
        };
        Ok(existing.clone())
    }

    async fn delete_review(&self, id: Id, _token: Option<&str>) -> GatewayResult<()> {
        let mut s = self.guard_delete()?;
        s.reviews.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl CommentGateway for InMemGateway {
    async fn list_comments(&self, review_id: Id, _token: Option<&str>) -> GatewayResult<Vec<Comment>> {
        let s = self.guard()?;
        let mut v: Vec<Comment> = s.comments.values().filter(|c| c.review_id == review_id).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn insert_comment(&self, comment: &Comment, _token: Option<&str>) -> GatewayResult<Comment> {
        let mut s = self.guard()?;
        let (id, now) = s.stamp();
        let stored = Comment { id, created_at: now, updated_at: None, session_id: None, ..comment.clone() };
        s.comments.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_comment(&self, id: Id, content: &str, _token: Option<&str>) -> GatewayResult<Comment> {
        let mut s = self.guard()?;
        let existing = s.comments.get_mut(&id).ok_or_else(|| not_found(id))?;
        existing.content = content.to_string();
        existing.updated_at = Some(Utc::now());
        Ok(existing.clone())
    }

    async fn delete_comment(&self, id: Id, _token: Option<&str>) -> GatewayResult<()> {
        let mut s = self.guard_delete()?;
        s.comments.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
    }
}

#[async_trait]
impl QuestionGateway for InMemGateway {
    async fn list_questions(&self, _token: Option<&str>) -> GatewayResult<Vec<Question>> {
        let s = self.guard()?;
        let mut v: Vec<Question> = s.questions.values().cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn insert_question(&self, question: &Question, _token: Option<&str>) -> GatewayResult<Question> {
        let mut s = self.guard()?;
        let (id, now) = s.stamp();
        let stored = Question { id, created_at: Some(now), session_id: None, answers: Vec::new(), ..question.clone() };
        s.questions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_question(&self, id: Id, patch: &QuestionPatch, _token: Option<&str>) -> GatewayResult<()> {
        let mut s = self.guard()?;
        let existing = s.questions.get_mut(&id).ok_or_else(|| not_found(id))?;
        existing.is_resolved = patch.is_resolved;
        Ok(())
    }

    async fn delete_question(&self, id: Id, _token: Option<&str>) -> GatewayResult<()> {
        let mut s = self.guard_delete()?;
        s.questions.remove(&id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn insert_answer(&self, question_id: Id, answer: &Answer, _token: Option<&str>) -> GatewayResult<Answer> {
        let mut s = self.guard()?;
        if !s.questions.contains_key(&question_id) {
            return Err(GatewayError::rejected(409, format!("question {question_id} does not exist")));
        }
        let (id, now) = s.stamp();
        let stored = Answer { id, created_at: Some(now), session_id: None, ..answer.clone() };
        if let Some(q) = s.questions.get_mut(&question_id) {
            q.answers.push(stored.clone());
        }
        Ok(stored)
    }

    async fn delete_answer(&self, id: Id, _token: Option<&str>) -> GatewayResult<()> {
        let mut s = self.guard_delete()?;
        for q in s.questions.values_mut() {
            if let Some(pos) = q.answers.iter().position(|a| a.id == id) {
                q.answers.remove(pos);
                return Ok(());
            }
        }
        Err(not_found(id))
    }
}

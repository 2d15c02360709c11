use chrono::Utc;

use super::comments::display_or;
use super::*;
use crate::gateway::QuestionPatch;
use crate::models::{author_label, body_text, Answer, NewAnswer, NewQuestion};

impl Synchronizer {
    /// Questions newest first, answers oldest first within each.
    pub async fn get_all_questions(&self, ctx: &IdentityContext) -> Vec<Question> {
        let Some(remote) = self.remote() else {
            return self.cached(keys::QUESTIONS);
        };
        if !self.auto_migrate(EntityKind::Questions, ctx).await {
            return self.cached(keys::QUESTIONS);
        }
        match remote.list_questions(ctx.token()).await {
            Ok(questions) => {
                self.store(keys::QUESTIONS, &questions);
                questions
            }
            Err(e) => {
                log_fallback(EntityKind::Questions, "list", &e);
                self.cached(keys::QUESTIONS)
            }
        }
    }

    pub async fn post_question(&self, new: NewQuestion, ctx: &IdentityContext) -> SyncResult<Question> {
        let body = body_text("question", &new.body)?;
        let author = author_label(new.is_anonymous, &display_or(&new.author, ctx))?;
        let mut question = Question {
            id: 0,
            owner_user_id: ctx.user_id().map(str::to_string),
            session_id: None,
            author,
            is_anonymous: new.is_anonymous,
            country: new.country.filter(|c| !c.trim().is_empty()),
            university: new.university.filter(|u| !u.trim().is_empty()),
            body,
            is_resolved: false,
            created_at: None,
            answers: Vec::new(),
        };

        if let Some(remote) = self.remote() {
            match remote.insert_question(&question, ctx.token()).await {
                Ok(mut saved) => {
                    saved.session_id = self.stamp_for(saved.owner_user_id.as_deref(), SessionNamespace::Questions);
                    self.put_cached_question_first(saved.clone());
                    self.emit(ContentChanged::Questions);
                    return Ok(saved);
                }
                Err(e) => log_fallback(EntityKind::Questions, "insert", &e),
            }
        }

        question.id = self.local_id();
        question.created_at = Some(Utc::now());
        question.session_id = self.stamp_for(question.owner_user_id.as_deref(), SessionNamespace::Questions);
        self.put_cached_question_first(question.clone());
        self.emit(ContentChanged::Questions);
        Ok(question)
    }

    pub async fn post_answer(&self, question_id: Id, new: NewAnswer, ctx: &IdentityContext) -> SyncResult<Answer> {
        let content = body_text("content", &new.content)?;
        let author = author_label(new.is_anonymous, &display_or(&new.author, ctx))?;
        self.open_question(question_id)?;

        let mut answer = Answer {
            id: 0,
            owner_user_id: ctx.user_id().map(str::to_string),
            session_id: None,
            author,
            is_anonymous: new.is_anonymous,
            content,
            created_at: None,
        };

        let saved = match self.remote() {
            Some(remote) => match remote.insert_answer(question_id, &answer, ctx.token()).await {
                Ok(saved) => Some(saved),
                Err(e) => {
                    log_fallback(EntityKind::Questions, "insert_answer", &e);
                    None
                }
            },
            None => None,
        };
        let mut answer = match saved {
            Some(saved) => saved,
            None => {
                answer.id = self.local_id();
                answer.created_at = Some(Utc::now());
                answer
            }
        };
        answer.session_id = self.stamp_for(answer.owner_user_id.as_deref(), SessionNamespace::Answers);

        self.modify_cached(keys::QUESTIONS, |questions: &mut Vec<Question>| {
            let question = questions
                .iter_mut()
                .find(|q| q.id == question_id)
                .ok_or(SyncError::NotFound("question", question_id))?;
            question.answers.push(answer.clone());
            Ok::<_, SyncError>(())
        })?;
        self.emit(ContentChanged::Questions);
        Ok(answer)
    }

    /// Marks a question resolved. Resolving twice is a no-op; there is no way back.
    pub async fn resolve_question(&self, id: Id, ctx: &IdentityContext) -> SyncResult<Question> {
        let current = self.cached_question(id).ok_or(SyncError::NotFound("question", id))?;
        if current.is_resolved {
            return Ok(current);
        }

        if let Some(remote) = self.remote() {
            if let Err(e) = remote.update_question(id, &QuestionPatch { is_resolved: true }, ctx.token()).await {
                log_fallback(EntityKind::Questions, "resolve", &e);
            }
        }

        let resolved = self.modify_cached(keys::QUESTIONS, |questions: &mut Vec<Question>| {
            let question = questions.iter_mut().find(|q| q.id == id).ok_or(SyncError::NotFound("question", id))?;
            question.is_resolved = true;
            Ok::<_, SyncError>(question.clone())
        })?;
        self.emit(ContentChanged::Questions);
        Ok(resolved)
    }

    pub async fn delete_question(&self, id: Id, ctx: &IdentityContext) {
        self.modify_cached(keys::QUESTIONS, |questions: &mut Vec<Question>| questions.retain(|q| q.id != id));
        self.emit(ContentChanged::Questions);

        if let Some(remote) = self.remote() {
            log_remote_delete(EntityKind::Questions, id, remote.delete_question(id, ctx.token()).await);
        }
    }

    pub async fn delete_answer(&self, question_id: Id, answer_id: Id, ctx: &IdentityContext) {
        self.modify_cached(keys::QUESTIONS, |questions: &mut Vec<Question>| {
            if let Some(q) = questions.iter_mut().find(|q| q.id == question_id) {
                q.answers.retain(|a| a.id != answer_id);
            }
        });
        self.emit(ContentChanged::Questions);

        if let Some(remote) = self.remote() {
            log_remote_delete(EntityKind::Questions, answer_id, remote.delete_answer(answer_id, ctx.token()).await);
        }
    }

    /// Cached answer lookup, used by callers that only know the question.
    pub fn cached_answer(&self, question_id: Id, answer_id: Id) -> Option<Answer> {
        self.cached::<Question>(keys::QUESTIONS)
            .into_iter()
            .find(|q| q.id == question_id)?
            .answers
            .into_iter()
            .find(|a| a.id == answer_id)
    }

    pub fn cached_question(&self, id: Id) -> Option<Question> {
        self.cached::<Question>(keys::QUESTIONS).into_iter().find(|q| q.id == id)
    }

    /// Fails unless the cached question exists and still takes answers.
    fn open_question(&self, id: Id) -> SyncResult<()> {
        match self.cached_question(id) {
            None => Err(SyncError::NotFound("question", id)),
            Some(q) if q.is_resolved => Err(SyncError::QuestionResolved(id)),
            Some(_) => Ok(()),
        }
    }

    fn put_cached_question_first(&self, question: Question) {
        self.replace_cached_question(question.id, question);
    }

    pub(super) fn replace_cached_question(&self, old_id: Id, question: Question) {
        self.modify_cached(keys::QUESTIONS, |questions: &mut Vec<Question>| {
            match questions.iter().position(|q| q.id == old_id) {
                Some(pos) => questions[pos] = question,
                None => questions.insert(0, question),
            }
        });
    }
}

//! One-time upload of records that only exist in the local cache.
//!
//! Records whose id the remote store already knows are skipped, and each
//! uploaded record is swapped for its server copy as soon as it lands, so a
//! rerun after a partial failure never inserts anything twice. The per-entity
//! flag is only set once every record made it. Runs of the same entity kind
//! are serialized and the flag is checked again once a run holds the lock.

use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

use super::*;
use crate::gateway::GatewayResult;
use crate::models::Answer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub inserted: usize,
    pub skipped: usize,
    pub already_migrated: bool,
}

impl MigrationReport {
    fn done() -> Self {
        Self { already_migrated: true, ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MigrationSummary {
    pub reviews: MigrationReport,
    pub questions: MigrationReport,
}

impl Synchronizer {
    pub fn is_migrated(&self, kind: EntityKind) -> bool {
        self.cache.get(&keys::migration_flag(kind)).as_deref() == Some("true")
    }

    fn mark_migrated(&self, kind: EntityKind) {
        self.cache.set(&keys::migration_flag(kind), "true");
    }

    /// Runs the pending migration of `kind` before a read. False means the
    /// read should be served from the cache so unmigrated records survive.
    pub(super) async fn auto_migrate(&self, kind: EntityKind, ctx: &IdentityContext) -> bool {
        if self.is_migrated(kind) {
            return true;
        }
        let result = match kind {
            EntityKind::Reviews => self.migrate_reviews(ctx).await,
            EntityKind::Questions => self.migrate_questions(ctx).await,
            EntityKind::Comments => return true,
        };
        match result {
            Ok(report) => {
                if report.inserted > 0 {
                    tracing::info!(entity = kind.as_str(), inserted = report.inserted, skipped = report.skipped, "migrated local records");
                }
                true
            }
            Err(e) => {
                log_fallback(kind, "migrate", &e);
                false
            }
        }
    }

    pub async fn migrate_reviews(&self, ctx: &IdentityContext) -> GatewayResult<MigrationReport> {
        if self.is_migrated(EntityKind::Reviews) {
            return Ok(MigrationReport::done());
        }
        let _running = self.review_migration.lock().await;
        if self.is_migrated(EntityKind::Reviews) {
            return Ok(MigrationReport::done());
        }
        let remote = self.remote().ok_or(GatewayError::Unconfigured)?;
        let local: Vec<Review> = self.cached(keys::REVIEWS);
        let mut report = MigrationReport::default();
        if !local.is_empty() {
            let known: HashSet<Id> = remote.list_reviews(ctx.token()).await?.iter().map(|r| r.id).collect();
            for review in local {
                if known.contains(&review.id) {
                    report.skipped += 1;
                    continue;
                }
                let mut outgoing = review.clone();
                outgoing.owner_user_id = adopt(outgoing.owner_user_id, ctx);
                let saved = remote.insert_review(&outgoing, ctx.token()).await?;
                self.replace_cached_review(review.id, saved);
                report.inserted += 1;
            }
        }
        self.mark_migrated(EntityKind::Reviews);
        Ok(report)
    }

    /// Uploads local-only questions with their answers, plus answers posted
    /// offline to questions the remote store already has.
    pub async fn migrate_questions(&self, ctx: &IdentityContext) -> GatewayResult<MigrationReport> {
        if self.is_migrated(EntityKind::Questions) {
            return Ok(MigrationReport::done());
        }
        let _running = self.question_migration.lock().await;
        if self.is_migrated(EntityKind::Questions) {
            return Ok(MigrationReport::done());
        }
        let remote = self.remote().ok_or(GatewayError::Unconfigured)?;
        let local: Vec<Question> = self.cached(keys::QUESTIONS);
        let mut report = MigrationReport::default();
        if !local.is_empty() {
            let existing = remote.list_questions(ctx.token()).await?;
            for question in local {
                let known = existing.iter().find(|q| q.id == question.id);
                let (target, known_answers): (Question, HashSet<Id>) = match known {
                    Some(q) => {
                        report.skipped += 1;
                        (question.clone(), q.answers.iter().map(|a| a.id).collect())
                    }
                    None => {
                        let mut outgoing = question.clone();
                        outgoing.owner_user_id = adopt(outgoing.owner_user_id, ctx);
                        let mut saved = remote.insert_question(&outgoing, ctx.token()).await?;
                        saved.session_id = keep_stamp(&saved.owner_user_id, &question.session_id);
                        saved.answers = question.answers.clone();
                        report.inserted += 1;
                        (saved, HashSet::new())
                    }
                };
                let migrated = self.migrate_answers(target, &known_answers, ctx).await?;
                self.replace_cached_question(question.id, migrated);
            }
        }
        self.mark_migrated(EntityKind::Questions);
        Ok(report)
    }

    async fn migrate_answers(
        &self,
        mut question: Question,
        known: &HashSet<Id>,
        ctx: &IdentityContext,
    ) -> GatewayResult<Question> {
        let remote = self.remote().ok_or(GatewayError::Unconfigured)?;
        let mut answers: Vec<Answer> = Vec::with_capacity(question.answers.len());
        for answer in std::mem::take(&mut question.answers) {
            if known.contains(&answer.id) {
                answers.push(answer);
                continue;
            }
            let mut outgoing = answer.clone();
            outgoing.owner_user_id = adopt(outgoing.owner_user_id, ctx);
            let mut saved = remote.insert_answer(question.id, &outgoing, ctx.token()).await?;
            saved.session_id = keep_stamp(&saved.owner_user_id, &answer.session_id);
            answers.push(saved);
        }
        question.answers = answers;
        Ok(question)
    }

    pub async fn migrate_all(&self, ctx: &IdentityContext) -> GatewayResult<MigrationSummary> {
        let reviews = self.migrate_reviews(ctx).await?;
        let questions = self.migrate_questions(ctx).await?;
        if reviews.inserted > 0 {
            self.emit(ContentChanged::Reviews);
        }
        if questions.inserted > 0 {
            self.emit(ContentChanged::Questions);
        }
        Ok(MigrationSummary { reviews, questions })
    }
}

/// Ownerless records are attributed to the signed-in user doing the upload.
fn adopt(owner: Option<String>, ctx: &IdentityContext) -> Option<String> {
    owner.filter(|o| !o.is_empty()).or_else(|| ctx.user_id().map(str::to_string))
}

fn keep_stamp(owner: &Option<String>, stamp: &Option<String>) -> Option<String> {
    if owner.is_some() {
        None
    } else {
        stamp.clone()
    }
}

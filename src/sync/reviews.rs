use chrono::Utc;

use super::*;

impl Synchronizer {
    /// All reviews, newest first.
    pub async fn get_all_reviews(&self, ctx: &IdentityContext) -> Vec<Review> {
        let Some(remote) = self.remote() else {
            return self.cached(keys::REVIEWS);
        };
        if !self.auto_migrate(EntityKind::Reviews, ctx).await {
            return self.cached(keys::REVIEWS);
        }
        match remote.list_reviews(ctx.token()).await {
            Ok(reviews) => {
                self.store(keys::REVIEWS, &reviews);
                reviews
            }
            Err(e) => {
                log_fallback(EntityKind::Reviews, "list", &e);
                self.cached(keys::REVIEWS)
            }
        }
    }

    pub async fn get_review(&self, id: Id, ctx: &IdentityContext) -> Option<Review> {
        self.get_all_reviews(ctx).await.into_iter().find(|r| r.id == id)
    }

    /// Creates when `review.id` is unset, otherwise updates in place.
    pub async fn save_review(&self, review: Review, ctx: &IdentityContext) -> SyncResult<Review> {
        if review.id > 0 {
            self.update_review(review.id, review, ctx).await
        } else {
            self.create_review(review, ctx).await
        }
    }

    pub async fn create_review(&self, mut review: Review, ctx: &IdentityContext) -> SyncResult<Review> {
        review.validate()?;
        review.owner_user_id = ctx.user_id().map(str::to_string);

        if let Some(remote) = self.remote() {
            match remote.insert_review(&review, ctx.token()).await {
                Ok(saved) => {
                    self.upsert_cached_review(saved.clone());
                    self.emit(ContentChanged::Reviews);
                    return Ok(saved);
                }
                Err(e) => log_fallback(EntityKind::Reviews, "insert", &e),
            }
        }

        review.id = self.local_id();
        review.created_at = Some(Utc::now());
        self.upsert_cached_review(review.clone());
        self.emit(ContentChanged::Reviews);
        tracing::info!(id = review.id, "review saved locally only");
        Ok(review)
    }

    /// Replaces the editable fields of review `id`. Owner, id and creation
    /// time are kept from the stored record.
    pub async fn update_review(&self, id: Id, review: Review, ctx: &IdentityContext) -> SyncResult<Review> {
        review.validate()?;

        if let Some(remote) = self.remote() {
            match remote.update_review(id, &review, ctx.token()).await {
                Ok(saved) => {
                    self.upsert_cached_review(saved.clone());
                    self.emit(ContentChanged::Reviews);
                    return Ok(saved);
                }
                Err(e) => log_fallback(EntityKind::Reviews, "update", &e),
            }
        }

        let merged = self.modify_cached(keys::REVIEWS, |reviews: &mut Vec<Review>| -> SyncResult<Review> {
            let existing = reviews.iter_mut().find(|r| r.id == id).ok_or(SyncError::NotFound("review", id))?;
            *existing = Review {
                id,
                owner_user_id: existing.owner_user_id.take(),
                created_at: existing.created_at,
                ..review
            };
            Ok(existing.clone())
        })?;
        self.emit(ContentChanged::Reviews);
        Ok(merged)
    }

    /// Removes the review locally right away, then best effort remotely.
    /// A remote refusal is only logged, so the review can come back on the
    /// next successful remote read. Comments of the review are left alone.
    pub async fn delete_review(&self, id: Id, ctx: &IdentityContext) {
        self.modify_cached(keys::REVIEWS, |reviews: &mut Vec<Review>| reviews.retain(|r| r.id != id));
        self.emit(ContentChanged::Reviews);

        if let Some(remote) = self.remote() {
            log_remote_delete(EntityKind::Reviews, id, remote.delete_review(id, ctx.token()).await);
        }
    }

    pub fn cached_review(&self, id: Id) -> Option<Review> {
        self.cached::<Review>(keys::REVIEWS).into_iter().find(|r| r.id == id)
    }

    /// Replaces the cached review with the same id in place, or puts it first.
    pub(super) fn upsert_cached_review(&self, review: Review) {
        self.replace_cached_review(review.id, review);
    }

    pub(super) fn replace_cached_review(&self, old_id: Id, review: Review) {
        self.modify_cached(keys::REVIEWS, |reviews: &mut Vec<Review>| {
            match reviews.iter().position(|r| r.id == old_id) {
                Some(pos) => reviews[pos] = review,
                None => reviews.insert(0, review),
            }
        });
    }
}

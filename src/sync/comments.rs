use chrono::Utc;

use super::*;
use crate::models::{author_label, body_text, NewComment};

impl Synchronizer {
    /// Comments of a review, oldest first.
    pub async fn get_comments(&self, review_id: Id, ctx: &IdentityContext) -> Vec<Comment> {
        let key = keys::review_comments(review_id);
        let Some(remote) = self.remote() else {
            return self.cached(&key);
        };
        match remote.list_comments(review_id, ctx.token()).await {
            Ok(comments) => {
                self.store(&key, &comments);
                comments
            }
            Err(e) => {
                log_fallback(EntityKind::Comments, "list", &e);
                self.cached(&key)
            }
        }
    }

    pub async fn add_comment(&self, new: NewComment, ctx: &IdentityContext) -> SyncResult<Comment> {
        let content = body_text("content", &new.content)?;
        let author_name = author_label(new.is_anonymous, &display_or(&new.author_name, ctx))?;
        // anonymous comments are never tied to the account, even when signed in
        let owner = if new.is_anonymous { None } else { ctx.user_id().map(str::to_string) };
        let mut comment = Comment {
            id: 0,
            review_id: new.review_id,
            owner_user_id: owner,
            author_name,
            is_anonymous: new.is_anonymous,
            content,
            created_at: Utc::now(),
            updated_at: None,
            session_id: None,
        };

        if let Some(remote) = self.remote() {
            match remote.insert_comment(&comment, ctx.token()).await {
                Ok(mut saved) => {
                    saved.session_id = self.stamp_for(saved.owner_user_id.as_deref(), SessionNamespace::Comments);
                    self.append_cached_comment(saved.clone());
                    self.emit(ContentChanged::Comments { review_id: saved.review_id });
                    return Ok(saved);
                }
                Err(e) => log_fallback(EntityKind::Comments, "insert", &e),
            }
        }

        comment.id = self.local_id();
        comment.session_id = self.stamp_for(comment.owner_user_id.as_deref(), SessionNamespace::Comments);
        self.append_cached_comment(comment.clone());
        self.emit(ContentChanged::Comments { review_id: comment.review_id });
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        review_id: Id,
        id: Id,
        content: &str,
        ctx: &IdentityContext,
    ) -> SyncResult<Comment> {
        let content = body_text("content", content)?;
        let key = keys::review_comments(review_id);

        let remote_copy = match self.remote() {
            Some(remote) => match remote.update_comment(id, &content, ctx.token()).await {
                Ok(saved) => Some(saved),
                Err(e) => {
                    log_fallback(EntityKind::Comments, "update", &e);
                    None
                }
            },
            None => None,
        };

        let updated = self.modify_cached(&key, |comments: &mut Vec<Comment>| -> SyncResult<Comment> {
            let pos = comments.iter().position(|c| c.id == id);
            let updated = match (remote_copy, pos) {
                (Some(mut saved), _) => {
                    // keep this installation's stamp on the refreshed copy
                    saved.session_id = pos.and_then(|p| comments[p].session_id.clone());
                    saved
                }
                (None, Some(p)) => Comment { content, updated_at: Some(Utc::now()), ..comments[p].clone() },
                (None, None) => return Err(SyncError::NotFound("comment", id)),
            };
            match pos {
                Some(p) => comments[p] = updated.clone(),
                None => comments.push(updated.clone()),
            }
            Ok(updated)
        })?;
        self.emit(ContentChanged::Comments { review_id });
        Ok(updated)
    }

    /// Local removal first, remote removal best effort.
    pub async fn delete_comment(&self, review_id: Id, id: Id, ctx: &IdentityContext) {
        let key = keys::review_comments(review_id);
        self.modify_cached(&key, |comments: &mut Vec<Comment>| comments.retain(|c| c.id != id));
        self.emit(ContentChanged::Comments { review_id });

        if let Some(remote) = self.remote() {
            log_remote_delete(EntityKind::Comments, id, remote.delete_comment(id, ctx.token()).await);
        }
    }

    pub fn cached_comment(&self, review_id: Id, id: Id) -> Option<Comment> {
        self.cached::<Comment>(&keys::review_comments(review_id)).into_iter().find(|c| c.id == id)
    }

    fn append_cached_comment(&self, comment: Comment) {
        let key = keys::review_comments(comment.review_id);
        self.modify_cached(&key, |comments: &mut Vec<Comment>| comments.push(comment));
    }
}

/// The typed name, or the signed-in user's display name when left blank.
pub(super) fn display_or(name: &str, ctx: &IdentityContext) -> String {
    if !name.trim().is_empty() {
        return name.to_string();
    }
    ctx.user.as_ref().map(|u| u.display_name()).unwrap_or_default()
}

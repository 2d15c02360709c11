use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use futures_util::stream;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::events::ContentChanged;
use crate::identity::{context_of, Auth, IdentityContext};
use crate::models::*;
use crate::ownership::OwnedContent;
use crate::sync::{MigrationSummary, Synchronizer};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/reviews")
                    .route(web::get().to(list_reviews))
                    .route(web::post().to(create_review)),
            )
            .service(
                web::resource("/reviews/{id}")
                    .route(web::get().to(get_review))
                    .route(web::put().to(update_review))
                    .route(web::delete().to(delete_review)),
            )
            .service(
                web::resource("/reviews/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(
                web::resource("/reviews/{id}/comments/{comment_id}")
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(
                web::resource("/questions")
                    .route(web::get().to(list_questions))
                    .route(web::post().to(create_question)),
            )
            .service(web::resource("/questions/{id}").route(web::delete().to(delete_question)))
            .service(web::resource("/questions/{id}/resolve").route(web::post().to(resolve_question)))
            .service(web::resource("/questions/{id}/answers").route(web::post().to(create_answer)))
            .service(
                web::resource("/questions/{id}/answers/{answer_id}").route(web::delete().to(delete_answer)),
            )
            .service(web::resource("/sync/migrate").route(web::post().to(migrate)))
            .service(web::resource("/me").route(web::get().to(me)))
            .service(web::resource("/events").route(web::get().to(events))),
    );
    // scraped by Prometheus, kept outside the versioned API
    cfg.route("/metrics", web::get().to(metrics));
}

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<Synchronizer>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub can_modify: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub can_modify: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    #[serde(flatten)]
    pub answer: Answer,
    pub can_modify: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    pub can_modify: bool,
    pub answers: Vec<AnswerView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
}

fn can_modify(data: &AppState, item: &dyn OwnedContent, ctx: &IdentityContext) -> bool {
    data.sync.can_modify(item, ctx).allowed
}

/// Rejects the request unless the caller may modify `item`.
fn ensure_can_modify(data: &AppState, item: &dyn OwnedContent, ctx: &IdentityContext) -> Result<(), ApiError> {
    data.sync.can_modify(item, ctx).ensure(item.content_ref())?;
    Ok(())
}

fn not_found(noun: &str, id: Id) -> ApiError {
    ApiError::NotFound(format!("{noun} {id} not found"))
}

#[utoipa::path(
    get,
    path = "/api/v1/reviews",
    responses((status = 200, description = "All reviews, newest first", body = [ReviewView]))
)]
pub async fn list_reviews(auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let reviews: Vec<ReviewView> = data
        .sync
        .get_all_reviews(&ctx)
        .await
        .into_iter()
        .map(|review| ReviewView { can_modify: can_modify(&data, &review, &ctx), review })
        .collect();
    Ok(HttpResponse::Ok().json(reviews))
}

#[utoipa::path(
    post,
    path = "/api/v1/reviews",
    request_body = Review,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Invalid review")
    )
)]
pub async fn create_review(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<Review>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let mut review = payload.into_inner();
    review.id = 0;
    let created = data.sync.create_review(review, &ctx).await?;
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/reviews/{id}",
    params(("id" = Id, Path, description = "Review id")),
    responses(
        (status = 200, description = "Review", body = ReviewView),
        (status = 404, description = "Review not found")
    )
)]
pub async fn get_review(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let id = path.into_inner();
    let review = data.sync.get_review(id, &ctx).await.ok_or_else(|| not_found("review", id))?;
    Ok(HttpResponse::Ok().json(ReviewView { can_modify: can_modify(&data, &review, &ctx), review }))
}

async fn find_review(data: &AppState, id: Id, ctx: &IdentityContext) -> Result<Review, ApiError> {
    match data.sync.cached_review(id) {
        Some(r) => Ok(r),
        None => data.sync.get_review(id, ctx).await.ok_or_else(|| not_found("review", id)),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/reviews/{id}",
    params(("id" = Id, Path, description = "Review id")),
    request_body = Review,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn update_review(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<Review>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let id = path.into_inner();
    let existing = find_review(&data, id, &ctx).await?;
    ensure_can_modify(&data, &existing, &ctx)?;
    let updated = data.sync.update_review(id, payload.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}",
    params(("id" = Id, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found")
    )
)]
pub async fn delete_review(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let id = path.into_inner();
    let existing = find_review(&data, id, &ctx).await?;
    ensure_can_modify(&data, &existing, &ctx)?;
    data.sync.delete_review(id, &ctx).await;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/v1/reviews/{id}/comments",
    params(("id" = Id, Path, description = "Review id")),
    responses((status = 200, description = "Comments, oldest first", body = [CommentView]))
)]
pub async fn list_comments(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let comments: Vec<CommentView> = data
        .sync
        .get_comments(path.into_inner(), &ctx)
        .await
        .into_iter()
        .map(|comment| CommentView { can_modify: can_modify(&data, &comment, &ctx), comment })
        .collect();
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    post,
    path = "/api/v1/reviews/{id}/comments",
    params(("id" = Id, Path, description = "Review id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty comment or missing name")
    )
)]
pub async fn create_comment(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let mut new = payload.into_inner();
    new.review_id = path.into_inner();
    let comment = data.sync.add_comment(new, &ctx).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    patch,
    path = "/api/v1/reviews/{id}/comments/{comment_id}",
    params(
        ("id" = Id, Path, description = "Review id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    request_body = UpdateComment,
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn update_comment(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let (review_id, id) = path.into_inner();
    let existing = data.sync.cached_comment(review_id, id).ok_or_else(|| not_found("comment", id))?;
    ensure_can_modify(&data, &existing, &ctx)?;
    let updated = data.sync.update_comment(review_id, id, &payload.content, &ctx).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reviews/{id}/comments/{comment_id}",
    params(
        ("id" = Id, Path, description = "Review id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let (review_id, id) = path.into_inner();
    let existing = data.sync.cached_comment(review_id, id).ok_or_else(|| not_found("comment", id))?;
    ensure_can_modify(&data, &existing, &ctx)?;
    data.sync.delete_comment(review_id, id, &ctx).await;
    Ok(HttpResponse::NoContent().finish())
}

fn question_view(data: &AppState, mut question: Question, ctx: &IdentityContext) -> QuestionView {
    let answers = std::mem::take(&mut question.answers)
        .into_iter()
        .map(|answer| AnswerView { can_modify: can_modify(data, &answer, ctx), answer })
        .collect();
    QuestionView { can_modify: can_modify(data, &question, ctx), question, answers }
}

#[utoipa::path(
    get,
    path = "/api/v1/questions",
    responses((status = 200, description = "Questions, newest first", body = [QuestionView]))
)]
pub async fn list_questions(auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let questions: Vec<QuestionView> = data
        .sync
        .get_all_questions(&ctx)
        .await
        .into_iter()
        .map(|q| question_view(&data, q, &ctx))
        .collect();
    Ok(HttpResponse::Ok().json(questions))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions",
    request_body = NewQuestion,
    responses(
        (status = 201, description = "Question posted", body = Question),
        (status = 400, description = "Empty question or missing name")
    )
)]
pub async fn create_question(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<NewQuestion>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let question = data.sync.post_question(payload.into_inner(), &ctx).await?;
    Ok(HttpResponse::Created().json(question))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/resolve",
    params(("id" = Id, Path, description = "Question id")),
    responses(
        (status = 200, description = "Question resolved", body = Question),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn resolve_question(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let id = path.into_inner();
    let existing = data.sync.cached_question(id).ok_or_else(|| not_found("question", id))?;
    ensure_can_modify(&data, &existing, &ctx)?;
    let resolved = data.sync.resolve_question(id, &ctx).await?;
    Ok(HttpResponse::Ok().json(resolved))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}",
    params(("id" = Id, Path, description = "Question id")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn delete_question(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let id = path.into_inner();
    let existing = data.sync.cached_question(id).ok_or_else(|| not_found("question", id))?;
    ensure_can_modify(&data, &existing, &ctx)?;
    data.sync.delete_question(id, &ctx).await;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers",
    params(("id" = Id, Path, description = "Question id")),
    request_body = NewAnswer,
    responses(
        (status = 201, description = "Answer posted", body = Answer),
        (status = 404, description = "Question not found"),
        (status = 409, description = "Question already resolved")
    )
)]
pub async fn create_answer(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewAnswer>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let answer = data.sync.post_answer(path.into_inner(), payload.into_inner(), &ctx).await?;
    Ok(HttpResponse::Created().json(answer))
}

#[utoipa::path(
    delete,
    path = "/api/v1/questions/{id}/answers/{answer_id}",
    params(
        ("id" = Id, Path, description = "Question id"),
        ("answer_id" = Id, Path, description = "Answer id")
    ),
    responses(
        (status = 204, description = "Answer deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Answer not found")
    )
)]
pub async fn delete_answer(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let (question_id, answer_id) = path.into_inner();
    let existing = data
        .sync
        .cached_answer(question_id, answer_id)
        .ok_or_else(|| not_found("answer", answer_id))?;
    ensure_can_modify(&data, &existing, &ctx)?;
    data.sync.delete_answer(question_id, answer_id, &ctx).await;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/sync/migrate",
    responses(
        (status = 200, description = "Migration report per collection", body = MigrationSummary),
        (status = 503, description = "Remote store unavailable")
    )
)]
pub async fn migrate(auth: Option<Auth>, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let ctx = context_of(auth);
    let summary = data.sync.migrate_all(&ctx).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Signed-in user", body = MeResponse),
        (status = 401, description = "No valid access token")
    )
)]
pub async fn me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let user = auth.user;
    Ok(HttpResponse::Ok().json(MeResponse { display_name: user.display_name(), id: user.id, email: user.email }))
}

/// Server-sent stream of change notifications.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    responses(
        (status = 200, description = "One `data:` frame per change", body = ContentChanged, content_type = "text/event-stream")
    )
)]
pub async fn events(data: web::Data<AppState>) -> HttpResponse {
    let rx = data.sync.events().subscribe();
    let body = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode change event");
                            continue;
                        }
                    };
                    let frame = web::Bytes::from(format!("data: {payload}\n\n"));
                    return Some((Ok::<_, actix_web::Error>(frame), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(body)
}

pub async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

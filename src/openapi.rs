use crate::events::ContentChanged;
use crate::identity::{CurrentUser, UserMetadata};
use crate::models::{Answer, Comment, NewAnswer, NewComment, NewQuestion, Question, Review, ReviewDetails, UpdateComment};
use crate::routes::{AnswerView, CommentView, MeResponse, QuestionView, ReviewView};
use crate::sync::{MigrationReport, MigrationSummary};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_reviews,
        crate::routes::create_review,
        crate::routes::get_review,
        crate::routes::update_review,
        crate::routes::delete_review,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::list_questions,
        crate::routes::create_question,
        crate::routes::resolve_question,
        crate::routes::delete_question,
        crate::routes::create_answer,
        crate::routes::delete_answer,
        crate::routes::migrate,
        crate::routes::me,
        crate::routes::events,
    ),
    components(schemas(
        Review, ReviewDetails, Comment, Question, Answer,
        NewComment, NewQuestion, NewAnswer, UpdateComment,
        ReviewView, CommentView, QuestionView, AnswerView,
        MigrationReport, MigrationSummary, MeResponse, CurrentUser, UserMetadata, ContentChanged
    )),
    tags(
        (name = "reviews", description = "Study-abroad reviews"),
        (name = "comments", description = "Comments on a review"),
        (name = "questions", description = "Questions and their answers"),
    )
)]
pub struct ApiDoc;

#![cfg(feature = "inmem-gateway")]

use std::sync::Arc;

use actix_web::http::header::AUTHORIZATION;
use actix_web::{test, web, App};
use ryugaku::cache::FileCacheStore;
use ryugaku::config::DEFAULT_CACHE_QUOTA_BYTES;
use ryugaku::events::ContentEvents;
use ryugaku::gateway::inmem::InMemGateway;
use ryugaku::identity::{create_access_token, CurrentUser, UserMetadata, JWT_SECRET_ENV};
use ryugaku::routes::{config, AppState};
use ryugaku::sync::Synchronizer;
use serde_json::{json, Value};
use serial_test::serial;

fn setup_env() {
    std::env::set_var(JWT_SECRET_ENV, "test-secret-must-be-32-bytes-long!!");
}

fn state(gateway: &InMemGateway, dir: &tempfile::TempDir) -> AppState {
    let cache = Arc::new(FileCacheStore::open(dir.path().join("local_cache.json"), DEFAULT_CACHE_QUOTA_BYTES));
    let sync = Synchronizer::new(Arc::new(gateway.clone()), cache, ContentEvents::default());
    AppState { sync: Arc::new(sync), metrics: None }
}

fn bearer(id: &str) -> (actix_web::http::header::HeaderName, String) {
    let user = CurrentUser { id: id.into(), email: Some(format!("{id}@example.com")), metadata: UserMetadata::default() };
    (AUTHORIZATION, format!("Bearer {}", create_access_token(&user).unwrap()))
}

fn review_body(title: &str, satisfaction: f64) -> Value {
    json!({
        "author": "Aki",
        "country": "Canada",
        "university": "UBC",
        "title": title,
        "satisfaction": satisfaction,
        "strongFields": ["forestry"]
    })
}

#[actix_web::test]
#[serial]
async fn review_ownership_flow() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/reviews")
        .insert_header(bearer("u1"))
        .set_json(review_body("Vancouver rain", 4.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Value = test::read_body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["userId"], "u1");

    // owner sees canModify, others do not
    let req = test::TestRequest::get().uri("/api/v1/reviews").insert_header(bearer("u1")).to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list[0]["canModify"], true);
    assert_eq!(list[0]["title"], "Vancouver rain");
    let req = test::TestRequest::get().uri("/api/v1/reviews").insert_header(bearer("u2")).to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list[0]["canModify"], false);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/reviews/{id}"))
        .insert_header(bearer("u2"))
        .set_json(review_body("hijacked", 1.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "you do not have permission to modify this review");

    let req = test::TestRequest::delete().uri(&format!("/api/v1/reviews/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/reviews/{id}"))
        .insert_header(bearer("u1"))
        .set_json(review_body("Vancouver sun", 5.0))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["title"], "Vancouver sun");
    assert_eq!(updated["userId"], "u1");

    let req = test::TestRequest::delete().uri(&format!("/api/v1/reviews/{id}")).insert_header(bearer("u1")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    assert!(gateway.reviews().is_empty());

    let req = test::TestRequest::get().uri(&format!("/api/v1/reviews/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn invalid_review_is_bad_request() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::post().uri("/api/v1/reviews").set_json(review_body("too happy", 7.0)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("satisfaction"));
    assert_eq!(gateway.insert_count(), 0);
}

#[actix_web::test]
#[serial]
async fn comment_flow_with_names_and_anonymity() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    // signed in, name left blank: display name is filled in
    let req = test::TestRequest::post()
        .uri("/api/v1/reviews/5/comments")
        .insert_header(bearer("u1"))
        .set_json(json!({"authorName": "", "isAnonymous": false, "content": "Helpful, thanks"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let named: Value = test::read_body_json(resp).await;
    assert_eq!(named["authorName"], "u1");
    assert_eq!(named["reviewId"], 5);
    let named_id = named["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/reviews/5/comments")
        .set_json(json!({"isAnonymous": true, "content": "Same experience"}))
        .to_request();
    let anon: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(anon["authorName"], "匿名");
    assert!(anon.get("userId").is_none());
    assert!(anon["sessionId"].as_str().unwrap().starts_with("session_"));

    let req = test::TestRequest::get().uri("/api/v1/reviews/5/comments").to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[0]["content"], "Helpful, thanks");
    assert_eq!(list[0]["canModify"], false);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/reviews/5/comments/{named_id}"))
        .insert_header(bearer("u2"))
        .set_json(json!({"content": "edited by someone else"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/reviews/5/comments/{named_id}"))
        .insert_header(bearer("u1"))
        .set_json(json!({"content": "Very helpful"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let edited: Value = test::read_body_json(resp).await;
    assert_eq!(edited["content"], "Very helpful");
    assert!(edited["updatedAt"].is_string());

    let req = test::TestRequest::post()
        .uri("/api/v1/reviews/5/comments")
        .set_json(json!({"authorName": "", "isAnonymous": false, "content": "who am I"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete().uri("/api/v1/reviews/5/comments/999").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn question_answer_resolve_flow() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .insert_header(bearer("u1"))
        .set_json(json!({"author": "Hina", "question": "How early to apply for housing?", "country": "Ireland"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let q: Value = test::read_body_json(resp).await;
    let qid = q["id"].as_i64().unwrap();
    assert_eq!(q["question"], "How early to apply for housing?");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"isAnonymous": true, "content": "Six months"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get().uri("/api/v1/questions").insert_header(bearer("u1")).to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list[0]["canModify"], true);
    assert_eq!(list[0]["answers"].as_array().unwrap().len(), 1);
    assert_eq!(list[0]["answers"][0]["content"], "Six months");
    assert!(list[0]["answers"][0]["canModify"].is_boolean());

    let req = test::TestRequest::post().uri(&format!("/api/v1/questions/{qid}/resolve")).insert_header(bearer("u2")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post().uri(&format!("/api/v1/questions/{qid}/resolve")).insert_header(bearer("u1")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let resolved: Value = test::read_body_json(resp).await;
    assert_eq!(resolved["isResolved"], true);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"isAnonymous": true, "content": "late"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    let req = test::TestRequest::post()
        .uri("/api/v1/questions/424242/answers")
        .set_json(json!({"isAnonymous": true, "content": "nobody asked"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri(&format!("/api/v1/questions/{qid}")).insert_header(bearer("u1")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    assert!(gateway.questions().is_empty());
}

#[actix_web::test]
#[serial]
async fn me_requires_valid_token() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/me").insert_header((AUTHORIZATION, "Bearer not-a-jwt")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/me").insert_header(bearer("mika")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let me: Value = test::read_body_json(resp).await;
    assert_eq!(me["id"], "mika");
    assert_eq!(me["email"], "mika@example.com");
    assert_eq!(me["displayName"], "mika");
}

#[actix_web::test]
#[serial]
async fn invalid_token_reads_as_anonymous() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/reviews").insert_header((AUTHORIZATION, "Bearer garbage")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let list: Value = test::read_body_json(resp).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn offline_server_still_serves_writes_and_refuses_migration() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::unconfigured();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::post().uri("/api/v1/reviews").set_json(review_body("offline", 3.0)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get().uri("/api/v1/reviews").to_request();
    let list: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    // ownerless and cached here
    assert_eq!(list[0]["canModify"], true);

    let req = test::TestRequest::post().uri("/api/v1/sync/migrate").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 503);

    // the cache survives a restart
    assert!(dir.path().join("local_cache.json").exists());
    let reopened = state(&gateway, &dir);
    assert_eq!(reopened.sync.cached_review(list[0]["id"].as_i64().unwrap()).unwrap().title, "offline");
}

#[actix_web::test]
#[serial]
async fn migrate_endpoint_reports_counts() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::unconfigured();
    let app_state = state(&gateway, &dir);
    let app = test::init_service(App::new().app_data(web::Data::new(app_state)).configure(config)).await;

    let req = test::TestRequest::post().uri("/api/v1/reviews").set_json(review_body("queued", 3.0)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    gateway.set_available(true);
    let req = test::TestRequest::post().uri("/api/v1/sync/migrate").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["reviews"]["inserted"], 1);
    assert_eq!(summary["questions"]["inserted"], 0);
    assert_eq!(gateway.reviews().len(), 1);
}

#[actix_web::test]
#[serial]
async fn metrics_absent_without_recorder() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::new();
    let app = test::init_service(App::new().app_data(web::Data::new(state(&gateway, &dir))).configure(config)).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn events_stream_forwards_changes() {
    use actix_web::body::MessageBody;
    use ryugaku::events::ContentChanged;

    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let gateway = InMemGateway::unconfigured();
    let app_state = state(&gateway, &dir);
    let events = app_state.sync.events().clone();
    let app = test::init_service(App::new().app_data(web::Data::new(app_state)).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/events").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");

    events.emit(ContentChanged::Comments { review_id: 4 });
    let mut body = resp.into_body();
    let chunk = futures_util::future::poll_fn(|cx| std::pin::Pin::new(&mut body).poll_next(cx))
        .await
        .unwrap()
        .unwrap();
    let frame = std::str::from_utf8(&chunk).unwrap();
    assert!(frame.starts_with("data: "));
    let payload: Value = serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(payload, json!({"entity": "comments", "reviewId": 4}));
}

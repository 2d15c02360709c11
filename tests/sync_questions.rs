#![cfg(feature = "inmem-gateway")]

use std::sync::Arc;
use std::time::Duration;

use ryugaku::cache::{keys, read_json, write_json, MemoryCacheStore};
use ryugaku::config::RemoteConfig;
use ryugaku::events::ContentEvents;
use ryugaku::gateway::inmem::InMemGateway;
use ryugaku::gateway::postgrest::PostgrestGateway;
use ryugaku::identity::{CurrentUser, IdentityContext, UserMetadata};
use ryugaku::models::{NewAnswer, NewQuestion, Question, ANONYMOUS_AUTHOR};
use ryugaku::ownership::Rule;
use ryugaku::session::SessionNamespace;
use ryugaku::sync::{SyncError, Synchronizer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup(gateway: &InMemGateway) -> Synchronizer {
    Synchronizer::new(Arc::new(gateway.clone()), Arc::new(MemoryCacheStore::new()), ContentEvents::default())
}

fn ask(body: &str, anonymous: bool) -> NewQuestion {
    NewQuestion {
        author: "Nao".into(),
        is_anonymous: anonymous,
        country: Some("Sweden".into()),
        university: Some(" ".into()),
        body: body.into(),
    }
}

fn reply(content: &str) -> NewAnswer {
    NewAnswer { author: String::new(), is_anonymous: true, content: content.into() }
}

fn signed_in(id: &str) -> IdentityContext {
    let user = CurrentUser { id: id.into(), email: None, metadata: UserMetadata { full_name: Some("Nao T".into()) } };
    IdentityContext::signed_in(user, None)
}

#[tokio::test]
async fn posting_offline_stamps_question_session() {
    let sync = setup(&InMemGateway::unconfigured());
    let ctx = IdentityContext::anonymous();

    let q = sync.post_question(ask("Winter clothes?", true), &ctx).await.unwrap();
    assert_eq!(q.author, ANONYMOUS_AUTHOR);
    assert_eq!(q.country.as_deref(), Some("Sweden"));
    assert!(q.university.is_none());
    assert_eq!(q.session_id.as_deref(), Some(sync.sessions().current(SessionNamespace::Questions).as_str()));
    assert_eq!(sync.get_all_questions(&ctx).await, vec![q.clone()]);
    assert_eq!(sync.can_modify(&q, &ctx).rule, Rule::SessionMatches);
}

#[tokio::test]
async fn signed_in_question_is_owned_even_when_anonymous() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let q = sync.post_question(ask("Part-time jobs?", true), &signed_in("u1")).await.unwrap();
    assert_eq!(q.owner_user_id.as_deref(), Some("u1"));
    assert!(q.session_id.is_none());
    assert_eq!(gateway.questions()[0].owner_user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn answers_are_appended_oldest_first() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let ctx = IdentityContext::anonymous();

    let q = sync.post_question(ask("Dorm or flat?", false), &ctx).await.unwrap();
    let first = sync.post_answer(q.id, reply("Dorm"), &ctx).await.unwrap();
    sync.post_answer(q.id, reply("Flat"), &ctx).await.unwrap();
    assert_eq!(first.session_id.as_deref(), Some(sync.sessions().current(SessionNamespace::Answers).as_str()));

    let listed = sync.get_all_questions(&ctx).await;
    let contents: Vec<&str> = listed[0].answers.iter().map(|a| a.content.as_str()).collect();
    assert_eq!(contents, vec!["Dorm", "Flat"]);
}

#[tokio::test]
async fn answering_unknown_question_is_not_found() {
    let sync = setup(&InMemGateway::unconfigured());
    let err = sync.post_answer(404, reply("?"), &IdentityContext::anonymous()).await.unwrap_err();
    assert_eq!(err, SyncError::NotFound("question", 404));
}

#[tokio::test]
async fn resolve_is_idempotent_and_closes_answers() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let ctx = IdentityContext::anonymous();

    let q = sync.post_question(ask("Best SIM card?", false), &ctx).await.unwrap();
    let once = sync.resolve_question(q.id, &ctx).await.unwrap();
    let twice = sync.resolve_question(q.id, &ctx).await.unwrap();
    assert!(once.is_resolved);
    assert_eq!(once, twice);
    assert!(gateway.questions()[0].is_resolved);

    let err = sync.post_answer(q.id, reply("too late"), &ctx).await.unwrap_err();
    assert_eq!(err, SyncError::QuestionResolved(q.id));
}

#[tokio::test]
async fn resolve_works_offline() {
    let sync = setup(&InMemGateway::unconfigured());
    let ctx = IdentityContext::anonymous();
    let q = sync.post_question(ask("Bank account?", false), &ctx).await.unwrap();
    assert!(sync.resolve_question(q.id, &ctx).await.unwrap().is_resolved);
    assert!(sync.cached_question(q.id).unwrap().is_resolved);
}

#[tokio::test]
async fn delete_answer_keeps_the_question() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let ctx = IdentityContext::anonymous();

    let q = sync.post_question(ask("Insurance?", false), &ctx).await.unwrap();
    let a = sync.post_answer(q.id, reply("Mandatory"), &ctx).await.unwrap();
    assert!(sync.cached_answer(q.id, a.id).is_some());

    sync.delete_answer(q.id, a.id, &ctx).await;
    assert!(sync.cached_answer(q.id, a.id).is_none());
    assert!(sync.cached_question(q.id).is_some());
    assert!(gateway.questions()[0].answers.is_empty());
}

#[tokio::test]
async fn delete_question_survives_remote_denial_locally() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let ctx = IdentityContext::anonymous();

    let q = sync.post_question(ask("Laundry?", false), &ctx).await.unwrap();
    gateway.reject_deletes(true);
    sync.delete_question(q.id, &ctx).await;
    assert!(sync.cached_question(q.id).is_none());
    assert_eq!(gateway.questions().len(), 1);
}

#[tokio::test]
async fn remote_refresh_drops_stamp_but_cache_still_vouches() {
    let gateway = InMemGateway::new();
    let sync = setup(&gateway);
    let ctx = IdentityContext::anonymous();

    sync.post_question(ask("Ferry to Tallinn?", false), &ctx).await.unwrap();
    let listed = sync.get_all_questions(&ctx).await;
    assert!(listed[0].session_id.is_none());
    assert_eq!(sync.can_modify(&listed[0], &ctx).rule, Rule::CachedLegacy);
}

#[tokio::test]
async fn slow_answer_does_not_erase_a_question_saved_meanwhile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/answers"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(400)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/questions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCacheStore::new());
    let existing = Question {
        id: 1,
        owner_user_id: None,
        session_id: None,
        author: "Nao".into(),
        is_anonymous: false,
        country: None,
        university: None,
        body: "Heating costs?".into(),
        is_resolved: false,
        created_at: None,
        answers: Vec::new(),
    };
    write_json(cache.as_ref(), keys::QUESTIONS, &[existing]);
    let gateway = PostgrestGateway::new(RemoteConfig::new(server.uri(), "anon-test-key"));
    let sync = Synchronizer::new(Arc::new(gateway), cache.clone(), ContentEvents::default());
    let ctx = IdentityContext::anonymous();

    let (answer, question) =
        tokio::join!(sync.post_answer(1, reply("Wear layers"), &ctx), sync.post_question(ask("Snow tyres?", false), &ctx));
    let (answer, question) = (answer.unwrap(), question.unwrap());

    let cached: Vec<Question> = read_json(cache.as_ref(), keys::QUESTIONS).unwrap();
    let ids: Vec<i64> = cached.iter().map(|q| q.id).collect();
    assert_eq!(ids, vec![question.id, 1]);
    assert_eq!(cached[1].answers, vec![answer]);
}

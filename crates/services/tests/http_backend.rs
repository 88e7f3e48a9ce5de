use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use mockito::{Matcher, Server};
use reqwest::{Client, StatusCode};
use serde_json::json;
use services::{AdminBackend, ApiError, HttpBackend, InMemoryAuth, StudyBackend};
use study_core::model::{
    CareerId, DayOfWeek, NewStudyRecord, RecordId, SlotId, SubjectId, UserId, WeeklyPlan,
};
use study_core::time::{fixed_clock, fixed_now};
use url::Url;

fn backend(server: &Server, auth: InMemoryAuth) -> HttpBackend {
    let base = Url::parse(&format!("{}/api/", server.url())).unwrap();
    HttpBackend::with_client(Client::new(), base, Arc::new(auth))
}

#[tokio::test]
async fn signed_in_requests_carry_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/user-career/u1")
        .match_header("authorization", "Bearer token-u1")
        .with_header("content-type", "application/json")
        .with_body(r#"{"career_id": 4}"#)
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1"));
    let career = api.user_career(&UserId::new("u1")).await.unwrap();
    mock.assert_async().await;
    assert_eq!(career, Some(CareerId::new(4)));
}

#[tokio::test]
async fn missing_career_is_none() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/user-career/u1")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/api/user-career/career_name/u1")
        .with_status(404)
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1"));
    let user = UserId::new("u1");
    assert_eq!(api.user_career(&user).await.unwrap(), None);
    assert_eq!(api.user_career_name(&user).await.unwrap(), None);
}

#[tokio::test]
async fn anonymous_requests_have_no_authorization_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/subjects")
        .match_header("authorization", Matcher::Missing)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": [{"id": 1, "name": "Math"}]}"#)
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::new());
    let subjects = api.list_subjects().await.unwrap();
    mock.assert_async().await;
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].name, "Math");
}

#[tokio::test]
async fn records_read_integer_active_flag() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/user-study-records/user/u1")
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                {"id": 1, "user_id": "u1", "subject_id": 2, "study_time": 600,
                 "created_at": "2025-07-28 09:30:00", "ativo": 1},
                {"id": 2, "user_id": "u1", "subject_id": 2, "study_time": 60, "ativo": 0}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1")).with_clock(fixed_clock());
    let records = api.list_records(&UserId::new("u1")).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].created_at, fixed_now());
    assert!(records[0].active);
    assert!(!records[1].active);
    assert_eq!(
        records[0].created_at,
        Utc.with_ymd_and_hms(2025, 7, 28, 9, 30, 0).unwrap()
    );
    assert_eq!(records[0].study_time_secs, 600);
}

#[tokio::test]
async fn create_record_sends_active_flag_and_keeps_fields() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/user-study-records")
        .match_body(Matcher::PartialJson(json!({
            "user_id": "u1",
            "subject_id": 3,
            "study_time": 1500,
            "correct_answers": 8,
            "ativo": 1
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"id": 77}}"#)
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1")).with_clock(fixed_clock());
    let record = NewStudyRecord {
        subject_id: SubjectId::new(3),
        topic: "Verbs".into(),
        study_time_secs: 1500,
        total_pauses: 0,
        questions_resolved: 10,
        correct_answers: 8,
        incorrect_answers: 2,
    };
    let created = api
        .create_record(&UserId::new("u1"), &record)
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(created.id, RecordId::new(77));
    assert_eq!(created.topic, "Verbs");
    assert_eq!(created.created_at, fixed_now());
    assert!(created.active);
}

#[tokio::test]
async fn day_progress_is_put_by_date() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/api/progress/2025-07-28")
        .match_body(Matcher::Json(json!({"slot_ids": [1, 5]})))
        .with_status(204)
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1"));
    let date = NaiveDate::from_ymd_opt(2025, 7, 28).unwrap();
    let slots: BTreeSet<SlotId> = [SlotId::new(5), SlotId::new(1)].into_iter().collect();
    api.replace_day_progress(date, &slots).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn saved_plan_comes_back_canonical() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/api/schedule")
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"days":[{"day":"monday","subjects":[{"id":900,"subject_id":1,"name":"Math"}]}]}"#,
        )
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1"));
    let mut plan = WeeklyPlan::empty();
    plan.add_slot(DayOfWeek::Monday, SubjectId::new(1), "Math")
        .unwrap();
    let canonical = api.save_plan(&plan).await.unwrap();
    assert!(canonical.same_contents(&plan));
    assert!(canonical.contains_slot(SlotId::new(900)));
}

#[tokio::test]
async fn users_are_paged_by_query() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/users")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [{"id": 11, "name": "Ana", "email": "ana@example.com", "is_premium": 1}],
                "current_page": 2,
                "last_page": 2,
                "total": 11
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("admin"));
    let page = api.list_users(2).await.unwrap();
    assert_eq!(page.current_page, 2);
    assert_eq!(page.total, 11);
    assert!(page.users[0].is_premium);
}

#[tokio::test]
async fn failures_map_to_api_errors() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/careers")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/api/admin/stats")
        .with_header("content-type", "application/json")
        .with_body("not json")
        .create_async()
        .await;

    let api = backend(&server, InMemoryAuth::signed_in("u1"));
    let err = api.list_careers().await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::HttpStatus(status) if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
    assert!(!err.is_not_found());
    assert!(matches!(
        api.dashboard_stats().await,
        Err(ApiError::Decode(_))
    ));
}

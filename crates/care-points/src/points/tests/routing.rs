use super::common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::points::router::{PERSON_HEADER, STAFF_HEADER};
use crate::points::Person;

fn post_json(uri: &str, staff_name: Option<&str>, payload: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(name) = staff_name {
        builder = builder.header(STAFF_HEADER, name);
    }
    builder
        .body(Body::from(serde_json::to_vec(&payload).expect("serialize")))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

#[tokio::test]
async fn award_route_requires_staff_header() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    let router = router_with_service(service);

    let payload = json!({ "subject_name": "Taro", "activity": "散歩", "points": 5 });
    let response = router
        .clone()
        .oneshot(post_json("/api/v1/awards", None, payload.clone()))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .oneshot(post_json("/api/v1/awards", Some("Sato"), payload))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["index"], 0);
    assert_eq!(body["record"]["points"], 5);
    assert_eq!(body["record"]["comment"], "ok");
}

#[tokio::test]
async fn award_route_rejects_missing_points_as_unprocessable() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    let router = router_with_service(service);

    let response = router
        .oneshot(post_json(
            "/api/v1/awards",
            Some("Sato"),
            json!({ "subject_name": "Taro", "activity": "unknown chore" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("unknown chore"));
}

#[tokio::test]
async fn rankings_route_returns_ranked_rows() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    for (name, points) in [("A", 30), ("B", 80)] {
        service
            .award(&staff(), award(name, "散歩", points, date(2024, 6, 2)))
            .await
            .expect("award");
    }
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(get("/api/v1/rankings?scope=person&month=2024-06"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["month"], "2024-06");
    assert_eq!(body["rows"][0]["rank"], 1);
    assert_eq!(body["rows"][0]["medal"], "gold");
    assert_eq!(body["rows"][0]["person"]["display_name"], "B");
    assert_eq!(body["rows"][1]["score"], 30);

    let response = router
        .oneshot(get("/api/v1/rankings?month=June"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn dashboard_route_uses_person_headers() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    service
        .register_person(&staff(), Person::new("Hanako"))
        .expect("register");
    service
        .award(&staff(), award("Hanako", "散歩", 25, date(2024, 6, 2)))
        .await
        .expect("award");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(get("/api/v1/dashboard?month=2024-06"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::get("/api/v1/dashboard?month=2024-06")
        .header(PERSON_HEADER, "hanako")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["display_name"], "Hanako");
    assert_eq!(body["month_points"], 25);
    assert_eq!(body["badge_status"]["status"], "no_baseline");
}

#[tokio::test]
async fn login_route_rejects_unknown_names() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    service
        .register_person(&staff(), Person::new("Hanako"))
        .expect("register");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(post_json("/api/v1/login", None, json!({ "name": "Nobody" })))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(post_json("/api/v1/login", None, json!({ "name": " HANAKO" })))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["person_key"], "hanako");
    assert_eq!(body["is_admin"], false);
}

#[tokio::test]
async fn registry_routes_map_conflicts_and_missing_entries() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/persons",
            Some("Sato"),
            json!({ "display_name": "Taro" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/persons",
            Some("Sato"),
            json!({ "display_name": "TARO" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/persons/remove",
            Some("Sato"),
            json!({ "name": "Jiro" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(get("/api/v1/persons"))
        .await
        .expect("route executes");
    let body = read_json_body(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn records_delete_route_reports_removed_count() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    service
        .award(&staff(), award("Taro", "散歩", 5, date(2024, 6, 2)))
        .await
        .expect("award");
    let router = router_with_service(service);

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/records/delete",
            Some("Sato"),
            json!({ "indices": [0, 4] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["removed"], 1);

    let request = Request::get("/api/v1/records")
        .header(STAFF_HEADER, "Sato")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("route executes");
    let body = read_json_body(response).await;
    assert_eq!(body["records"].as_array().map(Vec::len), Some(0));
    assert_eq!(body["unreadable"], false);
}

#[tokio::test]
async fn records_route_filters_by_name_fragment() {
    let (_dir, service) = build_service(Recorder::replying("ok"));
    for name in ["Taro Yamada", "Hanako", "yamada jiro"] {
        service
            .award(&staff(), award(name, "散歩", 5, date(2024, 6, 2)))
            .await
            .expect("award");
    }
    let router = router_with_service(service);

    let request = Request::get("/api/v1/records?name=YAMA")
        .header(STAFF_HEADER, "Sato")
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let indices: Vec<u64> = body["records"]
        .as_array()
        .expect("records array")
        .iter()
        .filter_map(|entry| entry["index"].as_u64())
        .collect();
    assert_eq!(indices, vec![0, 2]);
}

#[tokio::test]
async fn award_route_reports_unreadable_ledger_as_unavailable() {
    let (dir, service) = build_service(Recorder::replying("ok"));
    std::fs::create_dir(dir.path().join("points.csv")).expect("directory in place of the ledger");
    let router = router_with_service(service);

    let response = router
        .oneshot(post_json(
            "/api/v1/awards",
            Some("Sato"),
            json!({ "subject_name": "Taro", "activity": "散歩", "points": 5 }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

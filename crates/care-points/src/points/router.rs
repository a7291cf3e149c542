use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::badge::{BadgeError, BadgeRepository};
use super::comment::CommentGenerator;
use super::name_key::NameKey;
use super::registry::{Person, RegistryError};
use super::service::{
    current_month, parse_month, AwardRequest, HistoryEntry, PointsService, RankScope,
    ServiceError,
};
use super::session::Session;

pub const STAFF_HEADER: &str = "x-staff-name";
pub const PERSON_HEADER: &str = "x-person-name";
pub const BIRTHDATE_HEADER: &str = "x-person-birthdate";

type SharedService<G, B> = Arc<PointsService<G, B>>;

/// Router exposing awards, rankings, badges, dashboards and registry edits.
pub fn points_router<G, B>(service: SharedService<G, B>) -> Router
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    Router::new()
        .route("/api/v1/login", post(login_handler::<G, B>))
        .route("/api/v1/awards", post(award_handler::<G, B>))
        .route("/api/v1/records", get(records_handler::<G, B>))
        .route("/api/v1/records/delete", post(delete_records_handler::<G, B>))
        .route("/api/v1/history", get(history_handler::<G, B>))
        .route("/api/v1/rankings", get(rankings_handler::<G, B>))
        .route("/api/v1/badges/evaluate", post(evaluate_badges_handler::<G, B>))
        .route("/api/v1/dashboard", get(dashboard_handler::<G, B>))
        .route(
            "/api/v1/persons",
            get(list_persons_handler::<G, B>).post(register_person_handler::<G, B>),
        )
        .route("/api/v1/persons/facility", post(reassign_facility_handler::<G, B>))
        .route("/api/v1/persons/remove", post(remove_person_handler::<G, B>))
        .route(
            "/api/v1/facilities",
            get(list_facilities_handler::<G, B>).post(add_facility_handler::<G, B>),
        )
        .route("/api/v1/facilities/rename", post(rename_facility_handler::<G, B>))
        .route("/api/v1/facilities/remove", post(remove_facility_handler::<G, B>))
        .route(
            "/api/v1/activities",
            get(list_activities_handler::<G, B>).post(upsert_activity_handler::<G, B>),
        )
        .route("/api/v1/activities/remove", post(remove_activity_handler::<G, B>))
        .with_state(service)
}

/// Staff header wins; otherwise the person headers must pass login.
fn session_from_headers<G, B>(service: &PointsService<G, B>, headers: &HeaderMap) -> Session
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(staff) = header(STAFF_HEADER) {
        return Session::staff(staff);
    }
    if let Some(name) = header(PERSON_HEADER) {
        let birthdate =
            header(BIRTHDATE_HEADER).and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
        if let Some(session) = service.login(name, birthdate) {
            return session;
        }
    }
    Session::anonymous()
}

pub(crate) fn error_response(error: ServiceError) -> Response {
    let status = match &error {
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Forbidden => StatusCode::FORBIDDEN,
        ServiceError::NotLoggedIn => StatusCode::UNAUTHORIZED,
        ServiceError::Registry(
            RegistryError::DuplicatePerson(_) | RegistryError::DuplicateFacility(_),
        ) => StatusCode::CONFLICT,
        ServiceError::Registry(
            RegistryError::UnknownPerson(_)
            | RegistryError::UnknownFacility(_)
            | RegistryError::UnknownActivity(_),
        ) => StatusCode::NOT_FOUND,
        ServiceError::Registry(RegistryError::EmptyName) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Registry(RegistryError::Store(_))
        | ServiceError::Store(_)
        | ServiceError::Badge(BadgeError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Unavailable(_) | ServiceError::Badge(BadgeError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    name: String,
    #[serde(default)]
    birthdate: Option<NaiveDate>,
}

pub(crate) async fn login_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    Json(request): Json<LoginRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    match service.login(&request.name, request.birthdate) {
        Some(session) => (StatusCode::OK, Json(session)).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "no registered person matches" })),
        )
            .into_response(),
    }
}

pub(crate) async fn award_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<AwardRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    respond(StatusCode::CREATED, service.award(&session, request).await)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecordsQuery {
    /// Case-insensitive fragment of the subject name.
    #[serde(default)]
    name: Option<String>,
}

pub(crate) async fn records_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Query(query): Query<RecordsQuery>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let fragment = NameKey::new(query.name.as_deref().unwrap_or_default());
    let result = service.records(&session).map(|report| {
        let records: Vec<HistoryEntry> = report
            .ledger
            .matching(&fragment)
            .into_iter()
            .map(|(index, record)| HistoryEntry {
                index,
                record: record.clone(),
            })
            .collect();
        json!({
            "records": records,
            "coerced_points": report.coerced_points,
            "skipped_rows": report.skipped_rows,
            "unreadable": report.unreadable,
        })
    });
    respond(StatusCode::OK, result)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default)]
    name: Option<String>,
}

pub(crate) async fn history_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    respond(StatusCode::OK, service.history(&session, query.name.as_deref()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteRecordsRequest {
    indices: Vec<usize>,
}

pub(crate) async fn delete_records_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<DeleteRecordsRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .delete_records(&session, &request.indices)
        .map(|removed| json!({ "removed": removed }));
    respond(StatusCode::OK, result)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RankingQuery {
    #[serde(default)]
    scope: RankScope,
    #[serde(default)]
    month: Option<String>,
}

pub(crate) async fn rankings_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    Query(query): Query<RankingQuery>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let result = match query.month.as_deref().map(parse_month).transpose() {
        Ok(month) => service.rankings(query.scope, month),
        Err(error) => Err(error.into()),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateBadgesRequest {
    month: String,
}

pub(crate) async fn evaluate_badges_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<EvaluateBadgesRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = parse_month(&request.month)
        .map_err(ServiceError::from)
        .and_then(|month| service.evaluate_badges(&session, month))
        .map(|granted| json!({ "granted": granted }));
    respond(StatusCode::OK, result)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DashboardQuery {
    #[serde(default)]
    month: Option<String>,
}

pub(crate) async fn dashboard_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let month = match query.month.as_deref() {
        Some(raw) => parse_month(raw).map_err(ServiceError::from),
        None => Ok(current_month()),
    };
    respond(
        StatusCode::OK,
        month.and_then(|month| service.dashboard(&session, month)),
    )
}

pub(crate) async fn list_persons_handler<G, B>(
    State(service): State<SharedService<G, B>>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    (StatusCode::OK, Json(service.persons())).into_response()
}

pub(crate) async fn register_person_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(person): Json<Person>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    respond(StatusCode::CREATED, service.register_person(&session, person))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReassignRequest {
    name: String,
    #[serde(default)]
    facility: Option<String>,
}

pub(crate) async fn reassign_facility_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<ReassignRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .reassign_facility(&session, &request.name, request.facility)
        .map(|()| json!({ "status": "updated" }));
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct NameRequest {
    name: String,
}

pub(crate) async fn remove_person_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<NameRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    respond(StatusCode::OK, service.remove_person(&session, &request.name))
}

pub(crate) async fn list_facilities_handler<G, B>(
    State(service): State<SharedService<G, B>>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    (StatusCode::OK, Json(service.facilities())).into_response()
}

pub(crate) async fn add_facility_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<NameRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .add_facility(&session, &request.name)
        .map(|()| json!({ "facility_name": request.name.trim() }));
    respond(StatusCode::CREATED, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RenameRequest {
    from: String,
    to: String,
}

pub(crate) async fn rename_facility_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<RenameRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .rename_facility(&session, &request.from, &request.to)
        .map(|moved| json!({ "persons_moved": moved }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn remove_facility_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<NameRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .remove_facility(&session, &request.name)
        .map(|unassigned| json!({ "persons_unassigned": unassigned }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn list_activities_handler<G, B>(
    State(service): State<SharedService<G, B>>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    (StatusCode::OK, Json(service.activities())).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivityRequest {
    activity: String,
    points: u64,
}

pub(crate) async fn upsert_activity_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<ActivityRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .upsert_activity(&session, &request.activity, request.points)
        .map(|()| json!({ "activity": request.activity.trim(), "points": request.points }));
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivityNameRequest {
    activity: String,
}

pub(crate) async fn remove_activity_handler<G, B>(
    State(service): State<SharedService<G, B>>,
    headers: HeaderMap,
    Json(request): Json<ActivityNameRequest>,
) -> Response
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    let session = session_from_headers(&service, &headers);
    let result = service
        .remove_activity(&session, &request.activity)
        .map(|()| json!({ "status": "removed" }));
    respond(StatusCode::OK, result)
}

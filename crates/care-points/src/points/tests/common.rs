use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use axum::Router;
use chrono::NaiveDate;
use serde_json::Value;
use tempfile::TempDir;

use crate::points::{
    points_router, AwardRequest, CommentError, CommentGenerator, CommentRequest, CommentService,
    InMemoryBadgeRepository, PointsService, Session,
};

/// Generator that records every request and replies with a fixed outcome.
#[derive(Clone, Default)]
pub(super) struct Recorder {
    pub(super) reply: Option<&'static str>,
    requests: Arc<Mutex<Vec<CommentRequest>>>,
}

impl Recorder {
    pub(super) fn replying(reply: &'static str) -> Self {
        Self {
            reply: Some(reply),
            ..Self::default()
        }
    }

    pub(super) fn failing() -> Self {
        Self::default()
    }

    pub(super) fn requests(&self) -> Vec<CommentRequest> {
        self.requests.lock().expect("recorder lock").clone()
    }
}

impl CommentGenerator for Recorder {
    async fn generate(&self, request: &CommentRequest) -> Result<String, CommentError> {
        self.requests
            .lock()
            .expect("recorder lock")
            .push(request.clone());
        match self.reply {
            Some(reply) => Ok(reply.to_string()),
            None => Err(CommentError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}

pub(super) type TestService = PointsService<Recorder, InMemoryBadgeRepository>;

pub(super) fn build_service(recorder: Recorder) -> (TempDir, TestService) {
    let dir = tempfile::tempdir().expect("temp dir");
    let service = PointsService::new(
        dir.path(),
        CommentService::new(recorder, Duration::from_secs(1)),
        Arc::new(InMemoryBadgeRepository::default()),
        5,
    );
    (dir, service)
}

pub(super) fn router_with_service(service: TestService) -> Router {
    points_router(Arc::new(service))
}

pub(super) fn staff() -> Session {
    Session::staff("Sato")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn award(subject: &str, activity: &str, points: u64, on: NaiveDate) -> AwardRequest {
    AwardRequest {
        subject_name: subject.to_string(),
        activity: activity.to_string(),
        points: Some(points),
        department: None,
        date: Some(on),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

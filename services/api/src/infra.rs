use care_points::config::AppConfig;
use care_points::points::service::parse_month;
use care_points::points::{
    CommentService, ConfiguredGenerator, CsvBadgeRepository, PointsService, YearMonth,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type Service = PointsService<ConfiguredGenerator, CsvBadgeRepository>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wires the CSV-backed service from configuration.
pub(crate) fn build_service(config: &AppConfig) -> Service {
    let data_dir = &config.storage.data_dir;
    let comments = CommentService::new(
        ConfiguredGenerator::from_config(&config.comments),
        config.comments.timeout,
    );
    PointsService::new(
        data_dir,
        comments,
        Arc::new(CsvBadgeRepository::in_dir(data_dir)),
        config.comments.history_limit,
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_month_arg(raw: &str) -> Result<YearMonth, String> {
    parse_month(raw).map_err(|err| err.to_string())
}

use crate::infra::{build_service, parse_date, parse_month_arg, Service};
use care_points::config::AppConfig;
use care_points::error::AppError;
use care_points::points::service::current_month;
use care_points::points::{
    AwardRequest, RankScope, RankingTable, ServiceError, Session, UserDashboard, YearMonth,
};
use care_points::telemetry;
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct StoreArgs {
    /// Override the directory holding the CSV tables
    #[arg(long)]
    pub(crate) data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct StaffArgs {
    /// Staff member recorded as the acting session
    #[arg(long, default_value = "cli")]
    pub(crate) staff: String,
}

#[derive(Args, Debug)]
pub(crate) struct AwardArgs {
    /// Resident receiving the points
    #[arg(long)]
    pub(crate) name: String,
    /// Activity being rewarded
    #[arg(long)]
    pub(crate) activity: String,
    /// Points to award; defaults to the activity catalog value
    #[arg(long)]
    pub(crate) points: Option<u64>,
    #[arg(long)]
    pub(crate) department: Option<String>,
    /// Award date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
    #[command(flatten)]
    pub(crate) staff: StaffArgs,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct RecordsArgs {
    /// Only show rows whose resident name contains this text (case-insensitive)
    #[arg(long)]
    pub(crate) name: Option<String>,
    #[command(flatten)]
    pub(crate) staff: StaffArgs,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum ScopeArg {
    #[default]
    Person,
    Facility,
}

impl From<ScopeArg> for RankScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Person => RankScope::Person,
            ScopeArg::Facility => RankScope::Facility,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct RankArgs {
    #[arg(long, value_enum, default_value_t = ScopeArg::Person)]
    pub(crate) scope: ScopeArg,
    /// Restrict to one month (YYYY-MM); all time when omitted
    #[arg(long, value_parser = parse_month_arg)]
    pub(crate) month: Option<YearMonth>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct BadgesArgs {
    /// Month to evaluate (YYYY-MM); defaults to the current month
    #[arg(long, value_parser = parse_month_arg)]
    pub(crate) month: Option<YearMonth>,
    #[command(flatten)]
    pub(crate) staff: StaffArgs,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

#[derive(Args, Debug)]
pub(crate) struct DashboardArgs {
    /// Resident to log in as
    #[arg(long)]
    pub(crate) name: String,
    /// Birthdate (YYYY-MM-DD), required when one is registered
    #[arg(long, value_parser = parse_date)]
    pub(crate) birthdate: Option<NaiveDate>,
    #[arg(long, value_parser = parse_month_arg)]
    pub(crate) month: Option<YearMonth>,
    #[command(flatten)]
    pub(crate) store: StoreArgs,
}

fn open_service(store: StoreArgs) -> Result<Service, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(data_dir) = store.data_dir {
        config.storage.data_dir = data_dir;
    }
    telemetry::init(&config.telemetry)?;
    Ok(build_service(&config))
}

pub(crate) async fn run_award(args: AwardArgs) -> Result<(), AppError> {
    let service = open_service(args.store)?;
    let session = Session::staff(&args.staff.staff);
    let receipt = service
        .award(
            &session,
            AwardRequest {
                subject_name: args.name,
                activity: args.activity,
                points: args.points,
                department: args.department,
                date: args.date,
            },
        )
        .await?;

    let record = &receipt.record;
    println!(
        "#{} {} {} {} (+{} pts)",
        receipt.index, record.date, record.subject_name, record.activity, record.points
    );
    if let Some(comment) = &record.comment {
        println!("  {comment}");
    }
    Ok(())
}

pub(crate) fn run_records(args: RecordsArgs) -> Result<(), AppError> {
    let service = open_service(args.store)?;
    let report = service.records(&Session::staff(&args.staff.staff))?;
    let fragment = care_points::points::NameKey::new(args.name.as_deref().unwrap_or_default());

    for (index, record) in report.ledger.matching(&fragment) {
        println!(
            "{:>5}  {:<16}  {:<12}  {:<16}  {:>5}  {}",
            index,
            record.date,
            record.subject_name,
            record.activity,
            record.points,
            record.comment.as_deref().unwrap_or("")
        );
    }

    if report.unreadable {
        println!("warning: ledger file could not be read; showing an empty ledger");
    }
    if report.coerced_points > 0 || report.skipped_rows > 0 {
        println!(
            "note: {} rows had unusable points (counted as 0), {} rows were skipped",
            report.coerced_points, report.skipped_rows
        );
    }
    Ok(())
}

pub(crate) fn run_rank(args: RankArgs) -> Result<(), AppError> {
    let service = open_service(args.store)?;
    let table = service.rankings(args.scope.into(), args.month)?;
    print!("{}", render_ranking(&table));
    Ok(())
}

pub(crate) fn run_badges(args: BadgesArgs) -> Result<(), AppError> {
    let service = open_service(args.store)?;
    let month = args.month.unwrap_or_else(current_month);
    let granted = service.evaluate_badges(&Session::staff(&args.staff.staff), month)?;

    if granted.is_empty() {
        println!("No new badges for {month}");
    }
    for award in granted {
        println!(
            "{} {} {} ({:+})",
            award.year_month,
            award.person_key,
            award.badge_kind.label(),
            award.delta
        );
    }
    Ok(())
}

pub(crate) fn run_dashboard(args: DashboardArgs) -> Result<(), AppError> {
    let service = open_service(args.store)?;
    let session = service
        .login(&args.name, args.birthdate)
        .ok_or(ServiceError::NotLoggedIn)?;
    let month = args.month.unwrap_or_else(current_month);
    let dashboard = service.dashboard(&session, month)?;
    print!("{}", render_dashboard(&dashboard));
    Ok(())
}

fn render_ranking(table: &RankingTable) -> String {
    let mut out = String::new();
    let period = table
        .month
        .map(|month| month.to_string())
        .unwrap_or_else(|| "all time".to_string());
    out.push_str(&format!("Ranking ({period})\n"));
    if table.rows.is_empty() {
        out.push_str("  no records\n");
    }
    for ranked in &table.rows {
        out.push_str(&format!(
            "  {:<8} {:<20} {:>6} pts\n",
            ranked.rank_label(),
            ranked.row.label(),
            ranked.score
        ));
    }
    if table.unknown_month > 0 {
        out.push_str(&format!(
            "  ({} records with unreadable dates excluded)\n",
            table.unknown_month
        ));
    }
    out
}

fn render_dashboard(dashboard: &UserDashboard) -> String {
    let mut out = format!("{} ({})\n", dashboard.display_name, dashboard.month);
    out.push_str(&format!("  total points: {}\n", dashboard.total_points));
    out.push_str(&format!("  this month:   {}\n", dashboard.month_points));
    match dashboard.month_rank {
        Some(rank) => out.push_str(&format!(
            "  month rank:   {} of {}\n",
            rank, dashboard.ranked_people
        )),
        None => out.push_str("  month rank:   -\n"),
    }
    out.push_str(&format!("  badge:        {}\n", dashboard.badge_status.label()));
    for entry in &dashboard.recent {
        out.push_str(&format!(
            "  {}  {}  +{}\n",
            entry.record.date, entry.record.activity, entry.record.points
        ));
    }
    out
}

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::aggregate::{in_month, AggregateRow, Aggregator, GroupBy};
use super::badge::{classify, BadgeAward, BadgeEngine, BadgeError, BadgeRepository, BadgeStatus};
use super::comment::{CommentGenerator, CommentRequest, CommentService};
use super::ledger::{Ledger, LedgerStore, LoadReport};
use super::name_key::NameKey;
use super::rank::{rank, Ranked};
use super::record::{PointRecord, RecordedAt, YearMonth, MAX_POINTS};
use super::registry::{
    ActivityCatalogEntry, FacilityEntry, Person, Registry, RegistryError, RegistryStore,
};
use super::session::{self, Session};
use super::store::StoreError;

const DASHBOARD_HISTORY: usize = 20;

/// Staff input for one award.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwardRequest {
    pub subject_name: String,
    pub activity: String,
    /// Falls back to the catalog value for `activity` when omitted.
    #[serde(default)]
    pub points: Option<u64>,
    #[serde(default)]
    pub department: Option<String>,
    /// Defaults to the current local time, minute precision.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardReceipt {
    pub index: usize,
    pub record: PointRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankScope {
    #[default]
    Person,
    Facility,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingTable {
    pub scope: RankScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<YearMonth>,
    pub rows: Vec<Ranked<AggregateRow>>,
    pub unknown_month: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub index: usize,
    #[serde(flatten)]
    pub record: PointRecord,
}

/// Everything a resident sees in user mode.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    pub display_name: String,
    pub person_key: NameKey,
    pub month: YearMonth,
    pub total_points: u64,
    pub month_points: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month_rank: Option<usize>,
    pub ranked_people: usize,
    pub monthly_totals: Vec<AggregateRow>,
    pub badge_status: BadgeStatus,
    pub badges: Vec<BadgeAward>,
    pub recent: Vec<HistoryEntry>,
}

/// Input failures rejected before anything reaches the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("subject name is required")]
    MissingSubject,
    #[error("activity is required")]
    MissingActivity,
    #[error("points are required for '{0}' (not in the activity catalog)")]
    MissingPoints(String),
    #[error("{0} points exceeds the per-award limit of {MAX_POINTS}")]
    PointsOutOfRange(u64),
    #[error("'{0}' is not a YYYY-MM month")]
    InvalidMonth(String),
}

/// Error raised by the points service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("operation requires a staff session")]
    Forbidden,
    #[error("no resident is logged in")]
    NotLoggedIn,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Badge(#[from] BadgeError),
    #[error("points store unavailable: {0}")]
    Unavailable(String),
}

/// Composes the ledger, registry, comment generation and badge engine.
///
/// Every load, mutate, save sequence runs under one process-wide lock so
/// concurrent requests cannot lose each other's updates.
pub struct PointsService<G, B> {
    ledger: LedgerStore,
    registry: RegistryStore,
    comments: CommentService<G>,
    badges: BadgeEngine<B>,
    history_limit: usize,
    write_lock: Mutex<()>,
}

impl<G, B> PointsService<G, B>
where
    G: CommentGenerator + 'static,
    B: BadgeRepository + 'static,
{
    pub fn new(
        data_dir: &Path,
        comments: CommentService<G>,
        badges: Arc<B>,
        history_limit: usize,
    ) -> Self {
        Self {
            ledger: LedgerStore::in_dir(data_dir),
            registry: RegistryStore::in_dir(data_dir),
            comments,
            badges: BadgeEngine::new(badges),
            history_limit,
            write_lock: Mutex::new(()),
        }
    }

    /// Validates, drafts a comment, and appends the award. Comment failures
    /// never fail the award; the fallback text is stored instead.
    pub async fn award(
        &self,
        session: &Session,
        request: AwardRequest,
    ) -> Result<AwardReceipt, ServiceError> {
        require_staff(session)?;

        let subject_name = request.subject_name.trim().to_string();
        if NameKey::new(&subject_name).is_empty() {
            return Err(ValidationError::MissingSubject.into());
        }
        let activity = request.activity.trim().to_string();
        if activity.is_empty() {
            return Err(ValidationError::MissingActivity.into());
        }
        let points = match request.points {
            Some(points) => points,
            None => self
                .registry
                .load()
                .default_points(&activity)
                .ok_or_else(|| ValidationError::MissingPoints(activity.clone()))?,
        };
        if points > MAX_POINTS {
            return Err(ValidationError::PointsOutOfRange(points).into());
        }

        let history = self
            .ledger
            .load()
            .ledger
            .recent_comments(&NameKey::new(&subject_name), self.history_limit);
        let comment = self
            .comments
            .generate(&CommentRequest {
                activity: activity.clone(),
                points,
                history,
            })
            .await;

        let date = match request.date {
            Some(date) => RecordedAt::Date(date),
            None => {
                let now = Local::now().naive_local();
                let minute = now
                    .with_second(0)
                    .and_then(|time| time.with_nanosecond(0))
                    .unwrap_or(now);
                RecordedAt::DateTime(minute)
            }
        };
        let record = PointRecord {
            date,
            subject_name,
            activity,
            points,
            department: request
                .department
                .map(|department| department.trim().to_string())
                .filter(|department| !department.is_empty()),
            comment: Some(comment),
        };

        let index = self.append_record(record.clone())?;
        info!(
            subject = %record.subject_name,
            activity = %record.activity,
            points = record.points,
            "points awarded"
        );
        Ok(AwardReceipt { index, record })
    }

    fn append_record(&self, record: PointRecord) -> Result<usize, ServiceError> {
        let _lock = self.lock()?;
        let mut ledger = self.writable_ledger()?;
        let index = ledger.append(record);
        self.ledger.save(&ledger)?;
        Ok(index)
    }

    /// Full ledger with load diagnostics. Staff only.
    pub fn records(&self, session: &Session) -> Result<LoadReport, ServiceError> {
        require_staff(session)?;
        Ok(self.ledger.load())
    }

    /// One person's records, newest first. Residents may only read their own.
    pub fn history(
        &self,
        session: &Session,
        name: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, ServiceError> {
        let requested = name.map(NameKey::new).filter(|key| !key.is_empty());
        let key = if session.is_admin {
            requested.ok_or(ValidationError::MissingSubject)?
        } else {
            let own = session.person_key.clone().ok_or(ServiceError::NotLoggedIn)?;
            if requested.is_some_and(|key| key != own) {
                return Err(ServiceError::Forbidden);
            }
            own
        };

        let ledger = self.ledger.load().ledger;
        Ok(ledger
            .history_for(&key)
            .into_iter()
            .map(|(index, record)| HistoryEntry {
                index,
                record: record.clone(),
            })
            .collect())
    }

    /// Irreversibly removes the ledger rows at `indices`.
    pub fn delete_records(&self, session: &Session, indices: &[usize]) -> Result<usize, ServiceError> {
        require_staff(session)?;
        let _lock = self.lock()?;
        let mut ledger = self.writable_ledger()?;
        let removed = ledger.delete(indices);
        if removed > 0 {
            self.ledger.save(&ledger)?;
            info!(removed, "ledger rows deleted");
        }
        Ok(removed)
    }

    pub fn rankings(
        &self,
        scope: RankScope,
        month: Option<YearMonth>,
    ) -> Result<RankingTable, ServiceError> {
        let ledger = self.ledger.load().ledger;
        let registry = self.registry.load();
        Ok(ranking_table(ledger.records(), &registry, scope, month))
    }

    /// Grants badges for `month` to every person with a previous-month baseline.
    pub fn evaluate_badges(
        &self,
        session: &Session,
        month: YearMonth,
    ) -> Result<Vec<BadgeAward>, ServiceError> {
        require_staff(session)?;
        let ledger = self.ledger.load().ledger;
        Ok(self.badges.evaluate_month(ledger.records(), month)?)
    }

    pub fn dashboard(
        &self,
        session: &Session,
        month: YearMonth,
    ) -> Result<UserDashboard, ServiceError> {
        let key = session.person_key.clone().ok_or(ServiceError::NotLoggedIn)?;
        let ledger = self.ledger.load().ledger;
        let registry = self.registry.load();
        let display_name = registry
            .find_person(key.as_str())
            .map(|person| person.display_name.clone())
            .or_else(|| session.display_name.clone())
            .unwrap_or_else(|| key.to_string());

        Ok(build_dashboard(
            &ledger,
            &registry,
            &self.badges,
            key,
            display_name,
            month,
        )?)
    }

    pub fn login(&self, name: &str, birthdate: Option<NaiveDate>) -> Option<Session> {
        session::login(&self.registry.load(), name, birthdate)
    }

    pub fn persons(&self) -> Vec<Person> {
        self.registry.load().persons().to_vec()
    }

    pub fn facilities(&self) -> Vec<FacilityEntry> {
        self.registry.load().facilities().to_vec()
    }

    pub fn activities(&self) -> Vec<ActivityCatalogEntry> {
        self.registry.load().activities().to_vec()
    }

    pub fn register_person(&self, session: &Session, person: Person) -> Result<Person, ServiceError> {
        self.edit_registry(session, |registry| {
            registry.register_person(person).map(Clone::clone)
        })
    }

    pub fn reassign_facility(
        &self,
        session: &Session,
        name: &str,
        facility: Option<String>,
    ) -> Result<(), ServiceError> {
        self.edit_registry(session, |registry| registry.reassign_facility(name, facility))
    }

    pub fn remove_person(&self, session: &Session, name: &str) -> Result<Person, ServiceError> {
        self.edit_registry(session, |registry| registry.remove_person(name))
    }

    pub fn add_facility(&self, session: &Session, name: &str) -> Result<(), ServiceError> {
        self.edit_registry(session, |registry| registry.add_facility(name))
    }

    pub fn rename_facility(
        &self,
        session: &Session,
        from: &str,
        to: &str,
    ) -> Result<usize, ServiceError> {
        self.edit_registry(session, |registry| registry.rename_facility(from, to))
    }

    pub fn remove_facility(&self, session: &Session, name: &str) -> Result<usize, ServiceError> {
        self.edit_registry(session, |registry| registry.remove_facility(name))
    }

    pub fn upsert_activity(
        &self,
        session: &Session,
        activity: &str,
        points: u64,
    ) -> Result<(), ServiceError> {
        self.edit_registry(session, |registry| registry.upsert_activity(activity, points))
    }

    pub fn remove_activity(&self, session: &Session, activity: &str) -> Result<(), ServiceError> {
        self.edit_registry(session, |registry| registry.remove_activity(activity))
    }

    fn edit_registry<T, F>(&self, session: &Session, edit: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Registry) -> Result<T, RegistryError>,
    {
        require_staff(session)?;
        let _lock = self.lock()?;
        let loaded = self.registry.load_report();
        if let Some(path) = loaded.unreadable.first() {
            return Err(ServiceError::Unavailable(format!(
                "{} could not be read; refusing to overwrite it",
                path.display()
            )));
        }
        let mut registry = loaded.registry;
        let outcome = edit(&mut registry)?;
        self.registry.save(&registry)?;
        Ok(outcome)
    }

    /// Ledger snapshot for a load, mutate, save sequence. An unreadable file
    /// is refused so the save cannot replace it; undecodable rows do not block
    /// the write and are dropped by it.
    fn writable_ledger(&self) -> Result<Ledger, ServiceError> {
        let report = self.ledger.load();
        if report.unreadable {
            return Err(ServiceError::Unavailable(format!(
                "{} could not be read; refusing to overwrite it",
                self.ledger.path().display()
            )));
        }
        if report.skipped_rows > 0 {
            warn!(
                skipped = report.skipped_rows,
                "rewriting ledger without its undecodable rows"
            );
        }
        Ok(report.ledger)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, ServiceError> {
        self.write_lock
            .lock()
            .map_err(|_| ServiceError::Unavailable("write lock poisoned".to_string()))
    }
}

fn require_staff(session: &Session) -> Result<(), ServiceError> {
    if session.is_admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

pub(crate) fn ranking_table(
    records: &[PointRecord],
    registry: &Registry,
    scope: RankScope,
    month: Option<YearMonth>,
) -> RankingTable {
    let index = registry.facility_index();
    let aggregator = Aggregator::new(&index);
    let group_by = match scope {
        RankScope::Person => GroupBy::PERSON,
        RankScope::Facility => GroupBy::FACILITY,
    };

    let (table, unknown_month) = match month {
        Some(month) => {
            let unknown = records.iter().filter(|record| record.month().is_none()).count();
            (aggregator.sum_by(records, group_by, in_month(month)), unknown)
        }
        None => (aggregator.sum_by(records, group_by, |_| true), 0),
    };

    RankingTable {
        scope,
        month,
        rows: rank(table.rows, |row| row.total_points),
        unknown_month,
    }
}

fn build_dashboard<B: BadgeRepository>(
    ledger: &Ledger,
    registry: &Registry,
    badges: &BadgeEngine<B>,
    key: NameKey,
    display_name: String,
    month: YearMonth,
) -> Result<UserDashboard, BadgeError> {
    let records = ledger.records();
    let index = registry.facility_index();
    let aggregator = Aggregator::new(&index);
    let own = |record: &PointRecord| record.subject_key() == key;

    let total_points = aggregator
        .sum_by(records, GroupBy::default(), own)
        .rows
        .first()
        .map(|row| row.total_points)
        .unwrap_or(0);
    let monthly_totals = aggregator.sum_by(records, GroupBy::MONTH, own).rows;
    let (month_points, _) = aggregator.person_month(records, &key, month);

    let ranking = ranking_table(records, registry, RankScope::Person, Some(month));
    let month_rank = ranking
        .rows
        .iter()
        .find(|ranked| ranked.row.person.as_ref().map(|person| &person.key) == Some(&key))
        .map(|ranked| ranked.rank);

    let recent = ledger
        .history_for(&key)
        .into_iter()
        .take(DASHBOARD_HISTORY)
        .map(|(index, record)| HistoryEntry {
            index,
            record: record.clone(),
        })
        .collect();

    Ok(UserDashboard {
        display_name,
        badge_status: classify(records, &key, month),
        badges: badges.awards_for(&key)?,
        person_key: key,
        month,
        total_points,
        month_points,
        month_rank,
        ranked_people: ranking.rows.len(),
        monthly_totals,
        recent,
    })
}

/// Parses a `YYYY-MM` month from request input.
pub fn parse_month(raw: &str) -> Result<YearMonth, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidMonth(raw.to_string()))
}

/// Month containing today's local date.
pub fn current_month() -> YearMonth {
    YearMonth::from_date(Local::now().date_naive())
}

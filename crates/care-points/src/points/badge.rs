use super::aggregate::Aggregator;
use super::name_key::NameKey;
use super::record::{PointRecord, YearMonth};
use super::registry::FacilityIndex;
use super::store::{self, SourceState, StoreError, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

pub const BADGES_FILE: &str = "badges.csv";
const BADGE_COLUMNS: [&str; 4] = ["year_month", "person_key", "badge_kind", "delta"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeKind {
    Growth,
    Encourage,
}

impl BadgeKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Growth => "Growth",
            Self::Encourage => "Keep trying",
        }
    }
}

/// A badge granted to one person for one month. At most one per
/// `(person_key, year_month, badge_kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    pub year_month: YearMonth,
    pub person_key: NameKey,
    pub badge_kind: BadgeKind,
    pub delta: i64,
}

impl BadgeAward {
    fn same_slot(&self, other: &BadgeAward) -> bool {
        self.year_month == other.year_month
            && self.person_key == other.person_key
            && self.badge_kind == other.badge_kind
    }
}

/// Month-over-month classification. `Maintained` and `NoBaseline` are display
/// states only and are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BadgeStatus {
    Growth { current: u64, previous: u64, delta: i64 },
    Encourage { current: u64, previous: u64, delta: i64 },
    Maintained { points: u64 },
    NoBaseline { current: u64 },
}

impl BadgeStatus {
    pub fn kind(&self) -> Option<BadgeKind> {
        match self {
            Self::Growth { .. } => Some(BadgeKind::Growth),
            Self::Encourage { .. } => Some(BadgeKind::Encourage),
            Self::Maintained { .. } | Self::NoBaseline { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Growth { .. } => BadgeKind::Growth.label(),
            Self::Encourage { .. } => BadgeKind::Encourage.label(),
            Self::Maintained { .. } => "Maintained",
            Self::NoBaseline { .. } => "No previous month",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BadgeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("badge repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage for granted badges.
pub trait BadgeRepository: Send + Sync {
    /// Stores `award` unless its slot is already taken. Returns whether it was stored.
    fn insert_if_absent(&self, award: BadgeAward) -> Result<bool, BadgeError>;
    fn list(&self) -> Result<Vec<BadgeAward>, BadgeError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBadgeRepository {
    awards: Mutex<Vec<BadgeAward>>,
}

impl BadgeRepository for InMemoryBadgeRepository {
    fn insert_if_absent(&self, award: BadgeAward) -> Result<bool, BadgeError> {
        let mut awards = self
            .awards
            .lock()
            .map_err(|_| BadgeError::Unavailable("badge mutex poisoned".to_string()))?;
        if awards.iter().any(|stored| stored.same_slot(&award)) {
            return Ok(false);
        }
        awards.push(award);
        Ok(true)
    }

    fn list(&self) -> Result<Vec<BadgeAward>, BadgeError> {
        let awards = self
            .awards
            .lock()
            .map_err(|_| BadgeError::Unavailable("badge mutex poisoned".to_string()))?;
        Ok(awards.clone())
    }
}

/// `badges.csv` table; each insert is a locked load, append, snapshot save.
#[derive(Debug)]
pub struct CsvBadgeRepository {
    path: PathBuf,
    guard: Mutex<()>,
}

impl CsvBadgeRepository {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(BADGES_FILE),
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> Table<BadgeAward> {
        store::read_table::<BadgeAward>(&self.path)
    }
}

impl BadgeRepository for CsvBadgeRepository {
    fn insert_if_absent(&self, award: BadgeAward) -> Result<bool, BadgeError> {
        let _lock = self
            .guard
            .lock()
            .map_err(|_| BadgeError::Unavailable("badge file lock poisoned".to_string()))?;
        let table = self.load();
        if table.source == SourceState::Unreadable {
            return Err(BadgeError::Unavailable(format!(
                "{} could not be read; refusing to overwrite it",
                self.path.display()
            )));
        }
        let mut awards = table.rows;
        if awards.iter().any(|stored| stored.same_slot(&award)) {
            return Ok(false);
        }
        awards.push(award);
        store::write_table(&self.path, &BADGE_COLUMNS, &awards)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<BadgeAward>, BadgeError> {
        Ok(self.load().rows)
    }
}

/// Compares a person's month total with the previous month's.
pub fn classify(records: &[PointRecord], key: &NameKey, month: YearMonth) -> BadgeStatus {
    let index = FacilityIndex::default();
    let aggregator = Aggregator::new(&index);
    let (current, _) = aggregator.person_month(records, key, month);
    let (previous, previous_records) = aggregator.person_month(records, key, month.previous());

    if previous_records == 0 {
        return BadgeStatus::NoBaseline { current };
    }

    let delta = (i128::from(current) - i128::from(previous))
        .clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
    match current.cmp(&previous) {
        std::cmp::Ordering::Greater => BadgeStatus::Growth {
            current,
            previous,
            delta,
        },
        std::cmp::Ordering::Less => BadgeStatus::Encourage {
            current,
            previous,
            delta,
        },
        std::cmp::Ordering::Equal => BadgeStatus::Maintained { points: current },
    }
}

/// Grants growth / encourage badges from month-over-month deltas.
pub struct BadgeEngine<R> {
    repository: Arc<R>,
}

impl<R: BadgeRepository> BadgeEngine<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns the newly stored award, or `None` when no badge applies or the
    /// slot was already filled by an earlier evaluation.
    pub fn evaluate(
        &self,
        records: &[PointRecord],
        key: &NameKey,
        as_of: YearMonth,
    ) -> Result<Option<BadgeAward>, BadgeError> {
        let (badge_kind, delta) = match classify(records, key, as_of) {
            BadgeStatus::Growth { delta, .. } => (BadgeKind::Growth, delta),
            BadgeStatus::Encourage { delta, .. } => (BadgeKind::Encourage, delta),
            BadgeStatus::Maintained { .. } | BadgeStatus::NoBaseline { .. } => return Ok(None),
        };

        let award = BadgeAward {
            year_month: as_of,
            person_key: key.clone(),
            badge_kind,
            delta,
        };
        if !self.repository.insert_if_absent(award.clone())? {
            return Ok(None);
        }

        info!(person = %key, month = %as_of, kind = ?badge_kind, delta, "badge granted");
        Ok(Some(award))
    }

    /// Evaluates every person with a baseline in the previous month.
    pub fn evaluate_month(
        &self,
        records: &[PointRecord],
        as_of: YearMonth,
    ) -> Result<Vec<BadgeAward>, BadgeError> {
        let baseline = as_of.previous();
        let keys: BTreeSet<NameKey> = records
            .iter()
            .filter(|record| record.month() == Some(baseline))
            .map(PointRecord::subject_key)
            .filter(|key| !key.is_empty())
            .collect();

        let mut granted = Vec::new();
        for key in keys {
            if let Some(award) = self.evaluate(records, &key, as_of)? {
                granted.push(award);
            }
        }
        Ok(granted)
    }

    pub fn awards_for(&self, key: &NameKey) -> Result<Vec<BadgeAward>, BadgeError> {
        Ok(self
            .repository
            .list()?
            .into_iter()
            .filter(|award| &award.person_key == key)
            .collect())
    }
}

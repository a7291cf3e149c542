use super::name_key::NameKey;
use super::record::{PointRecord, RecordedAt, MAX_POINTS};
use super::store::{self, SourceState, StoreError};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const LEDGER_FILE: &str = "points.csv";
pub const LEDGER_COLUMNS: [&str; 6] = [
    "date",
    "subject_name",
    "activity",
    "points",
    "department",
    "comment",
];

/// In-memory, insertion-ordered collection of award records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<PointRecord>,
}

impl Ledger {
    pub fn new(records: Vec<PointRecord>) -> Self {
        Self {
            records: records.into_iter().map(normalize).collect(),
        }
    }

    pub fn records(&self) -> &[PointRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PointRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends without deduplication and returns the new row's index.
    /// Text fields are trimmed and blank optional fields become `None`.
    pub fn append(&mut self, record: PointRecord) -> usize {
        self.records.push(normalize(record));
        self.records.len() - 1
    }

    /// Removes the rows at `indices`. Out-of-range and repeated indices are ignored.
    pub fn delete(&mut self, indices: &[usize]) -> usize {
        let selected: BTreeSet<usize> = indices
            .iter()
            .copied()
            .filter(|index| *index < self.records.len())
            .collect();
        if selected.is_empty() {
            return 0;
        }

        let mut position = 0;
        self.records.retain(|_| {
            let keep = !selected.contains(&position);
            position += 1;
            keep
        });
        selected.len()
    }

    /// Removes every row matching `predicate`.
    pub fn delete_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&PointRecord) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|record| !predicate(record));
        before - self.records.len()
    }

    /// Records for `key`, newest first; equal timestamps keep later insertions first.
    pub fn history_for(&self, key: &NameKey) -> Vec<(usize, &PointRecord)> {
        let mut rows: Vec<(usize, &PointRecord)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| &record.subject_key() == key)
            .collect();
        rows.sort_by(|(left_index, left), (right_index, right)| {
            right
                .date
                .sort_key()
                .cmp(&left.date.sort_key())
                .then(right_index.cmp(left_index))
        });
        rows
    }

    /// Rows whose subject contains `fragment`, in insertion order with their indices.
    pub fn matching(&self, fragment: &NameKey) -> Vec<(usize, &PointRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.subject_key().contains(fragment))
            .collect()
    }

    /// Most recent non-empty comments for `key`, in insertion order.
    pub fn recent_comments(&self, key: &NameKey, limit: usize) -> Vec<String> {
        let mut comments: Vec<String> = self
            .records
            .iter()
            .rev()
            .filter(|record| &record.subject_key() == key)
            .filter_map(|record| record.comment.clone())
            .filter(|comment| !comment.trim().is_empty())
            .take(limit)
            .collect();
        comments.reverse();
        comments
    }
}

fn normalize(mut record: PointRecord) -> PointRecord {
    fn present(value: Option<String>) -> Option<String> {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    record.subject_name = record.subject_name.trim().to_string();
    record.activity = record.activity.trim().to_string();
    record.department = present(record.department);
    record.comment = present(record.comment);
    record
}

/// Result of reading the ledger file.
///
/// A row whose `points` cell is empty, negative, fractional, above
/// [`MAX_POINTS`] or not a number is kept with zero points and counted in `coerced_points`. A row that cannot be
/// decoded, or that names no subject, is dropped and counted in `skipped_rows`.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub ledger: Ledger,
    pub coerced_points: usize,
    pub skipped_rows: usize,
    pub unreadable: bool,
}

/// CSV-backed durable store for the ledger. Every save is a full snapshot.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> LoadReport {
        // Field padding is normalized by `Ledger::append`.
        let table = store::read_table_with::<LedgerRow>(&self.path, csv::Trim::Headers);
        let mut report = LoadReport {
            skipped_rows: table.skipped,
            unreadable: table.source == SourceState::Unreadable,
            ..LoadReport::default()
        };

        for row in table.rows {
            let Some(subject_name) = row.subject_name.filter(|name| !name.trim().is_empty()) else {
                report.skipped_rows += 1;
                continue;
            };
            let points = match row.points.as_deref().map(parse_points) {
                Some(Some(points)) => points,
                _ => {
                    report.coerced_points += 1;
                    0
                }
            };

            report.ledger.append(PointRecord {
                date: RecordedAt::parse(row.date.as_deref().unwrap_or_default()),
                subject_name,
                activity: row.activity.unwrap_or_default(),
                points,
                department: row.department,
                comment: row.comment,
            });
        }

        if report.coerced_points > 0 || report.skipped_rows > 0 {
            warn!(
                path = %self.path.display(),
                coerced = report.coerced_points,
                skipped = report.skipped_rows,
                "ledger contained malformed rows"
            );
        }
        report
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        store::write_table(&self.path, &LEDGER_COLUMNS, ledger.records())?;
        info!(path = %self.path.display(), rows = ledger.len(), "ledger saved");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LedgerRow {
    #[serde(default, alias = "日付")]
    date: Option<String>,
    #[serde(default, alias = "利用者名")]
    subject_name: Option<String>,
    #[serde(default, alias = "活動内容")]
    activity: Option<String>,
    #[serde(default, alias = "ポイント")]
    points: Option<String>,
    #[serde(default, alias = "部署")]
    department: Option<String>,
    #[serde(default, alias = "コメント")]
    comment: Option<String>,
}

/// Accepts whole numbers up to [`MAX_POINTS`], including spreadsheet-style `10.0`.
fn parse_points(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(points) = raw.parse::<u64>() {
        return (points <= MAX_POINTS).then_some(points);
    }
    let value = raw.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= MAX_POINTS as f64)
        .then_some(value as u64)
}

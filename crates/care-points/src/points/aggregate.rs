use super::name_key::NameKey;
use super::record::{PointRecord, YearMonth};
use super::registry::FacilityIndex;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const UNASSIGNED_LABEL: &str = "(unassigned)";

/// Which dimensions a sum is grouped by. An empty set yields one grand total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupBy {
    pub person: bool,
    pub month: bool,
    pub facility: bool,
}

impl GroupBy {
    pub const PERSON: Self = Self {
        person: true,
        month: false,
        facility: false,
    };
    pub const FACILITY: Self = Self {
        person: false,
        month: false,
        facility: true,
    };
    pub const MONTH: Self = Self {
        person: false,
        month: true,
        facility: false,
    };
    pub const PERSON_MONTH: Self = Self {
        person: true,
        month: true,
        facility: false,
    };

    pub fn with_month(mut self) -> Self {
        self.month = true;
        self
    }
}

/// Facility group; persons without a registered facility land in `Unassigned`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FacilityBucket {
    Named(String),
    Unassigned,
}

impl FacilityBucket {
    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Unassigned => UNASSIGNED_LABEL,
        }
    }
}

impl fmt::Display for FacilityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for FacilityBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonGroup {
    pub key: NameKey,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<YearMonth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<FacilityBucket>,
    pub total_points: u64,
    pub record_count: usize,
}

impl AggregateRow {
    /// Human label for the grouped dimensions, e.g. `"Taro / 2024-06"`.
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(person) = &self.person {
            parts.push(person.display_name.clone());
        }
        if let Some(facility) = &self.facility {
            parts.push(facility.label().to_string());
        }
        if let Some(month) = &self.month {
            parts.push(month.to_string());
        }
        if parts.is_empty() {
            "total".to_string()
        } else {
            parts.join(" / ")
        }
    }
}

/// Grouped sums. Rows are ordered by their group key, so the output does not
/// depend on the order of the input records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateTable {
    pub rows: Vec<AggregateRow>,
    /// Records dropped from a month-keyed grouping because their date did not parse.
    pub unknown_month: usize,
}

type GroupKey = (Option<NameKey>, Option<FacilityBucket>, Option<YearMonth>);

#[derive(Default)]
struct Accumulator {
    display_name: Option<String>,
    total: u64,
    count: usize,
}

/// Groups and sums ledger rows, joining facilities through `NameKey`.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator<'a> {
    facilities: &'a FacilityIndex,
}

impl<'a> Aggregator<'a> {
    pub fn new(facilities: &'a FacilityIndex) -> Self {
        Self { facilities }
    }

    pub fn sum_by<F>(
        &self,
        records: &[PointRecord],
        group_by: GroupBy,
        predicate: F,
    ) -> AggregateTable
    where
        F: Fn(&PointRecord) -> bool,
    {
        let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
        let mut unknown_month = 0;

        for record in records.iter().filter(|record| predicate(*record)) {
            let month = if group_by.month {
                match record.month() {
                    Some(month) => Some(month),
                    None => {
                        unknown_month += 1;
                        continue;
                    }
                }
            } else {
                None
            };

            let subject_key = record.subject_key();
            let facility = group_by.facility.then(|| {
                match self.facilities.facility_of(&subject_key) {
                    Some(name) => FacilityBucket::Named(name.to_string()),
                    None => FacilityBucket::Unassigned,
                }
            });
            let person = group_by.person.then_some(subject_key);

            let accumulator = groups.entry((person, facility, month)).or_default();
            accumulator.total = accumulator.total.saturating_add(record.points);
            accumulator.count += 1;
            if group_by.person {
                let name = record.subject_name.trim();
                match &accumulator.display_name {
                    Some(current) if current.as_str() <= name => {}
                    _ => accumulator.display_name = Some(name.to_string()),
                }
            }
        }

        let rows = groups
            .into_iter()
            .map(|((person, facility, month), accumulator)| AggregateRow {
                person: person.map(|key| PersonGroup {
                    display_name: accumulator.display_name.unwrap_or_else(|| key.to_string()),
                    key,
                }),
                month,
                facility,
                total_points: accumulator.total,
                record_count: accumulator.count,
            })
            .collect();

        AggregateTable {
            rows,
            unknown_month,
        }
    }

    /// Total points and record count for one person in one month.
    pub fn person_month(
        &self,
        records: &[PointRecord],
        key: &NameKey,
        month: YearMonth,
    ) -> (u64, usize) {
        records
            .iter()
            .filter(|record| record.month() == Some(month) && &record.subject_key() == key)
            .fold((0u64, 0usize), |(total, count), record| {
                (total.saturating_add(record.points), count + 1)
            })
    }
}

/// Filter helper restricting a sum to one calendar month.
pub fn in_month(month: YearMonth) -> impl Fn(&PointRecord) -> bool {
    move |record| record.month() == Some(month)
}

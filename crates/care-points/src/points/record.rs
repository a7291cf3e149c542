use super::name_key::NameKey;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest point value a single record may carry. Larger ledger cells are
/// coerced to zero and larger awards are rejected.
pub const MAX_POINTS: u64 = 1_000_000;

/// One award event as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub date: RecordedAt,
    pub subject_name: String,
    pub activity: String,
    pub points: u64,
    pub department: Option<String>,
    pub comment: Option<String>,
}

impl PointRecord {
    pub fn subject_key(&self) -> NameKey {
        NameKey::new(&self.subject_name)
    }

    pub fn month(&self) -> Option<YearMonth> {
        self.date.month()
    }
}

/// Award timestamp. Day-only and minute-precision values are both in use;
/// anything unrecognized is carried verbatim so a save never loses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedAt {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Unparsed(String),
}

impl RecordedAt {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::DateTime(dt.naive_local());
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::DateTime(dt);
            }
        }
        for format in ["%Y-%m-%d", "%Y/%m/%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Self::Date(date);
            }
        }

        Self::Unparsed(trimmed.to_string())
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::DateTime(dt) => Some(dt.date()),
            Self::Unparsed(_) => None,
        }
    }

    pub fn month(&self) -> Option<YearMonth> {
        self.date().map(YearMonth::from_date)
    }

    /// Chronological key; unparsed dates sort before everything else.
    pub fn sort_key(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(date) => date.and_hms_opt(0, 0, 0),
            Self::DateTime(dt) => Some(*dt),
            Self::Unparsed(_) => None,
        }
    }
}

impl fmt::Display for RecordedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::DateTime(dt) if dt.second() == 0 && dt.nanosecond() == 0 => {
                write!(f, "{}", dt.format("%Y-%m-%d %H:%M"))
            }
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for RecordedAt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Calendar month used as the aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a YYYY-MM month")]
pub struct ParseYearMonthError(pub String);

impl FromStr for YearMonth {
    type Err = ParseYearMonthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (year, month) = trimmed
            .split_once(['-', '/'])
            .ok_or_else(|| ParseYearMonthError(raw.to_string()))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| ParseYearMonthError(raw.to_string()))?;
        let month = month
            .parse::<u32>()
            .map_err(|_| ParseYearMonthError(raw.to_string()))?;
        Self::new(year, month).ok_or_else(|| ParseYearMonthError(raw.to_string()))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_day_and_minute_formats() {
        assert_eq!(
            RecordedAt::parse("2024-06-03"),
            RecordedAt::Date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
        );
        assert_eq!(
            RecordedAt::parse("2024/06/03"),
            RecordedAt::Date(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
        );
        let minute = RecordedAt::parse("2024-06-03 14:05");
        assert_eq!(minute.to_string(), "2024-06-03 14:05");
        assert_eq!(minute.month(), YearMonth::new(2024, 6));
    }

    #[test]
    fn unparsed_dates_survive_display() {
        let raw = RecordedAt::parse(" someday ");
        assert_eq!(raw, RecordedAt::Unparsed("someday".to_string()));
        assert_eq!(raw.to_string(), "someday");
        assert!(raw.month().is_none());
        assert!(raw.sort_key().is_none());
    }

    #[test]
    fn previous_month_wraps_year() {
        let january = YearMonth::new(2024, 1).unwrap();
        assert_eq!(january.previous(), YearMonth::new(2023, 12).unwrap());
        assert_eq!(
            YearMonth::new(2024, 6).unwrap().previous().to_string(),
            "2024-05"
        );
    }

    #[test]
    fn year_month_parsing_rejects_bad_months() {
        assert_eq!("2024-06".parse::<YearMonth>(), Ok(YearMonth::new(2024, 6).unwrap()));
        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("June".parse::<YearMonth>().is_err());
    }
}

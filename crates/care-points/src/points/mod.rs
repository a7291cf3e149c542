//! Care-facility points ledger: awards, grouped totals, rankings, monthly
//! growth badges and per-resident dashboards, persisted as CSV tables.

pub mod aggregate;
pub mod badge;
pub mod comment;
pub mod ledger;
pub mod name_key;
pub mod rank;
pub mod record;
pub mod registry;
pub mod router;
pub mod service;
pub mod session;
pub(crate) mod store;

#[cfg(test)]
mod tests;

pub use aggregate::{AggregateRow, AggregateTable, Aggregator, FacilityBucket, GroupBy};
pub use badge::{
    BadgeAward, BadgeEngine, BadgeError, BadgeKind, BadgeRepository, BadgeStatus,
    CsvBadgeRepository, InMemoryBadgeRepository,
};
pub use comment::{
    ChatCompletionGenerator, CommentError, CommentGenerator, CommentRequest, CommentService,
    ConfiguredGenerator, FallbackOnly, FALLBACK_COMMENT,
};
pub use ledger::{Ledger, LedgerStore, LoadReport};
pub use name_key::NameKey;
pub use rank::{rank, Medal, Ranked};
pub use record::{PointRecord, RecordedAt, YearMonth, MAX_POINTS};
pub use registry::{
    ActivityCatalogEntry, FacilityEntry, Person, Registry, RegistryError, RegistryLoad,
};
pub use router::points_router;
pub use service::{
    AwardReceipt, AwardRequest, HistoryEntry, PointsService, RankScope, RankingTable,
    ServiceError, UserDashboard, ValidationError,
};
pub use session::Session;
pub use store::StoreError;

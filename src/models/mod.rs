pub mod alias;
pub mod distribution;
pub mod document;

pub use alias::{AliasMatch, EstimateLineCandidate, MatchSource, ProductAlias};
pub use distribution::{
    validate_allocations, AllocationInput, CostEntry, DistributionError, DistributionHistoryRow,
    DistributionRow, DistributionSnapshot, HistoryAction, SnapshotEntry,
};
pub use document::{
    shares_identity, DocumentRow, DocumentStatus, IssueSeverity, LineItem, LineItemRow,
    ParsedDocument, ParsingIssue,
};

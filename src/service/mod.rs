pub mod distribution;
pub mod ingest;
pub mod mapping;

pub use distribution::DistributionService;
pub use ingest::{IngestError, IngestOutcome, IngestService};
pub use mapping::{MappingService, SimilarityScorer, TokenSortScorer};

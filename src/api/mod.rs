pub mod handlers;

pub use handlers::{
    distribute, distribution_history, find_duplicates, health_check, ingest_document,
    learn_mapping, mark_duplicate, redistribute, suggest_mapping,
};

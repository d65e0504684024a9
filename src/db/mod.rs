pub mod pool;
pub mod queries;
pub mod queries_alias;
pub mod queries_distribution;

pub use pool::create_pool;

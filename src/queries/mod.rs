pub mod order_queries;

pub use order_queries::{OrderQueries, OrderStats, ProductRollup};

pub mod alert;
pub mod cooldown;
pub mod enrichment;
pub mod filters;
pub mod model;
pub mod odds;
pub mod scanner;
pub mod warmup;

pub use scanner::{EnrichmentCaches, Scanner, Sources};

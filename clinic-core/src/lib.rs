//! clinic-core: Shared infrastructure for the clinic ERP backend crates.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;

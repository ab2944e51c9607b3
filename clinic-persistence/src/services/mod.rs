//! Commit pipeline stages and the store abstraction.

pub mod audit;
pub mod change_set;
pub mod guard;
pub mod metrics;
pub mod repository;
pub mod soft_delete;
pub mod store;
pub mod unit_of_work;

pub use audit::{AuditRecorder, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use change_set::{ChangeKind, StagedChange};
pub use guard::PersistenceGuard;
pub use metrics::init_metrics;
pub use repository::Repository;
pub use soft_delete::SoftDeleteConverter;
pub use store::{DocumentStore, MemoryStore, VersionGuard, WriteOp};
pub use unit_of_work::UnitOfWork;

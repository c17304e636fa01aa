//! Database maintenance engine.
//!
//! Index/TTL management, integrity validation and the optimization report.

mod indexes;
mod integrity;
mod optimizer;
mod report;

pub use indexes::{index_catalogue, ttl_catalogue, IndexManager, IndexResult, IndexStatus};
pub use integrity::{is_valid_email, FindingStatus, IntegrityFinding, IntegrityValidator};
pub use optimizer::{Optimizer, OptimizerOptions, OptimizerRun, TTL_PURGE_SETTING};
pub use report::{
    recommendations, OptimizationReport, QuerySample, Recommendation, RecommendationKind,
};

pub mod error;
pub mod http;
pub mod store;
pub mod types;

pub use error::MetricsError;
pub use http::MetricsHttpServer;
pub use store::MetricsStore;
pub use types::{
    AlertCheck, AlertCompact, AlertState, AlertSummary, CronStats, ExportResult, LlmStats,
    PruneResult, RecallStats, Snapshot, ToolStat, ToolStats, Totals,
};

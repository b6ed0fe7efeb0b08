//! `haven-tools` — the uniform tool contract and its built-in
//! implementations, plus the policy resolver that gates execution.

pub mod builtin;
pub mod google_calendar_source;
pub mod policy;
pub mod registry;
pub mod tool;

pub use google_calendar_source::GoogleCalendarSource;
pub use policy::{resolve_policy, Decision};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolResult};

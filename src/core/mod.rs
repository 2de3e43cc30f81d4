//! Core data model shared by every pipeline stage.

pub mod issue;
pub mod source;
pub mod task;

pub use issue::{Category, Issue, Severity, SuppressedIssue};
pub use source::SourceFile;
pub use task::{AnalyzerOptions, AnalyzerStats, Task, TaskId, TaskOutput, TaskResult};

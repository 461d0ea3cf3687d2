//! Core domain models for the execution engine.
//!
//! This module contains the fundamental data structures used throughout
//! the scheduling pipeline: tasks and the dependency graph.

pub mod graph;
pub mod task;

pub use graph::{DependencyGraph, DependencyKind, DroppedEdge};
pub use task::{Priority, Task, TaskId, TaskSpec, TaskType};

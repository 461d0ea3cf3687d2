//! Integration test suite for the conductor engine.
//!
//! These tests exercise the full pipeline from task specs to execution
//! summary, including parallel execution, failure recovery and
//! configuration handling. They verify that all components work
//! together correctly.
//!
//! # Test Categories
//!
//! - `planning_e2e`: Full planning pipeline tests
//! - `parallel_execution`: Concurrency bounds and batch ordering
//! - `recovery`: Retry, escalation, blocking and cancellation
//!
//! # CI Compatibility
//!
//! All executors are in-process mocks; no external processes or network
//! access, making the suite safe to run in CI environments.


mod parallel_execution;
mod recovery;

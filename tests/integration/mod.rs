//! Integration tests for llm-admission
//!
//! These tests drive the public API end to end against real stores; time
//! is controlled with a manual clock.

pub mod admission_tests;
pub mod concurrency_tests;
pub mod config_tests;
pub mod storage_tests;

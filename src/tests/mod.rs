//! Cross-module test suite for batch planning
//!
//! Covers shard properties over many world sizes, multi-rank agreement and
//! end-to-end data module behavior. Unit tests live next to their modules.

pub mod data_tests;
pub mod integration_tests;

// Utility modules for testing
pub mod mock_data;

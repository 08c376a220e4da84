//! Integration tests for vxeval.
//!
//! This module organises integration tests by component.

pub mod config;
pub mod programs;
pub mod traversal;

//! Common test utilities for prize-pool
//!
//! This module provides shared testing infrastructure including:
//! - Reward fixtures anchored at a fixed point in time
//! - A wired-up service over in-memory stores
//! - A repository wrapper that fails on demand
//!
//! # Usage
//!
//! ```rust
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod failing;

pub use failing::FailingRewards;
pub use fixtures::*;

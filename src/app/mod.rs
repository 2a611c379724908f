//! Core application modules.
//!
//! # Module Organization
//!
//! - [`resource_groups`] - provider registries, caching, grouping and tree
//!   orchestration for cloud and workspace resource trees

pub mod resource_groups;

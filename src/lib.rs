//! Resource Tree - aggregation of plugin-contributed resources into tree views
//!
//! Plugins register resource listing providers (one set per resource domain)
//! and branch data providers (one per resource type). The crate merges what
//! they return into groupable, lazily loaded trees whose nodes keep stable ids
//! across refreshes, so selection, reveal and find-by-id keep working while
//! the underlying provider objects are recreated.
//!
//! # Architecture Overview
//!
//! - **Registries**: [`app::resource_groups::resource_providers`] and
//!   [`app::resource_groups::branch_providers`] hold runtime-registered
//!   providers, activate plugins lazily and isolate failing providers
//! - **Nodes**: [`app::resource_groups::wrapper`] adapts provider models to
//!   tree nodes; [`app::resource_groups::item_cache`] maps models to nodes
//! - **Grouping**: [`app::resource_groups::grouping`] partitions resource
//!   lists by resource group, type, location or tag
//! - **Orchestration**: [`app::resource_groups::tree_data_provider`] serves the
//!   host tree widget and translates change events
//!
//! # Getting Started
//!
//! [`app::resource_groups::ResourceGroupsHost`] wires everything for both
//! domains. The `resource-tree` binary shows a complete setup driven by a JSON
//! fixture.

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;

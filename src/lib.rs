//! Taskmill - maintenance task scheduling for sharded content stores.

pub mod config;
pub mod frequency;
pub mod local_queue;
pub mod morsel;
pub mod path_filter;
pub mod processor;
pub mod producer;
pub mod queue;
pub mod simulation;
pub mod state;
pub mod stats;
pub mod worker;
pub mod worker_pool;

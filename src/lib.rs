// Library crate exposing modules for the binary and integration tests

pub mod aggregator;
pub mod cloner;
pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod queue;
pub mod repository;
pub mod scanner;
pub mod scheduler;
pub mod sniff;
pub mod util;

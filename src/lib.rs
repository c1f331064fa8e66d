pub mod audit;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod orchestrator;
pub mod retention;
pub mod runner;
pub mod schedule;
pub mod supervisor;

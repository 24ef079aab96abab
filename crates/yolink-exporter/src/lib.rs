//! YoLink Prometheus exporter.
//!
//! Polls the YoLink cloud API for a fleet of temperature/humidity sensors
//! and republishes the latest readings as pull-based Prometheus metrics.

pub mod cli;
pub mod client;
pub mod config;
pub mod exporter;
pub mod server;

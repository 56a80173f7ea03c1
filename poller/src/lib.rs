//! Streams 24h tickers from cryptocurrency exchanges over websockets,
//! normalizes them into fixed-point quotes and hands them to a quote sink.

pub mod config;
pub mod error;
pub mod exchanges;
pub mod helpers;
pub mod model;
pub mod orchestrator;
pub mod reconnect;
pub mod repository;
pub mod sink;

//! The Great Work: an event-sourced orchestration engine for a persistent
//! narrative game. Commands mutate state through a SQLite store, every
//! mutation lands in an append-only event log, and a scheduled digest tick
//! drains the press and follow-up queues.

pub mod archive;
pub mod catalogs;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod expeditions;
pub mod models;
pub mod multi_press;
pub mod press;
pub mod rng;
pub mod scholars;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use config::Settings;
pub use error::{GameError, Result};
pub use service::GameService;

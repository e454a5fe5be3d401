pub mod config;
pub mod constants;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod intake;
pub mod job;
pub mod locks;
pub mod logging;
pub mod matching;
pub mod metrics;
pub mod record;
pub mod runner;
pub mod scheduler;
pub mod storage;
pub mod wire;

// Ports and their HTTP adapters
pub mod app;
pub mod infra;

// Case report model, identifier codec and merge rules
pub mod domain;

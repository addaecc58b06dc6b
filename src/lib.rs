pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod host;
pub mod notes;
pub mod oracle;
pub mod orchestrator;
pub mod policy;
pub mod segment;
pub mod telemetry;
pub mod tracker;
pub mod workflow;

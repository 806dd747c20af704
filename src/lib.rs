pub mod aws;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod tasks;
pub mod telemetry;
pub mod wait;

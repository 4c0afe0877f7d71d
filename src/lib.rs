//! chatrelay - stateless chat relay for hosted LLM providers
//!
//! Accepts a chat message over HTTP (or as a serverless event), forwards it to
//! OpenAI or Qwen/DashScope and returns the model's reply as JSON.

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod providers;
pub mod telemetry;

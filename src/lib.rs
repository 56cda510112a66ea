//! Chat backend with per-user answer memory and a lordship auction.

pub mod auction;
pub mod config;
pub mod database;
pub mod http_client;
pub mod llm_client;
pub mod memory;
pub mod responder;
pub mod runtime;
pub mod server;

//! mpgw-convert - port legacy DataPower services onto the Target framework
//!
//! This library reads a DataPower `export.xml` bundle, snapshots the existing
//! Target framework, asks a chat-completion model for the converted service,
//! and writes the returned files under safety checks.

#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::format_push_string)] // Performance improvement but stylistic

pub mod bundle;
pub mod cli;
pub mod client;
pub mod config;
pub mod framework;
pub mod logger;
pub mod prompt;
pub mod ui;
pub mod writer;

pub use bundle::{ExportBundle, parse_export_bundle};
pub use client::{ClientError, TachyonClient};
pub use config::RemoteConfig;
pub use prompt::{ChatMessage, build_prompt};
pub use writer::{FilePayload, WriteAction, WriteOptions, parse_llm_json, safe_write_files};

//! Task Result Bridge Library
//!
//! Webhook that copies the latest result of a task (files and text) into a
//! CRM entity field and reports back to the calling automation. This module
//! exports the components for testing and integration.

pub mod attachments;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod fields;
pub mod form;
pub mod logging;
pub mod remote;
pub mod request;
pub mod results;
pub mod server;
pub mod types;
pub mod writer;

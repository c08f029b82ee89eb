//! Layered configuration.
//!
//! Merges configuration field-by-field from four tiers:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/task-bridge/config.yaml`
//! 3. **User** - `~/.task-bridge/config.yaml`
//! 4. **Environment** - variables below
//!
//! ## Environment Variables
//! - `TASK_BRIDGE_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `TASK_BRIDGE_HOST` / `TASK_BRIDGE_PORT` - Listener address
//! - `TASK_BRIDGE_TIMEOUT_SECS` - Remote call timeout
//! - `TASK_BRIDGE_DIAGNOSTIC_LOG` - Diagnostic log file
//! - `TASK_BRIDGE_USER_DIR` / `TASK_BRIDGE_PROJECT_DIR` - Tier directories

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;

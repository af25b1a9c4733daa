//! Canonical file names and locations.
//!
//! ## Layout
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `~/.postwatch/` | Default home (state) |
//! | `<home>/posts.json` | Post store |
//! | `<home>/posts.json.lock` | Single-writer lock |
//! | `.postwatch/config.yaml` | Project config, discovered upward |

use std::path::{Path, PathBuf};

use anyhow::Result;

/// Directory holding the config file, and the default home name
pub const CONFIG_DIR: &str = ".postwatch";

pub const CONFIG_FILE: &str = "config.yaml";

pub const STORE_FILE: &str = "posts.json";

/// Get the postwatch home directory
pub fn home() -> Result<PathBuf> {
    Ok(crate::config::config()?.home.clone())
}

/// Get the post store path
pub fn store_path() -> Result<PathBuf> {
    Ok(crate::config::config()?.store_path.clone())
}

/// Default home under the user's home directory
pub fn default_home(user_home: &Path) -> PathBuf {
    user_home.join(CONFIG_DIR)
}

/// Config file location inside a directory
pub fn config_file_in(dir: &Path) -> PathBuf {
    dir.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Lock file guarding a store file
pub fn lock_file_for(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

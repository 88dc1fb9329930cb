//! Plant Configuration Module
//!
//! Provides operator-tunable configuration loaded from TOML files, backing
//! every constant named in the component design and the option table.
//!
//! ## Loading Order
//!
//! 1. `INTELLIMAINT_CONFIG` environment variable (path to TOML file)
//! 2. `plant_config.toml` in the current working directory
//! 3. Built-in defaults (matching `config::defaults`)
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(PlantConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().health_assessment.weights.deviation;
//! ```
//!
//! Subsystems that need to react to on-disk edits (alarm rules, tag
//! importance, collection rules) hold onto the `Arc<PlantConfig>` returned by
//! `get()` for the duration of one evaluation pass, then re-fetch it on the
//! next pass — the underlying `ArcSwap` is swapped atomically by the file
//! watcher, so readers never block a writer and never observe a torn config.

mod plant_config;
pub mod defaults;
pub mod watcher;

pub use plant_config::*;

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

/// Global plant configuration, initialized once at startup.
static PLANT_CONFIG: OnceLock<ArcSwap<PlantConfig>> = OnceLock::new();

/// Initialize the global plant configuration.
///
/// Must be called exactly once before any calls to `get()`. A second call is
/// ignored with a warning rather than a panic, since tests in the same
/// process may re-enter `init`.
pub fn init(config: PlantConfig) {
    if PLANT_CONFIG.set(ArcSwap::from_pointee(config)).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get the current plant configuration snapshot.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> Arc<PlantConfig> {
    PLANT_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
        .load_full()
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    PLANT_CONFIG.get().is_some()
}

/// A single leaf-level configuration change detected between two loads,
/// identified by its dotted TOML key path.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

/// Errors raised while reloading the plant config from disk.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("config not initialized")]
    NotInitialized,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reload the plant config from the same search path the initial `load()`
/// used, swap it into the global snapshot, and return the set of leaf keys
/// whose values changed. Called by the file watcher on detected edits; on
/// error the previous config remains active — callers should log and
/// continue, never panic, since a malformed edit on disk must not take the
/// plant down.
pub fn reload() -> Result<Vec<ConfigChange>, ReloadError> {
    let slot = PLANT_CONFIG.get().ok_or(ReloadError::NotInitialized)?;

    let path = std::env::var("INTELLIMAINT_CONFIG").unwrap_or_else(|_| "plant_config.toml".to_string());
    let text = std::fs::read_to_string(&path)?;
    let new_config: PlantConfig = toml::from_str(&text)?;

    let old_config = slot.load_full();
    let changes = diff_configs(&old_config, &new_config);
    slot.store(Arc::new(new_config));
    Ok(changes)
}

/// Diff two configs by round-tripping both through `toml::Value` and walking
/// leaf keys. Used only to produce a human-readable change list for logging;
/// never consulted for correctness — the swapped `ArcSwap` is authoritative.
fn diff_configs(old: &PlantConfig, new: &PlantConfig) -> Vec<ConfigChange> {
    let old_val = toml::Value::try_from(old).unwrap_or(toml::Value::Table(Default::default()));
    let new_val = toml::Value::try_from(new).unwrap_or(toml::Value::Table(Default::default()));
    let mut changes = Vec::new();
    diff_values("", &old_val, &new_val, &mut changes);
    changes
}

fn diff_values(prefix: &str, old: &toml::Value, new: &toml::Value, out: &mut Vec<ConfigChange>) {
    match (old, new) {
        (toml::Value::Table(o), toml::Value::Table(n)) => {
            let mut keys: std::collections::BTreeSet<&String> = o.keys().collect();
            keys.extend(n.keys());
            for key in keys {
                let child_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (o.get(key), n.get(key)) {
                    (Some(ov), Some(nv)) => diff_values(&child_prefix, ov, nv, out),
                    (None, Some(nv)) => out.push(ConfigChange {
                        key: child_prefix,
                        old_value: "<unset>".to_string(),
                        new_value: nv.to_string(),
                    }),
                    (Some(ov), None) => out.push(ConfigChange {
                        key: child_prefix,
                        old_value: ov.to_string(),
                        new_value: "<unset>".to_string(),
                    }),
                    (None, None) => {}
                }
            }
        }
        (o, n) => {
            if o != n {
                out.push(ConfigChange {
                    key: prefix.to_string(),
                    old_value: o.to_string(),
                    new_value: n.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_detects_changed_leaf() {
        let mut old = PlantConfig::default();
        let mut new = old.clone();
        new.processing.default_deadband = 0.5;
        let changes = diff_configs(&old, &new);
        assert!(changes.iter().any(|c| c.key == "processing.default_deadband"));

        old.processing.default_deadband = 0.5;
        assert!(diff_configs(&old, &old).is_empty());
    }
}

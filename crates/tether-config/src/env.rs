//! Environment variable fallbacks.
//!
//! Env vars are a fallback, not an override: a mapping is applied only when
//! the config file did not set the field.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TETHER_PLUGINS_PATH",
        field_path: "paths.plugins",
    },
    EnvMapping {
        var_name: "TETHER_BUNDLED_PLUGINS_PATH",
        field_path: "paths.bundled_plugins",
    },
    EnvMapping {
        var_name: "TETHER_STATIC_ROOT",
        field_path: "paths.static_root",
    },
    EnvMapping {
        var_name: "TETHER_PLUGIN_REPO_URL",
        field_path: "plugins.repo_url",
    },
];

/// Apply every mapped variable whose field is absent from `file_layer`.
///
/// Returns the number of fields set.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    file_layer: Option<&toml::Value>,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if file_layer.is_some_and(|layer| has_field(layer, mapping.field_path)) {
            continue;
        }
        let Some(val) = env_vars.get(mapping.var_name) else {
            continue;
        };
        if val.is_empty() {
            continue;
        }

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, toml::Value::String(val.clone()));
        count = count.saturating_add(1);
    }

    count
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn has_field(root: &toml::Value, path: &str) -> bool {
    let mut current = root;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let Some((parents, leaf)) = path.rsplit_once('.') else {
        if let Some(table) = root.as_table_mut() {
            table.insert(path.to_owned(), value);
        }
        return;
    };

    let mut current = root;
    for segment in parents.split('.') {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

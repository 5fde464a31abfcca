// src/config/merge.rs

//! Merge every discovered configuration document into one view.
//!
//! Documents are applied in lexicographic order of their canonical path,
//! compared case-insensitively. Variables use a *shallow* overwrite: a key
//! defined by a later document replaces the earlier value wholesale, nested
//! mappings included.

use std::sync::Arc;

use tracing::debug;

use crate::config::loader::load_document;
use crate::config::model::{ConfigLocation, MergedConfig, ScopedSpec, VariableEnvironment};
use crate::diagnostics::Diagnostics;
use crate::fs::FileSystem;
use crate::paths::CanonicalPath;

/// Sort config locations into merge order.
pub fn sort_locations(locations: &mut [ConfigLocation]) {
    locations.sort_by_cached_key(|loc| {
        CanonicalPath::new(&loc.path).as_str().to_lowercase()
    });
}

/// Shallow-merge `later` into `merged`: every key of `later` replaces the
/// existing value outright.
pub fn merge_vars(merged: &mut VariableEnvironment, later: VariableEnvironment) {
    for (key, value) in later {
        merged.insert(key, value);
    }
}

/// Load, parse and merge `locations`. Documents that fail to parse are
/// reported and skipped; they never abort the merge.
pub fn merge_configs(
    fs: &dyn FileSystem,
    mut locations: Vec<ConfigLocation>,
    diagnostics: &Diagnostics,
) -> MergedConfig {
    sort_locations(&mut locations);

    let mut merged = MergedConfig::default();
    for location in locations {
        let parsed = match load_document(fs, &location.path) {
            Ok(parsed) => parsed,
            Err(err) => {
                diagnostics.report(&err);
                merged.failed += 1;
                continue;
            }
        };

        for err in &parsed.dropped {
            diagnostics.report(err);
        }

        debug!(
            path = ?location.path,
            vars = parsed.document.vars.len(),
            transforms = parsed.document.transforms.len(),
            "merged config document"
        );

        merge_vars(&mut merged.vars, parsed.document.vars);

        let origin = Arc::new(location);
        for spec in parsed.document.transforms {
            let scoped = ScopedSpec {
                spec,
                origin: Arc::clone(&origin),
            };
            if scoped.spec.is_directory() {
                merged.directory_specs.push(scoped);
            } else {
                merged.file_specs.push(scoped);
            }
        }
        merged.loaded += 1;
    }
    merged
}

//! Installed-application catalog.
//!
//! The catalog feeds the open-app module: the planner names an app in
//! natural language and the dispatcher resolves it against these labels.
//! A deployment-specific catalog can be loaded from a JSON file of
//! `{"package.id": {"label": "Name"}}` entries; otherwise a default set of
//! stock applications is used.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::ConfigError;
use crate::device::InstalledApp;

/// Stock applications present on most devices.
pub static DEFAULT_APP_CATALOG: Lazy<Vec<InstalledApp>> = Lazy::new(|| {
    [
        ("Settings", "com.android.settings"),
        ("Google Chrome", "com.android.chrome"),
        ("Gmail", "com.google.android.gm"),
        ("Google Maps", "com.google.android.apps.maps"),
        ("YouTube", "com.google.android.youtube"),
        ("Google Play Store", "com.android.vending"),
        ("Camera", "com.android.camera2"),
        ("Photos", "com.google.android.apps.photos"),
        ("Clock", "com.google.android.deskclock"),
        ("Calendar", "com.google.android.calendar"),
        ("Contacts", "com.google.android.contacts"),
        ("Phone", "com.google.android.dialer"),
        ("Messages", "com.google.android.apps.messaging"),
        ("Files", "com.google.android.apps.nbu.files"),
        ("Calculator", "com.google.android.calculator"),
    ]
    .into_iter()
    .map(|(label, id)| InstalledApp {
        label: label.to_string(),
        id: id.to_string(),
    })
    .collect()
});

#[derive(Debug, Deserialize)]
struct AppEntry {
    label: String,
}

/// Load a catalog from a JSON file, sorted by label for stable resolution.
pub fn load_app_catalog(path: &Path) -> Result<Vec<InstalledApp>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let entries: BTreeMap<String, AppEntry> =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid(format!(
            "app catalog {}: {e}",
            path.display()
        )))?;
    Ok(entries
        .into_iter()
        .map(|(id, entry)| InstalledApp {
            label: entry.label,
            id,
        })
        .collect())
}

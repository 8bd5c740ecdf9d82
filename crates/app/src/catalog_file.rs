use std::{fs, io, path::Path};

use fonthost_core::Catalog;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse catalog file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the JSON catalog backing autocomplete and the hosting caches.
///
/// A missing file yields an empty catalog when `allow_missing` is set.
pub fn load_catalog(path: &Path, allow_missing: bool) -> Result<Catalog, CatalogLoadError> {
    let path_display = path.display().to_string();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if allow_missing && err.kind() == io::ErrorKind::NotFound => {
            warn!(stage = "catalog", path = %path_display, "catalog file not found, starting empty");
            return Ok(Catalog::default());
        }
        Err(source) => {
            return Err(CatalogLoadError::Read {
                path: path_display,
                source,
            })
        }
    };

    let catalog: Catalog = serde_json::from_str(&raw).map_err(|source| CatalogLoadError::Parse {
        path: path_display.clone(),
        source,
    })?;
    info!(
        stage = "catalog",
        path = %path_display,
        families = catalog.user.library.len(),
        team_members = catalog.sub_users.len(),
        templates = catalog.templates.len(),
        presets = catalog.presets.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

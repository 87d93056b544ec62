//! Filesystem panorama catalog
//!
//! ```text
//! panoramas/
//!   canyon/
//!     config.json   display settings (+ any extra keys)
//!     image.png     equirectangular colour image
//!     depth.png     optional depth map
//! ```

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::CatalogError;
use crate::panorama::{DisplaySettings, PanoramaMetadata};

const CONFIG_FILE: &str = "config.json";
const IMAGE_FILE: &str = "image.png";
const DEPTH_FILE: &str = "depth.png";

/// Panorama store rooted at one directory
#[derive(Debug, Clone)]
pub struct PanoramaCatalog {
    root: PathBuf,
}

impl PanoramaCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir().unwrap_or_default().join(root)
        };

        if !root.exists() {
            tracing::warn!("Panorama directory does not exist: {}", root.display());
        }

        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sorted ids of every directory holding a config or an image
    pub fn list(&self) -> Result<Vec<String>, CatalogError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_id(&id).is_err() {
                continue;
            }
            let path = entry.path();
            if path.join(CONFIG_FILE).is_file() || path.join(IMAGE_FILE).is_file() {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Metadata record with `id` and file URLs filled in
    pub fn metadata(&self, id: &str) -> Result<PanoramaMetadata, CatalogError> {
        let dir = self.dir(id)?;
        let raw = read_config(id, &dir)?;

        let mut metadata: PanoramaMetadata =
            serde_json::from_value(Value::Object(raw)).map_err(|e| CatalogError::MalformedConfig {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        metadata.id = id.to_string();
        if metadata.image_url.is_none() && dir.join(IMAGE_FILE).is_file() {
            metadata.image_url = Some(format!("/panoramas/{}/{}", id, IMAGE_FILE));
        }
        if metadata.depth_url.is_none() && dir.join(DEPTH_FILE).is_file() {
            metadata.depth_url = Some(format!("/panoramas/{}/{}", id, DEPTH_FILE));
        }

        Ok(metadata)
    }

    /// Merge display settings into `config.json`, keeping every other key
    pub fn update(&self, id: &str, settings: &DisplaySettings) -> Result<PanoramaMetadata, CatalogError> {
        let dir = self.dir(id)?;
        let mut raw = read_config(id, &dir)?;

        raw.insert("sphereSize".to_string(), Value::from(settings.sphere_size));
        raw.insert("depthScale".to_string(), Value::from(settings.depth_scale));
        raw.insert("meshResolution".to_string(), Value::from(settings.mesh_resolution));

        let contents = serde_json::to_string_pretty(&Value::Object(raw)).map_err(|e| {
            CatalogError::MalformedConfig {
                id: id.to_string(),
                message: e.to_string(),
            }
        })?;

        let tmp = dir.join(format!("{}.tmp", CONFIG_FILE));
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, dir.join(CONFIG_FILE))?;

        tracing::info!("Config updated for {}: {:?}", id, settings);
        self.metadata(id)
    }

    fn dir(&self, id: &str) -> Result<PathBuf, CatalogError> {
        validate_id(id)?;
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        Ok(dir)
    }
}

/// Ids are single path components
pub fn validate_id(id: &str) -> Result<(), CatalogError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.trim() != id;
    if bad {
        return Err(CatalogError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn read_config(id: &str, dir: &Path) -> Result<Map<String, Value>, CatalogError> {
    let path = dir.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(Map::new());
    }

    let contents = std::fs::read_to_string(&path)?;
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CatalogError::MalformedConfig {
            id: id.to_string(),
            message: "config.json is not an object".to_string(),
        }),
        Err(e) => Err(CatalogError::MalformedConfig {
            id: id.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn catalog() -> (TempDir, PanoramaCatalog) {
        let dir = TempDir::new().unwrap();

        let canyon = dir.path().join("canyon");
        fs::create_dir(&canyon).unwrap();
        fs::write(
            canyon.join(CONFIG_FILE),
            r#"{"sphereSize": 10, "depthScale": -4, "meshResolution": 512, "name": "Canyon", "seed": 42}"#,
        )
        .unwrap();
        fs::write(canyon.join(IMAGE_FILE), b"png").unwrap();
        fs::write(canyon.join(DEPTH_FILE), b"png").unwrap();

        let beach = dir.path().join("beach");
        fs::create_dir(&beach).unwrap();
        fs::write(beach.join(IMAGE_FILE), b"png").unwrap();

        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("stray.txt"), b"x").unwrap();

        let catalog = PanoramaCatalog::new(dir.path());
        (dir, catalog)
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let (_dir, catalog) = catalog();
        assert_eq!(catalog.list().unwrap(), vec!["beach", "canyon"]);
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = PanoramaCatalog::new(dir.path().join("nope"));
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_fills_urls() {
        let (_dir, catalog) = catalog();
        let meta = catalog.metadata("canyon").unwrap();
        assert_eq!(meta.id, "canyon");
        assert_eq!(meta.sphere_size, Some(10.0));
        assert_eq!(meta.depth_scale, Some(-4.0));
        assert_eq!(meta.image_url.as_deref(), Some("/panoramas/canyon/image.png"));
        assert_eq!(meta.depth_url.as_deref(), Some("/panoramas/canyon/depth.png"));
    }

    #[test]
    fn test_metadata_without_config() {
        let (_dir, catalog) = catalog();
        let meta = catalog.metadata("beach").unwrap();
        assert_eq!(meta.sphere_size, None);
        assert_eq!(meta.image_url.as_deref(), Some("/panoramas/beach/image.png"));
        assert_eq!(meta.depth_url, None);
    }

    #[test]
    fn test_update_preserves_unknown_keys() {
        let (dir, catalog) = catalog();
        let settings = DisplaySettings {
            sphere_size: 7.5,
            depth_scale: 2.0,
            mesh_resolution: 1024,
        };
        let meta = catalog.update("canyon", &settings).unwrap();
        assert_eq!(meta.sphere_size, Some(7.5));
        assert_eq!(meta.mesh_resolution, Some(1024));

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("canyon").join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["seed"], 42);
        assert_eq!(raw["name"], "Canyon");
        assert_eq!(raw["depthScale"], 2.0);
    }

    #[test]
    fn test_update_creates_config() {
        let (dir, catalog) = catalog();
        let settings = DisplaySettings {
            sphere_size: 6.0,
            depth_scale: 4.0,
            mesh_resolution: 256,
        };
        catalog.update("beach", &settings).unwrap();
        assert!(dir.path().join("beach").join(CONFIG_FILE).is_file());
        assert_eq!(catalog.metadata("beach").unwrap().depth_scale, Some(4.0));
    }

    #[test]
    fn test_rejects_bad_ids() {
        let (_dir, catalog) = catalog();
        for id in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(matches!(catalog.metadata(id), Err(CatalogError::InvalidId(_))), "{id}");
        }
        assert!(matches!(catalog.metadata("nope"), Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_malformed_config() {
        let (dir, catalog) = catalog();
        fs::write(dir.path().join("beach").join(CONFIG_FILE), "[1, 2]").unwrap();
        assert!(matches!(
            catalog.metadata("beach"),
            Err(CatalogError::MalformedConfig { .. })
        ));
    }
}

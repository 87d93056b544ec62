//! Panorama metadata as served by the remote API

use serde::{Deserialize, Serialize};

/// Remote panorama record, immutable per fetch.
///
/// Every display field is optional on the wire; defaults are applied in one
/// place, [`crate::panorama::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanoramaMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(
        default,
        rename = "imageURL",
        alias = "imageUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,
    #[serde(
        default,
        rename = "depthURL",
        alias = "depthUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub depth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_resolution: Option<u32>,
    /// Signed; the sign picks the displacement direction and is forwarded
    /// to the material verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PanoramaMetadata {
    /// Copy with the display fields replaced by edited settings
    pub fn with_settings(&self, settings: &DisplaySettings) -> Self {
        Self {
            sphere_size: Some(settings.sphere_size),
            mesh_resolution: Some(settings.mesh_resolution),
            depth_scale: Some(settings.depth_scale),
            ..self.clone()
        }
    }
}

/// The three user-editable display parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub sphere_size: f32,
    pub depth_scale: f32,
    pub mesh_resolution: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_json() {
        let json = r#"{
            "sphereSize": 6,
            "meshResolution": 512,
            "depthScale": -4,
            "imageURL": "/panoramas/p1/image.png",
            "name": "Canyon"
        }"#;
        let meta: PanoramaMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.sphere_size, Some(6.0));
        assert_eq!(meta.mesh_resolution, Some(512));
        assert_eq!(meta.depth_scale, Some(-4.0));
        assert_eq!(meta.image_url.as_deref(), Some("/panoramas/p1/image.png"));
        assert!(meta.depth_url.is_none());
        assert_eq!(meta.name.as_deref(), Some("Canyon"));
    }

    #[test]
    fn test_empty_record_parses() {
        let meta: PanoramaMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta, PanoramaMetadata::default());
    }

    #[test]
    fn test_with_settings_keeps_sources() {
        let meta = PanoramaMetadata {
            id: "p1".into(),
            image_url: Some("a.png".into()),
            ..Default::default()
        };
        let edited = meta.with_settings(&DisplaySettings {
            sphere_size: 10.0,
            depth_scale: 2.5,
            mesh_resolution: 512,
        });
        assert_eq!(edited.image_url.as_deref(), Some("a.png"));
        assert_eq!(edited.sphere_size, Some(10.0));
        assert_eq!(edited.mesh_resolution, Some(512));
        assert_eq!(edited.depth_scale, Some(2.5));
    }

    #[test]
    fn test_settings_wire_format() {
        let settings = DisplaySettings {
            sphere_size: 6.0,
            depth_scale: -4.0,
            mesh_resolution: 256,
        };
        let value = serde_json::to_value(settings).unwrap();
        assert_eq!(value["sphereSize"], 6.0);
        assert_eq!(value["depthScale"], -4.0);
        assert_eq!(value["meshResolution"], 256);
    }
}

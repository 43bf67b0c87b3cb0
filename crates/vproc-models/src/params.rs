//! Operation-specific processing parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Optional settings for a transformation.
///
/// One open structure shared by all operation types; fields an operation
/// doesn't use are simply absent. Defaults (e.g. crop offsets, the quality
/// preset) are applied by the command builder, never here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct ProcessingParams {
    /// Output container extension (e.g. "mp4", "mov")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Encoder quality profile (e.g. "fast", "slow")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,

    /// Target video bitrate in kilobits per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,

    /// Target resolution as "WIDTH:HEIGHT" (e.g. "1280:720")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Crop rectangle width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_width: Option<u32>,

    /// Crop rectangle height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_height: Option<u32>,

    /// Crop X offset; the builder treats absence as 0 when a crop is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_x: Option<u32>,

    /// Crop Y offset; the builder treats absence as 0 when a crop is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_y: Option<u32>,

    /// Trim window start in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,

    /// Trim window end in seconds; must be greater than `start_time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,

    /// Text to render as a watermark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_text: Option<String>,

    /// Blob reference of an image to overlay as a watermark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_image: Option<String>,
}

impl ProcessingParams {
    /// Whether a crop rectangle is fully specified.
    pub fn has_crop(&self) -> bool {
        self.crop_width.is_some() && self.crop_height.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let params = ProcessingParams {
            resolution: Some("1280:720".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(json, r#"{"resolution":"1280:720"}"#);
    }

    #[test]
    fn test_has_crop_requires_both_dimensions() {
        let mut params = ProcessingParams {
            crop_width: Some(640),
            ..Default::default()
        };
        assert!(!params.has_crop());

        params.crop_height = Some(360);
        assert!(params.has_crop());
    }
}

//! JPEG quality resolution
//!
//! Quality is either a flat value or a map whose keys are thumbnail suffixes
//! or surface boundaries (`"<2000"`, `">=2000"`) compared against
//! `width * height`:
//!
//! ```yaml
//! jpeg_quality:
//!   thumb: 60
//!   "<2000": 90
//!   ">=2000": 75
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{AttachmentRecord, ImageDimensions};
use crate::thumbnails::OrderedMap;

static SURFACE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(<|>=)(\d+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JpegQuality {
    Flat(i64),
    Map(OrderedMap<i64>),
}

fn in_range(quality: i64) -> bool {
    (0..=100).contains(&quality)
}

fn surface_matches(key: &str, surface: u64) -> bool {
    let caps = match SURFACE_BOUNDARY.captures(key) {
        Some(caps) => caps,
        None => return false,
    };
    let threshold: u64 = match caps[2].parse() {
        Ok(t) => t,
        Err(_) => return false,
    };
    match &caps[1] {
        "<" => surface < threshold,
        _ => surface >= threshold,
    }
}

/// Pick the JPEG quality for `record`.
///
/// With `strict`, values outside `0..=100` are discarded.
pub fn resolve_quality(config: &JpegQuality, record: &AttachmentRecord, strict: bool) -> Option<i64> {
    let quality = match config {
        JpegQuality::Flat(q) => Some(*q),
        JpegQuality::Map(map) => {
            let by_suffix = record
                .thumbnail
                .as_deref()
                .and_then(|suffix| map.get(suffix).copied())
                .filter(|q| !strict || in_range(*q));

            let surface = ImageDimensions {
                width: record.width.unwrap_or(1),
                height: record.height.unwrap_or(1),
            }
            .surface();
            let by_surface = map
                .iter()
                .find(|(key, _)| surface_matches(key, surface))
                .map(|(_, q)| *q);

            by_suffix.or(by_surface)
        }
    };

    quality.filter(|q| !strict || in_range(*q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32, thumbnail: Option<&str>) -> AttachmentRecord {
        let mut record = AttachmentRecord::new();
        record.width = Some(width);
        record.height = Some(height);
        record.thumbnail = thumbnail.map(String::from);
        record
    }

    fn surface_config() -> JpegQuality {
        JpegQuality::Map(OrderedMap::new().insert("<2000", 90).insert(">=2000", 75))
    }

    #[test]
    fn test_flat_value() {
        let record = image(10, 10, None);
        assert_eq!(resolve_quality(&JpegQuality::Flat(80), &record, true), Some(80));
        assert_eq!(resolve_quality(&JpegQuality::Flat(120), &record, true), None);
        assert_eq!(resolve_quality(&JpegQuality::Flat(120), &record, false), Some(120));
    }

    #[test]
    fn test_surface_boundaries() {
        let config = surface_config();
        assert_eq!(resolve_quality(&config, &image(40, 40, None), true), Some(90));
        assert_eq!(resolve_quality(&config, &image(100, 100, None), true), Some(75));
    }

    #[test]
    fn test_missing_dimensions_default_to_one_pixel() {
        let config = surface_config();
        assert_eq!(resolve_quality(&config, &AttachmentRecord::new(), true), Some(90));
    }

    #[test]
    fn test_suffix_wins_over_surface() {
        let config = JpegQuality::Map(
            OrderedMap::new()
                .insert("thumb", 40)
                .insert("<2000", 90)
                .insert("huge", 500),
        );
        assert_eq!(resolve_quality(&config, &image(10, 10, Some("thumb")), true), Some(40));
        assert_eq!(resolve_quality(&config, &image(10, 10, Some("other")), true), Some(90));
        // out of range suffix value falls back to the surface rule
        assert_eq!(resolve_quality(&config, &image(10, 10, Some("huge")), true), Some(90));
        assert_eq!(resolve_quality(&config, &image(10, 10, Some("huge")), false), Some(500));
    }

    #[test]
    fn test_no_match_is_none() {
        let config = JpegQuality::Map(OrderedMap::new().insert(">=5000", 70));
        assert_eq!(resolve_quality(&config, &image(10, 10, None), true), None);
    }

    #[test]
    fn test_deserialize() {
        let flat: JpegQuality = serde_yaml::from_str("85").unwrap();
        assert_eq!(flat, JpegQuality::Flat(85));

        let map: JpegQuality = serde_yaml::from_str("'<2000': 90\n'>=2000': 75\n").unwrap();
        assert_eq!(map, surface_config());
    }
}

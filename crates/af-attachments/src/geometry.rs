//! Resize specifications and geometry strings
//!
//! A size is either a `[width, height]` pair (resized to exactly that box) or
//! a geometry string:
//!
//! | string      | meaning                                   |
//! |-------------|-------------------------------------------|
//! | `50x50`     | fit inside 50x50, keep aspect ratio       |
//! | `100`       | width 100, height proportional            |
//! | `x50`       | height 50, width proportional             |
//! | `50x50!`    | exactly 50x50                             |
//! | `50x50>`    | only shrink if larger                     |
//! | `50x50<`    | only enlarge if smaller                   |
//! | `50%`       | scale to a percentage                     |
//! | `c100x100`  | scale to cover then crop to 100x100       |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

static GEOMETRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(c)?(\d+)?(?:x(\d+))?([!<>%]?)$").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid geometry: {0}")]
    Invalid(String),
}

/// A configured size, as written in thumbnail or `resize_to` options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResizeSpec {
    Dimensions(u32, u32),
    Geometry(String),
}

impl ResizeSpec {
    pub fn geometry(&self) -> Result<Geometry, GeometryError> {
        match self {
            ResizeSpec::Dimensions(w, h) => {
                if *w == 0 || *h == 0 {
                    return Err(GeometryError::Invalid(format!("{}x{}", w, h)));
                }
                Ok(Geometry {
                    width: Some(*w),
                    height: Some(*h),
                    modifier: Modifier::Exact,
                    crop: false,
                })
            }
            ResizeSpec::Geometry(s) => s.parse(),
        }
    }
}

impl fmt::Display for ResizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeSpec::Dimensions(w, h) => write!(f, "[{}, {}]", w, h),
            ResizeSpec::Geometry(s) => write!(f, "{}", s),
        }
    }
}

impl From<(u32, u32)> for ResizeSpec {
    fn from((w, h): (u32, u32)) -> Self {
        ResizeSpec::Dimensions(w, h)
    }
}

impl From<&str> for ResizeSpec {
    fn from(s: &str) -> Self {
        ResizeSpec::Geometry(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Fit,
    Exact,
    ShrinkOnly,
    EnlargeOnly,
    Percent,
}

/// Parsed geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub modifier: Modifier,
    pub crop: bool,
}

/// Concrete output of a geometry applied to a source size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    /// Cover the box and crop the overflow instead of scaling into it
    pub crop: bool,
}

impl std::str::FromStr for Geometry {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = GEOMETRY
            .captures(trimmed)
            .ok_or_else(|| GeometryError::Invalid(s.to_string()))?;

        let parse = |idx: usize| -> Result<Option<u32>, GeometryError> {
            caps.get(idx)
                .map(|m| {
                    m.as_str()
                        .parse::<u32>()
                        .map_err(|_| GeometryError::Invalid(s.to_string()))
                })
                .transpose()
        };

        let crop = caps.get(1).is_some();
        let width = parse(2)?;
        let height = parse(3)?;
        let modifier = match caps.get(4).map(|m| m.as_str()) {
            Some("!") => Modifier::Exact,
            Some(">") => Modifier::ShrinkOnly,
            Some("<") => Modifier::EnlargeOnly,
            Some("%") => Modifier::Percent,
            _ => Modifier::Fit,
        };

        if width.is_none() && height.is_none() {
            return Err(GeometryError::Invalid(s.to_string()));
        }
        if width == Some(0) || height == Some(0) {
            return Err(GeometryError::Invalid(s.to_string()));
        }
        if crop && (width.is_none() || height.is_none() || modifier != Modifier::Fit) {
            return Err(GeometryError::Invalid(s.to_string()));
        }

        Ok(Geometry {
            width,
            height,
            modifier,
            crop,
        })
    }
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

impl Geometry {
    /// Compute the output size for a `src_w` x `src_h` image.
    ///
    /// Returns `None` when the image should be left as is.
    pub fn plan(&self, src_w: u32, src_h: u32) -> Option<ResizePlan> {
        if src_w == 0 || src_h == 0 {
            return None;
        }

        if self.crop {
            let (w, h) = (self.width?, self.height?);
            return Some(ResizePlan {
                width: w,
                height: h,
                crop: true,
            });
        }

        if self.modifier == Modifier::Percent {
            let pw = self.width.or(self.height)? as f64 / 100.0;
            let ph = self.height.or(self.width)? as f64 / 100.0;
            return Some(ResizePlan {
                width: scaled(src_w, pw),
                height: scaled(src_h, ph),
                crop: false,
            });
        }

        let larger = self.width.map_or(false, |w| src_w > w) || self.height.map_or(false, |h| src_h > h);
        match self.modifier {
            Modifier::ShrinkOnly if !larger => return None,
            Modifier::EnlargeOnly if larger => return None,
            _ => {}
        }

        let (w, h) = match (self.width, self.height) {
            (Some(w), Some(h)) if self.modifier == Modifier::Exact => (w, h),
            (Some(w), Some(h)) => {
                let factor = (w as f64 / src_w as f64).min(h as f64 / src_h as f64);
                (scaled(src_w, factor), scaled(src_h, factor))
            }
            (Some(w), None) => (w, scaled(src_h, w as f64 / src_w as f64)),
            (None, Some(h)) => (scaled(src_w, h as f64 / src_h as f64), h),
            (None, None) => return None,
        };

        Some(ResizePlan {
            width: w,
            height: h,
            crop: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(s: &str) -> Geometry {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(geometry("50x40").width, Some(50));
        assert_eq!(geometry("50x40").height, Some(40));
        assert_eq!(geometry("x50").width, None);
        assert_eq!(geometry("100").height, None);
        assert_eq!(geometry("50x50!").modifier, Modifier::Exact);
        assert_eq!(geometry("50x50>").modifier, Modifier::ShrinkOnly);
        assert_eq!(geometry("50x50<").modifier, Modifier::EnlargeOnly);
        assert!(geometry("c100x100").crop);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "x", "axb", "0x10", "c100", "c10x10!", "10x10x10"] {
            assert!(bad.parse::<Geometry>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_fit_keeps_aspect_ratio() {
        let plan = geometry("50x50").plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height), (50, 25));
        assert!(!plan.crop);

        let plan = geometry("x50").plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height), (100, 50));

        let plan = geometry("40").plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height), (40, 20));
    }

    #[test]
    fn test_shrink_and_enlarge_only() {
        assert_eq!(geometry("500x500>").plan(200, 100), None);
        assert!(geometry("50x50>").plan(200, 100).is_some());
        assert_eq!(geometry("50x50<").plan(200, 100), None);
        assert!(geometry("500x500<").plan(200, 100).is_some());
    }

    #[test]
    fn test_percent_and_crop() {
        let plan = geometry("50%").plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height), (100, 50));

        let plan = geometry("c30x30").plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height, plan.crop), (30, 30, true));
    }

    #[test]
    fn test_dimensions_are_exact() {
        let spec = ResizeSpec::from((50, 50));
        let plan = spec.geometry().unwrap().plan(200, 100).unwrap();
        assert_eq!((plan.width, plan.height), (50, 50));
        assert!(ResizeSpec::Dimensions(0, 10).geometry().is_err());
    }

    #[test]
    fn test_deserialize_untagged() {
        let dims: ResizeSpec = serde_json::from_str("[64, 32]").unwrap();
        assert_eq!(dims, ResizeSpec::Dimensions(64, 32));

        let geo: ResizeSpec = serde_json::from_str("\"x50\"").unwrap();
        assert_eq!(geo, ResizeSpec::Geometry("x50".to_string()));
    }
}

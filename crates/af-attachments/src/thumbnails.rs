//! Thumbnail configuration and resolution
//!
//! A thumbnail map is an ordered list of `suffix => size spec` entries. A size
//! spec is one of:
//!
//! - a plain size (`[50, 50]`, `"x50"`): always produced;
//! - an accessor (`":avatar_size"`): produced only when the record's owner
//!   type matches the suffix and the accessor yields a size for the record;
//! - a nested map: when the owner type matches the suffix, every inner
//!   `suffix => size` pair is produced.
//!
//! ```yaml
//! thumbnails:
//!   thumb: [50, 50]
//!   geometry: "x50"
//!   profile:
//!     avatar: [64, 64]
//!   posts: ":post_size"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::geometry::ResizeSpec;
use crate::model::AttachmentRecord;

/// A string map that keeps declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        OrderedMap(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, key: impl Into<String>, value: V) -> Self {
        self.0.push((key.into(), value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of thumbnail suffixes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// One configured thumbnail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSizeSpec", into = "RawSizeSpec")]
pub enum SizeSpec {
    Size(ResizeSpec),
    Accessor(String),
    Nested(OrderedMap<ResizeSpec>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSizeSpec {
    Dimensions(u32, u32),
    /// A bare number means a square
    Square(u32),
    Text(String),
    Nested(OrderedMap<ResizeSpec>),
}

impl From<RawSizeSpec> for SizeSpec {
    fn from(raw: RawSizeSpec) -> Self {
        match raw {
            RawSizeSpec::Dimensions(w, h) => SizeSpec::Size(ResizeSpec::Dimensions(w, h)),
            RawSizeSpec::Square(n) => SizeSpec::Size(ResizeSpec::Dimensions(n, n)),
            RawSizeSpec::Text(s) => match s.strip_prefix(':') {
                Some(name) => SizeSpec::Accessor(name.to_string()),
                None => SizeSpec::Size(ResizeSpec::Geometry(s)),
            },
            RawSizeSpec::Nested(map) => SizeSpec::Nested(map),
        }
    }
}

impl From<SizeSpec> for RawSizeSpec {
    fn from(spec: SizeSpec) -> Self {
        match spec {
            SizeSpec::Size(ResizeSpec::Dimensions(w, h)) => RawSizeSpec::Dimensions(w, h),
            SizeSpec::Size(ResizeSpec::Geometry(s)) => RawSizeSpec::Text(s),
            SizeSpec::Accessor(name) => RawSizeSpec::Text(format!(":{}", name)),
            SizeSpec::Nested(map) => RawSizeSpec::Nested(map),
        }
    }
}

impl From<ResizeSpec> for SizeSpec {
    fn from(size: ResizeSpec) -> Self {
        SizeSpec::Size(size)
    }
}

/// Thumbnails configured for one attachment-bearing type
pub type ThumbnailConfig = OrderedMap<SizeSpec>;

/// Computes a size for a record
pub type SizeAccessor = Arc<dyn Fn(&AttachmentRecord) -> Option<ResizeSpec> + Send + Sync>;

/// Named size accessors referenced by `SizeSpec::Accessor`
#[derive(Clone, Default)]
pub struct SizeAccessors {
    accessors: HashMap<String, SizeAccessor>,
}

impl fmt::Debug for SizeAccessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.accessors.keys()).finish()
    }
}

impl SizeAccessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&AttachmentRecord) -> Option<ResizeSpec> + Send + Sync + 'static,
    {
        self.accessors.insert(name.into(), Arc::new(accessor));
        self
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    pub fn call(&self, name: &str, record: &AttachmentRecord) -> Option<ResizeSpec> {
        self.accessors.get(name).and_then(|f| f(record))
    }
}

/// A concrete thumbnail to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThumbnail {
    pub suffix: String,
    pub size: ResizeSpec,
}

impl ResolvedThumbnail {
    fn new(suffix: &str, size: ResizeSpec) -> Self {
        Self {
            suffix: suffix.to_string(),
            size,
        }
    }
}

/// Expand `config` into the thumbnails `record` should get, in declaration order.
pub fn resolve(
    config: &ThumbnailConfig,
    record: &AttachmentRecord,
    accessors: &SizeAccessors,
) -> Vec<ResolvedThumbnail> {
    let owner_type = record.owner_type.as_deref();
    let mut resolved = Vec::new();

    for (suffix, spec) in config.iter() {
        match spec {
            SizeSpec::Size(size) => resolved.push(ResolvedThumbnail::new(suffix, size.clone())),
            SizeSpec::Accessor(name) => {
                if !owner_matches(owner_type, suffix) || !accessors.responds_to(name) {
                    trace!(suffix = suffix, accessor = %name, "Skipping accessor thumbnail");
                    continue;
                }
                if let Some(size) = accessors.call(name, record) {
                    resolved.push(ResolvedThumbnail::new(suffix, size));
                }
            }
            SizeSpec::Nested(inner) => {
                if !owner_matches(owner_type, suffix) {
                    trace!(suffix = suffix, "Skipping owner-specific thumbnails");
                    continue;
                }
                resolved.extend(
                    inner
                        .iter()
                        .map(|(inner_suffix, size)| ResolvedThumbnail::new(inner_suffix, size.clone())),
                );
            }
        }
    }

    resolved
}

/// `Profile` matches `Profile`, `profile` and `profiles`; `BlogPost` matches `blog_posts`.
pub fn owner_matches(owner_type: Option<&str>, suffix: &str) -> bool {
    let owner_type = match owner_type {
        Some(t) if !t.is_empty() => t,
        _ => return false,
    };
    let singular = underscore(owner_type);
    let plural = pluralize(&singular);

    [owner_type, singular.as_str(), plural.as_str()]
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(suffix))
}

fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.replace("::", "_").chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}

fn pluralize(word: &str) -> String {
    let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| word.ends_with(s));
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(|c: char| "aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if ends_with_any(&["s", "x", "z", "ch", "sh"]) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

//! Stream capabilities and metadata maps used during negotiation.
//!
//! A [`Capability`] describes what a port can produce or accept: a MIME type
//! plus a set of keyed constraints ([`CapsValue`]). Negotiation intersects an
//! upstream capability with the downstream filter's supported ones; the
//! finalized stream description is then carried downstream as a [`Meta`].

use bytes::Bytes;
use std::collections::BTreeMap;

/// Well-known MIME strings.
pub mod mime {
    /// Matches every MIME type.
    pub const ANY: &str = "*";
    /// Unparsed container bytes (demuxer input).
    pub const BYTE_STREAM: &str = "application/octet-stream";
    /// Decoded PCM audio.
    pub const AUDIO_RAW: &str = "audio/raw";
    /// MPEG audio (mp3).
    pub const AUDIO_MPEG: &str = "audio/mpeg";
    /// AAC audio.
    pub const AUDIO_AAC: &str = "audio/aac";
    /// Decoded video frames.
    pub const VIDEO_RAW: &str = "video/raw";
    /// H.264 elementary stream.
    pub const VIDEO_H264: &str = "video/h264";
}

// ============================================================================
// CapsValue
// ============================================================================

/// A constraint on a single capability key.
///
/// ```rust
/// use cadence::format::CapsValue;
///
/// let fixed = CapsValue::Fixed(48000);
/// let range = CapsValue::Range { min: 8000, max: 96000 };
/// assert_eq!(fixed.intersect(&range), Some(CapsValue::Fixed(48000)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CapsValue {
    /// Exact value (fully constrained).
    Fixed(i64),
    /// Range of acceptable values (inclusive).
    Range {
        /// Minimum acceptable value.
        min: i64,
        /// Maximum acceptable value.
        max: i64,
    },
    /// List of acceptable values (ordered by preference, first is best).
    List(Vec<i64>),
    /// Exact textual value (profiles, layouts).
    Text(String),
    /// Any value accepted (unconstrained).
    #[default]
    Any,
}

impl CapsValue {
    /// Check if a value is accepted by this constraint.
    pub fn accepts(&self, value: i64) -> bool {
        match self {
            Self::Fixed(v) => *v == value,
            Self::Range { min, max } => value >= *min && value <= *max,
            Self::List(values) => values.contains(&value),
            Self::Text(_) => false,
            Self::Any => true,
        }
    }

    /// Intersect two constraints, finding common values.
    ///
    /// Returns `None` if there's no overlap.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, other) => Some(other.clone()),
            (this, Self::Any) => Some(this.clone()),

            (Self::Text(a), Self::Text(b)) => (a == b).then(|| Self::Text(a.clone())),
            (Self::Text(_), _) | (_, Self::Text(_)) => None,

            (Self::Fixed(a), Self::Fixed(b)) => (a == b).then_some(Self::Fixed(*a)),

            (Self::Fixed(v), Self::Range { min, max })
            | (Self::Range { min, max }, Self::Fixed(v)) => {
                (v >= min && v <= max).then_some(Self::Fixed(*v))
            }

            (Self::Fixed(v), Self::List(list)) | (Self::List(list), Self::Fixed(v)) => {
                list.contains(v).then_some(Self::Fixed(*v))
            }

            (
                Self::Range {
                    min: min1,
                    max: max1,
                },
                Self::Range {
                    min: min2,
                    max: max2,
                },
            ) => {
                let new_min = *min1.max(min2);
                let new_max = *max1.min(max2);
                match new_min.cmp(&new_max) {
                    std::cmp::Ordering::Greater => None,
                    std::cmp::Ordering::Equal => Some(Self::Fixed(new_min)),
                    std::cmp::Ordering::Less => Some(Self::Range {
                        min: new_min,
                        max: new_max,
                    }),
                }
            }

            (Self::Range { min, max }, Self::List(list))
            | (Self::List(list), Self::Range { min, max }) => {
                Self::from_candidates(list.iter().filter(|v| *v >= min && *v <= max).copied())
            }

            // Preserves the order of the first list
            (Self::List(list1), Self::List(list2)) => {
                Self::from_candidates(list1.iter().filter(|v| list2.contains(v)).copied())
            }
        }
    }

    /// Choose a single value from the constraint.
    ///
    /// Returns the preferred value (first in list, min in range).
    pub fn fixate(&self) -> Option<i64> {
        match self {
            Self::Fixed(v) => Some(*v),
            Self::Range { min, .. } => Some(*min),
            Self::List(values) => values.first().copied(),
            Self::Text(_) | Self::Any => None,
        }
    }

    /// Check if this is a single concrete value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_) | Self::Text(_))
    }

    fn from_candidates(values: impl Iterator<Item = i64>) -> Option<Self> {
        let values: Vec<i64> = values.collect();
        match values.as_slice() {
            [] => None,
            [single] => Some(Self::Fixed(*single)),
            _ => Some(Self::List(values)),
        }
    }
}

// ============================================================================
// Capability
// ============================================================================

/// Keys constrained by a [`Capability`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKey {
    /// Audio sample rate in Hz.
    SampleRate,
    /// Audio channel count.
    Channels,
    /// Audio sample format identifier.
    SampleFormat,
    /// Bit rate in bits per second.
    BitRate,
    /// Video width in pixels.
    Width,
    /// Video height in pixels.
    Height,
    /// Video pixel format identifier.
    PixelFormat,
    /// Video frame rate in frames per second.
    FrameRate,
    /// Codec profile.
    Profile,
}

/// What a port can produce or accept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability {
    mime: String,
    keys: BTreeMap<CapabilityKey, CapsValue>,
}

impl Capability {
    /// Create a capability with no key constraints.
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            keys: BTreeMap::new(),
        }
    }

    /// A capability that matches anything.
    pub fn any() -> Self {
        Self::new(mime::ANY)
    }

    /// Add a key constraint.
    pub fn with(mut self, key: CapabilityKey, value: CapsValue) -> Self {
        self.keys.insert(key, value);
        self
    }

    /// Get the MIME type.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Get the constraint for a key.
    pub fn get(&self, key: CapabilityKey) -> Option<&CapsValue> {
        self.keys.get(&key)
    }

    /// Iterate over key constraints.
    pub fn keys(&self) -> impl Iterator<Item = (&CapabilityKey, &CapsValue)> {
        self.keys.iter()
    }

    /// Check whether every constrained key holds a single value.
    pub fn is_fixed(&self) -> bool {
        !self.mime_is_pattern() && self.keys.values().all(CapsValue::is_fixed)
    }

    /// Intersect with another capability.
    ///
    /// MIME types must match exactly, or one side may be `*` or a
    /// `type/*` pattern; the more specific MIME wins. Keys constrained on
    /// both sides are intersected, keys constrained on one side are kept.
    pub fn intersect(&self, other: &Capability) -> Option<Capability> {
        let mime = intersect_mime(&self.mime, &other.mime)?;
        let mut keys = self.keys.clone();
        for (key, value) in &other.keys {
            let merged = match keys.get(key) {
                Some(existing) => existing.intersect(value)?,
                None => value.clone(),
            };
            keys.insert(*key, merged);
        }
        Some(Capability { mime, keys })
    }

    fn mime_is_pattern(&self) -> bool {
        self.mime == mime::ANY || self.mime.ends_with("/*")
    }
}

fn intersect_mime(a: &str, b: &str) -> Option<String> {
    if a == b || b == mime::ANY {
        return Some(a.to_string());
    }
    if a == mime::ANY {
        return Some(b.to_string());
    }
    let matches_pattern = |pattern: &str, concrete: &str| {
        pattern
            .strip_suffix("/*")
            .and_then(|kind| concrete.strip_prefix(kind))
            .is_some_and(|rest| rest.starts_with('/'))
    };
    if matches_pattern(a, b) {
        Some(b.to_string())
    } else if matches_pattern(b, a) {
        Some(a.to_string())
    } else {
        None
    }
}

/// An ordered set of supported capabilities (first is preferred).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability.
    pub fn push(&mut self, cap: Capability) {
        self.0.push(cap);
    }

    /// Intersect `other` with each capability in order and return the
    /// first non-empty result.
    pub fn first_match(&self, other: &Capability) -> Option<Capability> {
        self.0.iter().find_map(|cap| cap.intersect(other))
    }

    /// Iterate over the capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Meta
// ============================================================================

/// A value in a [`Meta`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Text(String),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes (codec config and similar).
    Bytes(Bytes),
}

/// Stream metadata propagated by `Configure`, and the parameter maps
/// exchanged during `Negotiate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    entries: BTreeMap<String, MetaValue>,
}

/// Negotiation parameters share the [`Meta`] representation.
pub type Params = Meta;

impl Meta {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: MetaValue) {
        self.entries.insert(key.into(), value);
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(key)
    }

    /// Get an integer value.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.entries.get(key)? {
            MetaValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get a string value.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            MetaValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Copy every entry of `other` into this map, overwriting duplicates.
    pub fn merge(&mut self, other: &Meta) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_value_intersections() {
        let range = CapsValue::Range { min: 8000, max: 48000 };
        let list = CapsValue::List(vec![96000, 44100, 22050]);
        assert_eq!(
            range.intersect(&list),
            Some(CapsValue::List(vec![44100, 22050]))
        );
        assert_eq!(
            CapsValue::Fixed(44100).intersect(&list),
            Some(CapsValue::Fixed(44100))
        );
        assert_eq!(CapsValue::Fixed(1).intersect(&CapsValue::Fixed(2)), None);
        assert_eq!(
            CapsValue::Range { min: 1, max: 5 }.intersect(&CapsValue::Range { min: 5, max: 9 }),
            Some(CapsValue::Fixed(5))
        );
        assert_eq!(
            CapsValue::Text("main".into()).intersect(&CapsValue::Fixed(1)),
            None
        );
    }

    #[test]
    fn test_caps_value_fixate() {
        assert_eq!(CapsValue::List(vec![3, 1]).fixate(), Some(3));
        assert_eq!(CapsValue::Range { min: 2, max: 8 }.fixate(), Some(2));
        assert_eq!(CapsValue::Any.fixate(), None);
    }

    #[test]
    fn test_capability_mime_patterns() {
        let wildcard = Capability::new("audio/*");
        let mp3 = Capability::new(mime::AUDIO_MPEG);
        let video = Capability::new(mime::VIDEO_H264);

        assert_eq!(wildcard.intersect(&mp3).unwrap().mime(), mime::AUDIO_MPEG);
        assert_eq!(mp3.intersect(&wildcard).unwrap().mime(), mime::AUDIO_MPEG);
        assert!(wildcard.intersect(&video).is_none());
        assert_eq!(Capability::any().intersect(&video).unwrap().mime(), mime::VIDEO_H264);
        assert!(Capability::new("audio/*").intersect(&Capability::new("audiox/raw")).is_none());
    }

    #[test]
    fn test_capability_key_merge() {
        let upstream = Capability::new(mime::AUDIO_RAW)
            .with(CapabilityKey::SampleRate, CapsValue::Fixed(44100))
            .with(CapabilityKey::Channels, CapsValue::Fixed(2));
        let supported = Capability::new(mime::AUDIO_RAW).with(
            CapabilityKey::SampleRate,
            CapsValue::Range { min: 8000, max: 48000 },
        );

        let merged = supported.intersect(&upstream).unwrap();
        assert_eq!(merged.get(CapabilityKey::SampleRate), Some(&CapsValue::Fixed(44100)));
        assert_eq!(merged.get(CapabilityKey::Channels), Some(&CapsValue::Fixed(2)));
        assert!(merged.is_fixed());

        let too_fast = Capability::new(mime::AUDIO_RAW)
            .with(CapabilityKey::SampleRate, CapsValue::Fixed(96000));
        assert!(supported.intersect(&too_fast).is_none());
    }

    #[test]
    fn test_capability_set_first_match() {
        let set: CapabilitySet = [
            Capability::new(mime::VIDEO_H264),
            Capability::new(mime::AUDIO_AAC),
            Capability::new("audio/*"),
        ]
        .into_iter()
        .collect();

        let found = set.first_match(&Capability::new(mime::AUDIO_AAC)).unwrap();
        assert_eq!(found.mime(), mime::AUDIO_AAC);
        assert!(set.first_match(&Capability::new("text/plain")).is_none());
    }

    #[test]
    fn test_meta_accessors() {
        let mut meta = Meta::new()
            .with("sample_rate", MetaValue::Int(48000))
            .with("codec", MetaValue::Text("aac".into()));
        assert_eq!(meta.get_int("sample_rate"), Some(48000));
        assert_eq!(meta.get_text("codec"), Some("aac"));
        assert_eq!(meta.get_int("codec"), None);

        let extra = Meta::new().with("channels", MetaValue::Int(2));
        meta.merge(&extra);
        assert_eq!(meta.len(), 3);
        assert!(meta.contains("channels"));
    }
}

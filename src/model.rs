//! The grouped metadata model and the image payload it travels with.
//!
//! A [`MetadataModel`] is a two-level ordered map: [`GroupKind`] → field key →
//! [`MetadataField`]. It is a plain value. Extraction produces one, the
//! [`editor`](crate::editor) derives new ones from it, and the re-encoder
//! reads it. Nothing in it refers back to the file it came from.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseGroupError;

/// A single metadata value.
///
/// Real-world formats are heterogeneously typed, so this is a closed set of
/// the kinds they actually store rather than a dynamic value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    /// An exact fraction, as EXIF stores exposure times, GPS degrees and resolutions.
    Rational { numerator: i64, denominator: i64 },
    /// A multi-component value, e.g. three GPS rationals or repeated IPTC keywords.
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Borrow the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The components of this value: the list items, or the value itself.
    pub fn items(&self) -> Vec<&MetadataValue> {
        match self {
            Self::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Rational {
                numerator,
                denominator,
            } => write!(f, "{numerator}/{denominator}"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Where a field came from in its native block: the tag/dataset number and
/// the storage type code, so it can be written back in the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeTag {
    pub id: u16,
    pub format: u16,
}

/// One key/value entry inside a [`MetadataGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataField {
    key: String,
    value: MetadataValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    native: Option<NativeTag>,
}

impl MetadataField {
    pub fn new(key: impl Into<String>, value: MetadataValue) -> Self {
        Self {
            key: key.into(),
            value,
            native: None,
        }
    }

    pub fn with_native(key: impl Into<String>, value: MetadataValue, native: NativeTag) -> Self {
        Self {
            key: key.into(),
            value,
            native: Some(native),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &MetadataValue {
        &self.value
    }

    pub fn native(&self) -> Option<NativeTag> {
        self.native
    }
}

/// The fixed set of metadata categories the extractor can report.
///
/// Ordering follows declaration order, which is also the order groups are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    #[serde(rename = "TIFF")]
    Tiff,
    #[serde(rename = "Exif")]
    Exif,
    #[serde(rename = "GPS")]
    Gps,
    #[serde(rename = "Interop")]
    Interop,
    #[serde(rename = "IPTC")]
    Iptc,
    #[serde(rename = "JFIF")]
    Jfif,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "XMP")]
    Xmp,
}

impl GroupKind {
    pub const ALL: [GroupKind; 8] = [
        Self::Tiff,
        Self::Exif,
        Self::Gps,
        Self::Interop,
        Self::Iptc,
        Self::Jfif,
        Self::Png,
        Self::Xmp,
    ];

    /// Groups that live in an EXIF/TIFF IFD structure.
    pub const EXIF_IFDS: [GroupKind; 4] = [Self::Tiff, Self::Exif, Self::Gps, Self::Interop];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiff => "TIFF",
            Self::Exif => "Exif",
            Self::Gps => "GPS",
            Self::Interop => "Interop",
            Self::Iptc => "IPTC",
            Self::Jfif => "JFIF",
            Self::Png => "PNG",
            Self::Xmp => "XMP",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = ParseGroupError;

    /// Accepts the display name in any case, optionally wrapped in braces (`{GPS}`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name
            .strip_prefix('{')
            .and_then(|n| n.strip_suffix('}'))
            .unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ParseGroupError(s.to_string()))
    }
}

/// A named category and its fields, ordered by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GroupRepr")]
pub struct MetadataGroup {
    kind: GroupKind,
    fields: BTreeMap<String, MetadataField>,
}

impl MetadataGroup {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<&MetadataField> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> btree_map::Values<'_, String, MetadataField> {
        self.fields.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Insert a field, replacing any field with the same key.
    pub fn insert(&mut self, field: MetadataField) -> Option<MetadataField> {
        self.fields.insert(field.key.clone(), field)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataField> {
        self.fields.remove(key)
    }
}

/// Wire form of a group, checked before it becomes a [`MetadataGroup`].
#[derive(Deserialize)]
struct GroupRepr {
    kind: GroupKind,
    fields: BTreeMap<String, MetadataField>,
}

impl TryFrom<GroupRepr> for MetadataGroup {
    type Error = String;

    fn try_from(repr: GroupRepr) -> Result<Self, Self::Error> {
        if let Some((key, field)) = repr.fields.iter().find(|(key, field)| **key != field.key) {
            return Err(format!("{} field listed as `{key}` is keyed `{}`", repr.kind, field.key));
        }
        Ok(Self {
            kind: repr.kind,
            fields: repr.fields,
        })
    }
}

/// The full grouped metadata of one image.
///
/// Invariant: every group present holds at least one field. Deserializing
/// keeps it: empty groups are dropped and a group filed under another kind
/// is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataModel {
    groups: BTreeMap<GroupKind, MetadataGroup>,
}

impl MetadataModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, kind: GroupKind) -> Option<&MetadataGroup> {
        self.groups.get(&kind)
    }

    pub fn contains_group(&self, kind: GroupKind) -> bool {
        self.groups.contains_key(&kind)
    }

    pub fn groups(&self) -> btree_map::Values<'_, GroupKind, MetadataGroup> {
        self.groups.values()
    }

    /// The kinds of the groups present, in listing order.
    pub fn group_kinds(&self) -> Vec<GroupKind> {
        self.groups.keys().copied().collect()
    }

    pub fn field(&self, kind: GroupKind, key: &str) -> Option<&MetadataField> {
        self.groups.get(&kind).and_then(|group| group.get(key))
    }

    pub fn field_count(&self) -> usize {
        self.groups.values().map(MetadataGroup::len).sum()
    }

    /// Insert a field into `kind`, creating the group if needed.
    pub fn insert_field(&mut self, kind: GroupKind, field: MetadataField) -> Option<MetadataField> {
        self.groups
            .entry(kind)
            .or_insert_with(|| MetadataGroup::new(kind))
            .insert(field)
    }

    /// Insert a whole group. Empty groups are not kept.
    pub fn insert_group(&mut self, group: MetadataGroup) {
        if group.is_empty() {
            self.groups.remove(&group.kind);
        } else {
            self.groups.insert(group.kind, group);
        }
    }

    /// Add a value under `key`, turning an existing entry into a list when the
    /// key repeats (repeated IPTC datasets, duplicate PNG keywords).
    pub(crate) fn append_value(
        &mut self,
        kind: GroupKind,
        key: &str,
        value: MetadataValue,
        native: Option<NativeTag>,
    ) {
        let group = self
            .groups
            .entry(kind)
            .or_insert_with(|| MetadataGroup::new(kind));
        match group.fields.get_mut(key) {
            Some(existing) => {
                let previous = std::mem::replace(&mut existing.value, MetadataValue::List(Vec::new()));
                let mut items = match previous {
                    MetadataValue::List(items) => items,
                    single => vec![single],
                };
                items.push(value);
                existing.value = MetadataValue::List(items);
            }
            None => {
                group.insert(MetadataField {
                    key: key.to_string(),
                    value,
                    native,
                });
            }
        }
    }

    /// Remove one field. A group emptied by the removal is removed with it.
    pub fn remove_field(&mut self, kind: GroupKind, key: &str) -> Option<MetadataField> {
        let group = self.groups.get_mut(&kind)?;
        let removed = group.remove(key);
        if group.is_empty() {
            self.groups.remove(&kind);
        }
        removed
    }

    pub fn remove_group(&mut self, kind: GroupKind) -> Option<MetadataGroup> {
        self.groups.remove(&kind)
    }

    /// Whether any of `kinds` is present.
    pub(crate) fn has_any(&self, kinds: &[GroupKind]) -> bool {
        kinds.iter().any(|kind| self.groups.contains_key(kind))
    }
}

impl<'de> Deserialize<'de> for MetadataModel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let groups = BTreeMap::<GroupKind, MetadataGroup>::deserialize(deserializer)?;
        let mut model = MetadataModel::new();
        for (kind, group) in groups {
            if group.kind != kind {
                return Err(D::Error::custom(format!("{} group listed under {kind}", group.kind)));
            }
            model.insert_group(group);
        }
        Ok(model)
    }
}

/// The image payload of one editing session: the untouched source bytes and
/// what was learned about them when they were opened.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    format: image::ImageFormat,
    width: u32,
    height: u32,
    file_name: String,
}

impl ImageAsset {
    pub(crate) fn new(
        bytes: Vec<u8>,
        format: image::ImageFormat,
        width: u32,
        height: u32,
        file_name: String,
    ) -> Self {
        Self {
            bytes,
            format,
            width,
            height,
            file_name,
        }
    }

    /// The source file's bytes, exactly as read.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The container format detected from the file content.
    pub fn format(&self) -> image::ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The preferred file extension of the native format.
    pub fn native_extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> MetadataValue {
        MetadataValue::Text(s.to_string())
    }

    #[test]
    fn group_kind_parses_display_names_case_insensitively() {
        assert_eq!("gps".parse::<GroupKind>(), Ok(GroupKind::Gps));
        assert_eq!("Exif".parse::<GroupKind>(), Ok(GroupKind::Exif));
        assert_eq!("{TIFF}".parse::<GroupKind>(), Ok(GroupKind::Tiff));
        assert_eq!(" iptc ".parse::<GroupKind>(), Ok(GroupKind::Iptc));
        assert!("Canon".parse::<GroupKind>().is_err());
    }

    #[test]
    fn groups_list_in_declaration_order() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Xmp, MetadataField::new("XMPPacket", text("<x/>")));
        model.insert_field(GroupKind::Gps, MetadataField::new("GPSLatitudeRef", text("N")));
        model.insert_field(GroupKind::Tiff, MetadataField::new("Make", text("Acme")));

        assert_eq!(
            model.group_kinds(),
            vec![GroupKind::Tiff, GroupKind::Gps, GroupKind::Xmp]
        );
    }

    #[test]
    fn fields_are_ordered_by_key() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Exif, MetadataField::new("b", MetadataValue::Integer(2)));
        model.insert_field(GroupKind::Exif, MetadataField::new("a", MetadataValue::Integer(1)));

        let keys: Vec<&str> = model.group(GroupKind::Exif).unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn removing_last_field_drops_group() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Gps, MetadataField::new("GPSAltitude", MetadataValue::Float(3.5)));

        let removed = model.remove_field(GroupKind::Gps, "GPSAltitude");
        assert!(removed.is_some());
        assert!(!model.contains_group(GroupKind::Gps));
        assert!(model.is_empty());
    }

    #[test]
    fn empty_group_is_not_inserted() {
        let mut model = MetadataModel::new();
        model.insert_group(MetadataGroup::new(GroupKind::Png));
        assert!(model.is_empty());
    }

    #[test]
    fn append_value_builds_lists_for_repeated_keys() {
        let mut model = MetadataModel::new();
        model.append_value(GroupKind::Iptc, "Keywords", text("sea"), None);
        model.append_value(GroupKind::Iptc, "Keywords", text("sky"), None);
        model.append_value(GroupKind::Iptc, "Keywords", text("sun"), None);

        let field = model.field(GroupKind::Iptc, "Keywords").unwrap();
        assert_eq!(
            field.value(),
            &MetadataValue::List(vec![text("sea"), text("sky"), text("sun")])
        );
    }

    #[test]
    fn value_display() {
        assert_eq!(MetadataValue::Bytes(vec![0; 4]).to_string(), "<4 bytes>");
        assert_eq!(
            MetadataValue::Rational {
                numerator: 1,
                denominator: 250
            }
            .to_string(),
            "1/250"
        );
        assert_eq!(
            MetadataValue::List(vec![MetadataValue::Integer(1), MetadataValue::Integer(2)]).to_string(),
            "1, 2"
        );
    }

    #[test]
    fn model_serializes_groups_by_display_name() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Gps, MetadataField::new("GPSLatitudeRef", text("N")));

        let json = serde_json::to_value(&model).unwrap();
        assert!(json.get("GPS").is_some());

        let back: MetadataModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn deserializing_drops_empty_groups() {
        let json = serde_json::json!({ "GPS": { "kind": "GPS", "fields": {} } });

        let model: MetadataModel = serde_json::from_value(json).unwrap();
        assert!(model.is_empty());
    }

    #[test]
    fn deserializing_rejects_misfiled_groups() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Gps, MetadataField::new("GPSLatitudeRef", text("N")));
        let mut json = serde_json::to_value(&model).unwrap();
        json["GPS"]["kind"] = serde_json::json!("Exif");

        assert!(serde_json::from_value::<MetadataModel>(json).is_err());
    }

    #[test]
    fn deserializing_rejects_mismatched_field_keys() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Gps, MetadataField::new("GPSLatitudeRef", text("N")));
        let mut json = serde_json::to_value(&model).unwrap();
        let field = json["GPS"]["fields"]["GPSLatitudeRef"].take();
        json["GPS"]["fields"] = serde_json::json!({ "GPSLongitudeRef": field });

        assert!(serde_json::from_value::<MetadataModel>(json).is_err());
    }
}

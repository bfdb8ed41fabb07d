use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::editor;
use crate::model::{GroupKind, MetadataModel};

/// A reusable list of metadata to strip.
///
/// Groups are named by their display name (`GPS`, `Exif`, `IPTC`, ...), in any
/// case. Names that match no group are skipped with a warning, so a profile
/// written for a newer version still loads.
///
/// # Loading
///
/// ```rust,no_run
/// use imageanon::config::StripProfile;
///
/// // From a JSON file
/// let profile = StripProfile::load(Some("strip-profile.json".as_ref())).unwrap();
///
/// // Or start from the default (drop GPS) and extend it
/// let mut profile = StripProfile::default();
/// profile.groups.push("XMP".into());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripProfile {
    /// Groups removed whole.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Single fields removed from groups that are otherwise kept.
    #[serde(default)]
    pub fields: Vec<FieldSelector>,
}

/// One field in one group, e.g. `Exif` / `BodySerialNumber`.
///
/// ```rust
/// use imageanon::config::FieldSelector;
///
/// let selector: FieldSelector = "Exif:BodySerialNumber".parse().unwrap();
/// assert_eq!(selector.group, "Exif");
/// assert_eq!(selector.key, "BodySerialNumber");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub group: String,
    pub key: String,
}

impl std::str::FromStr for FieldSelector {
    type Err = anyhow::Error;

    /// Parses `GROUP:KEY`. The key may itself contain colons (`IIM2:200`).
    fn from_str(s: &str) -> Result<Self> {
        let (group, key) = s
            .split_once(':')
            .with_context(|| format!("expected GROUP:KEY, got `{s}`"))?;
        if group.is_empty() || key.is_empty() {
            anyhow::bail!("expected GROUP:KEY, got `{s}`");
        }
        Ok(Self {
            group: group.to_string(),
            key: key.to_string(),
        })
    }
}

impl Default for StripProfile {
    fn default() -> Self {
        Self {
            groups: vec![GroupKind::Gps.to_string()],
            fields: Vec::new(),
        }
    }
}

impl StripProfile {
    /// Resolve the profile path: same directory as the executable.
    pub fn profile_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("strip-profile.json"))
    }

    /// Load a profile from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let profile_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::profile_path()?,
        };

        if !profile_path.exists() {
            log::warn!(
                "Strip profile not found at {}. Using defaults.",
                profile_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&profile_path).context("Failed to read strip profile")?;
        let profile: StripProfile =
            serde_json::from_str(&contents).context("Failed to parse strip profile")?;
        Ok(profile)
    }

    /// Save the profile to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let profile_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::profile_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize strip profile")?;
        std::fs::write(&profile_path, contents).context("Failed to write strip profile")?;
        log::info!("Strip profile saved to {}", profile_path.display());
        Ok(())
    }

    /// Whether the profile deletes nothing.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.fields.is_empty()
    }

    /// Apply every deletion in the profile to `model`.
    pub fn apply(&self, model: &MetadataModel) -> MetadataModel {
        let mut stripped = model.clone();

        for name in &self.groups {
            match name.parse::<GroupKind>() {
                Ok(kind) => stripped = editor::delete_group(&stripped, kind),
                Err(e) => log::warn!("Strip profile: {e}, skipped"),
            }
        }
        for selector in &self.fields {
            match selector.group.parse::<GroupKind>() {
                Ok(kind) => stripped = editor::delete_field(&stripped, kind, &selector.key),
                Err(e) => log::warn!("Strip profile: {e}, skipped {}", selector.key),
            }
        }

        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetadataField, MetadataValue};
    use tempfile::TempDir;

    fn model() -> MetadataModel {
        let mut model = MetadataModel::new();
        for (kind, key) in [
            (GroupKind::Gps, "GPSLatitude"),
            (GroupKind::Exif, "LensMake"),
            (GroupKind::Exif, "BodySerialNumber"),
            (GroupKind::Xmp, "XMPPacket"),
        ] {
            model.insert_field(kind, MetadataField::new(key, MetadataValue::Text("x".into())));
        }
        model
    }

    #[test]
    fn default_strips_gps_only() {
        let stripped = StripProfile::default().apply(&model());
        assert_eq!(
            stripped.group_kinds(),
            vec![GroupKind::Exif, GroupKind::Xmp]
        );
        assert_eq!(stripped.field_count(), 3);
    }

    #[test]
    fn groups_and_fields_are_applied() {
        let profile = StripProfile {
            groups: vec!["xmp".into(), "{GPS}".into()],
            fields: vec!["Exif:BodySerialNumber".parse().unwrap()],
        };
        let stripped = profile.apply(&model());

        assert_eq!(stripped.group_kinds(), vec![GroupKind::Exif]);
        assert!(stripped.field(GroupKind::Exif, "LensMake").is_some());
        assert!(stripped.field(GroupKind::Exif, "BodySerialNumber").is_none());
    }

    #[test]
    fn unknown_groups_are_skipped() {
        let profile = StripProfile {
            groups: vec!["MakerNotes".into()],
            fields: vec![FieldSelector {
                group: "Canon".into(),
                key: "Serial".into(),
            }],
        };
        assert_eq!(profile.apply(&model()), model());
    }

    #[test]
    fn selector_parsing() {
        let selector: FieldSelector = "IPTC:IIM2:200".parse().unwrap();
        assert_eq!(selector.group, "IPTC");
        assert_eq!(selector.key, "IIM2:200");

        assert!("NoColon".parse::<FieldSelector>().is_err());
        assert!(":Key".parse::<FieldSelector>().is_err());
        assert!("Group:".parse::<FieldSelector>().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        let profile = StripProfile {
            groups: vec!["IPTC".into()],
            fields: vec!["TIFF:Make".parse().unwrap()],
        };

        profile.save(Some(path.as_path())).unwrap();
        assert_eq!(StripProfile::load(Some(path.as_path())).unwrap(), profile);
    }

    #[test]
    fn missing_file_gives_default() {
        let dir = TempDir::new().unwrap();
        let profile = StripProfile::load(Some(dir.path().join("absent.json").as_path())).unwrap();
        assert_eq!(profile, StripProfile::default());
    }

    #[test]
    fn partial_json_fills_in() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{ "groups": ["XMP"] }"#).unwrap();

        let profile = StripProfile::load(Some(path.as_path())).unwrap();
        assert_eq!(profile.groups, vec!["XMP".to_string()]);
        assert!(profile.fields.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(StripProfile::load(Some(path.as_path())).is_err());
    }
}

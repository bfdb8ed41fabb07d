//! One open image and the metadata being edited for it.

use std::path::Path;

use crate::editor;
use crate::error::{EncodeError, ExtractError};
use crate::extract::extract;
use crate::format::resolve_path;
use crate::model::{GroupKind, ImageAsset, MetadataModel, MetadataValue};
use crate::pipeline::reencode;

/// The single active asset/model pair behind an editing front end.
///
/// Edits replace the working model; the model as extracted is kept so the
/// session can report and undo them.
#[derive(Debug, Clone)]
pub struct EditSession {
    asset: ImageAsset,
    model: MetadataModel,
    original: MetadataModel,
}

impl EditSession {
    /// Open `path` and extract its metadata.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let (asset, model) = extract(path)?;
        Ok(Self::from_parts(asset, model))
    }

    pub fn from_parts(asset: ImageAsset, model: MetadataModel) -> Self {
        Self {
            asset,
            original: model.clone(),
            model,
        }
    }

    pub fn asset(&self) -> &ImageAsset {
        &self.asset
    }

    pub fn model(&self) -> &MetadataModel {
        &self.model
    }

    pub fn groups(&self) -> Vec<GroupKind> {
        list_groups(&self.model)
    }

    pub fn fields(&self, group: GroupKind) -> Vec<(String, MetadataValue)> {
        list_fields(&self.model, group)
    }

    pub fn delete_field(&mut self, group: GroupKind, key: &str) {
        self.model = editor::delete_field(&self.model, group, key);
    }

    pub fn delete_group(&mut self, group: GroupKind) {
        self.model = editor::delete_group(&self.model, group);
    }

    /// Whether the working model differs from what was extracted.
    pub fn is_modified(&self) -> bool {
        self.model != self.original
    }

    /// Throw away every edit.
    pub fn revert(&mut self) {
        self.model = self.original.clone();
    }

    /// Write the edited image, in the format named by `destination`'s extension.
    pub fn save(&self, destination: impl AsRef<Path>) -> Result<(), EncodeError> {
        save_image(&self.asset, &self.model, destination)
    }
}

/// Open an image for editing.
pub fn open_image(path: impl AsRef<Path>) -> Result<EditSession, ExtractError> {
    EditSession::open(path)
}

/// The groups present in `model`, in listing order.
pub fn list_groups(model: &MetadataModel) -> Vec<GroupKind> {
    model.group_kinds()
}

/// Key/value pairs of one group, ordered by key. Empty if the group is absent.
pub fn list_fields(model: &MetadataModel, group: GroupKind) -> Vec<(String, MetadataValue)> {
    model
        .group(group)
        .map(|group| {
            group
                .fields()
                .map(|field| (field.key().to_string(), field.value().clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Re-encode `asset` with `model` to `destination`, choosing the container
/// from the destination's extension.
pub fn save_image(asset: &ImageAsset, model: &MetadataModel, destination: impl AsRef<Path>) -> Result<(), EncodeError> {
    let destination = destination.as_ref();
    let target = resolve_path(destination);
    if target.is_fallback() {
        log::debug!("Saving {} as {target}", destination.display());
    }
    reencode(asset, model, &target, destination)
}

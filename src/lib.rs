//! # imageanon
//!
//! Inspect and selectively strip embedded image metadata. An image is opened
//! into an immutable [`ImageAsset`] plus a grouped [`MetadataModel`]
//! (TIFF, Exif, GPS, Interop, IPTC, JFIF, PNG text, XMP); deletions produce new
//! models, and the edited result is re-encoded to a destination whose extension
//! picks the output container.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imageanon::{delete_group, open_image, GroupKind};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut session = open_image("holiday.jpg")?;
//!
//!     for group in session.groups() {
//!         println!("{group}");
//!         for (key, value) in session.fields(group) {
//!             println!("  {key:<22} : {value}");
//!         }
//!     }
//!
//!     // Drop the location, keep everything else
//!     session.delete_group(GroupKind::Gps);
//!     session.save("new_image.jpg")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The free functions work on explicit values and never touch shared state:
//!
//! ```rust,no_run
//! use imageanon::{delete_field, extract, reencode, resolve_format, GroupKind};
//!
//! fn main() -> anyhow::Result<()> {
//!     let (asset, model) = extract("scan.tiff")?;
//!     let model = delete_field(&model, GroupKind::Tiff, "Software");
//!     reencode(&asset, &model, &resolve_format("png"), "scan.png")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Read | Metadata carried on write |
//! |--------|------|---------------------------|
//! | JPEG (`.jpg`, `.jpeg`) | yes | TIFF, Exif, GPS, Interop, JFIF, IPTC, XMP |
//! | PNG (`.png`) | yes | TIFF, Exif, GPS, Interop (eXIf), PNG text, XMP |
//! | TIFF (`.tif`, `.tiff`) | yes | TIFF, Exif, GPS, Interop |
//! | WebP (`.webp`) | yes | TIFF, Exif, GPS, Interop, XMP |
//! | Others enabled in `image` | yes | none, pixels only |
//! | HEIC/HEIF | no | rejected as a target |
//!
//! ## Modules
//!
//! - [`model`]: asset, values, fields, groups and the grouped model
//! - [`extract`]: open a file into an asset and its metadata
//! - [`editor`]: pure field and group deletion
//! - [`format`]: target format resolution from names and paths
//! - [`pipeline`]: re-encoding with atomic writes
//! - [`session`]: the single open image behind a front end
//! - [`config`]: reusable strip profiles
//! - [`error`]: extraction and encoding errors

pub mod config;
pub mod editor;
pub mod error;
pub mod extract;
pub mod format;
mod metadata;
pub mod model;
pub mod pipeline;
pub mod session;

pub use config::{FieldSelector, StripProfile};
pub use editor::{delete_field, delete_group};
pub use error::{EncodeError, ExtractError, ParseGroupError};
pub use extract::extract;
pub use format::{resolve_format, resolve_path, TargetFormat};
pub use model::{GroupKind, ImageAsset, MetadataField, MetadataGroup, MetadataModel, MetadataValue, NativeTag};
pub use pipeline::reencode;
pub use session::{list_fields, list_groups, open_image, save_image, EditSession};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a source file into an [`ImageAsset`](crate::model::ImageAsset) and model.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file could not be read from disk.
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not an image container this crate can decode.
    #[error("{} is not a supported image container", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The container was recognised but its pixels or metadata are malformed.
    #[error("{} could not be decoded: {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },
}

/// Failure to write an edited image.
///
/// Whatever the variant, the destination path is left exactly as it was
/// before the call.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("original image data could not be decoded again: {reason}")]
    SourceDecodeFailure { reason: String },

    #[error("cannot write to {}: {source}", .path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no encoder available for {target} output")]
    UnsupportedTarget { target: String },

    #[error("could not finalize {}: {reason}", .path.display())]
    FinalizeFailure { path: PathBuf, reason: String },

    #[error("edited metadata cannot be embedded: {reason}")]
    MetadataEncoding { reason: String },
}

/// A group name that is not one of the known [`GroupKind`](crate::model::GroupKind)s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metadata group: {0}")]
pub struct ParseGroupError(pub String);

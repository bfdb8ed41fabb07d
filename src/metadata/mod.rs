//! Container-level metadata codecs.
//!
//! [`reader`] pulls every block a container carries into a
//! [`MetadataModel`](crate::model::MetadataModel); [`writer`] puts an edited
//! model back into JPEG, PNG and WebP streams. TIFF output is assembled whole by
//! [`exif::build_tiff`].

pub(crate) mod exif;
pub(crate) mod iptc;
pub(crate) mod jfif;
pub(crate) mod png_text;
pub(crate) mod reader;
pub(crate) mod writer;
pub(crate) mod xmp;

pub(crate) use reader::{icc_profile, read_metadata};
pub(crate) use writer::{rewrite_jpeg, rewrite_png, rewrite_webp};

pub(crate) const MARKER_APP0: u8 = 0xE0;
pub(crate) const MARKER_APP1: u8 = 0xE1;
pub(crate) const MARKER_APP13: u8 = 0xED;
pub(crate) const MARKER_COM: u8 = 0xFE;

/// Largest JPEG segment payload: 0xFFFF minus the length field.
pub(crate) const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

/// Prefix of an EXIF APP1 payload in front of the TIFF header.
pub(crate) const EXIF_PREFIX: &[u8] = b"Exif\0\0";
pub(crate) const EXIF_CHUNK: [u8; 4] = *b"eXIf";

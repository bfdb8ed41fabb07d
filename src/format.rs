use std::fmt;
use std::path::Path;

/// The container an edited image is written as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg,
    Png,
    Tiff,
    Heic,
    /// Best-effort fallback, carrying the lower-cased extension that was asked for.
    Generic(String),
}

impl TargetFormat {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Generic(_))
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => f.write_str("JPEG"),
            Self::Png => f.write_str("PNG"),
            Self::Tiff => f.write_str("TIFF"),
            Self::Heic => f.write_str("HEIC"),
            Self::Generic(ext) if ext.is_empty() => f.write_str("generic image"),
            Self::Generic(ext) => write!(f, "generic image (.{ext})"),
        }
    }
}

/// Map a requested file extension to a target container.
///
/// Never fails: anything outside the known table degrades to
/// [`TargetFormat::Generic`].
///
/// ```rust
/// use imageanon::format::{resolve_format, TargetFormat};
///
/// assert_eq!(resolve_format("JPG"), TargetFormat::Jpeg);
/// assert_eq!(resolve_format(".png"), TargetFormat::Png);
/// assert!(resolve_format("xyz").is_fallback());
/// ```
pub fn resolve_format(extension: &str) -> TargetFormat {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => TargetFormat::Jpeg,
        "png" => TargetFormat::Png,
        "tiff" => TargetFormat::Tiff,
        "heic" => TargetFormat::Heic,
        _ => TargetFormat::Generic(ext),
    }
}

/// Resolve the target container from a destination path's extension.
pub fn resolve_path(path: &Path) -> TargetFormat {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    resolve_format(&ext)
}

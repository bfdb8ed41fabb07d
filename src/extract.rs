use image::ImageError;
use std::fs;
use std::path::Path;

use crate::error::ExtractError;
use crate::metadata;
use crate::model::{ImageAsset, MetadataModel};

/// Read an image file and pull out its grouped metadata.
///
/// The container is detected from the file content, never from its name.
/// Pixels are decoded once, to validate the payload and learn the
/// dimensions.
///
/// # Example
///
/// ```rust,no_run
/// use imageanon::extract::extract;
///
/// let (asset, model) = extract("photo.jpg")?;
/// println!("{} ({}x{})", asset.file_name(), asset.dimensions().0, asset.dimensions().1);
/// for group in model.groups() {
///     println!("{}: {} fields", group.kind(), group.len());
/// }
/// # Ok::<(), imageanon::error::ExtractError>(())
/// ```
pub fn extract(source: impl AsRef<Path>) -> Result<(ImageAsset, MetadataModel), ExtractError> {
    let path = source.as_ref();

    let bytes = fs::read(path).map_err(|source| ExtractError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let unsupported = || ExtractError::UnsupportedFormat {
        path: path.to_path_buf(),
    };
    let format = image::guess_format(&bytes).map_err(|_| unsupported())?;
    if !format.reading_enabled() {
        return Err(unsupported());
    }

    let pixels = image::load_from_memory_with_format(&bytes, format).map_err(|e| match e {
        ImageError::Unsupported(_) => unsupported(),
        other => ExtractError::DecodeFailure {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;

    let model = metadata::read_metadata(&bytes, format).map_err(|reason| ExtractError::DecodeFailure {
        path: path.to_path_buf(),
        reason,
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    log::debug!(
        "Opened {} as {format:?}, {}x{}, {} metadata groups",
        path.display(),
        pixels.width(),
        pixels.height(),
        model.group_kinds().len()
    );

    let asset = ImageAsset::new(bytes, format, pixels.width(), pixels.height(), file_name);
    Ok((asset, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupKind;
    use image::ImageFormat;
    use tempfile::TempDir;

    fn write_image(dir: &TempDir, name: &str, format: ImageFormat) -> std::path::PathBuf {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(5, 3, image::Rgb([1, 2, 3])));
        let path = dir.path().join(name);
        image.save_with_format(&path, format).unwrap();
        path
    }

    #[test]
    fn reads_asset_details() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "shot.jpg", ImageFormat::Jpeg);

        let (asset, model) = extract(&path).unwrap();
        assert_eq!(asset.format(), ImageFormat::Jpeg);
        assert_eq!(asset.dimensions(), (5, 3));
        assert_eq!(asset.file_name(), "shot.jpg");
        assert_eq!(asset.byte_size(), std::fs::metadata(&path).unwrap().len());
        assert!(model.contains_group(GroupKind::Jfif));
    }

    #[test]
    fn format_comes_from_content() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "actually_png.jpg", ImageFormat::Png);

        let (asset, _) = extract(&path).unwrap();
        assert_eq!(asset.format(), ImageFormat::Png);
        assert_eq!(asset.native_extension(), "png");
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let err = extract(dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable { .. }));
    }

    #[test]
    fn text_is_not_an_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"just some notes").unwrap();

        let err = extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[test]
    fn truncated_jpeg_fails_to_decode() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "cut.jpg", ImageFormat::Jpeg);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..20]).unwrap();

        let err = extract(&path).unwrap_err();
        assert!(matches!(err, ExtractError::DecodeFailure { .. }));
    }
}

use image::{ColorType, DynamicImage, ImageError, ImageFormat};
use std::io::{Cursor, Write};
use std::path::Path;

use crate::error::EncodeError;
use crate::format::TargetFormat;
use crate::metadata::{self, exif};
use crate::model::{GroupKind, ImageAsset, MetadataModel};

/// Groups each metadata-capable container can embed.
fn carried_groups(format: ImageFormat) -> &'static [GroupKind] {
    use GroupKind::*;
    match format {
        ImageFormat::Jpeg => &[Tiff, Exif, Gps, Interop, Iptc, Jfif, Xmp],
        ImageFormat::Png => &[Tiff, Exif, Gps, Interop, Png, Xmp],
        ImageFormat::Tiff => &[Tiff, Exif, Gps, Interop],
        ImageFormat::WebP => &[Tiff, Exif, Gps, Interop, Xmp],
        _ => &[],
    }
}

/// Work out which `image` format actually gets written for `target`.
///
/// The generic fallback takes the format named by the extension if there is
/// one, else stays in the source's own format.
fn output_format(asset: &ImageAsset, target: &TargetFormat) -> Result<ImageFormat, EncodeError> {
    let format = match target {
        TargetFormat::Jpeg => ImageFormat::Jpeg,
        TargetFormat::Png => ImageFormat::Png,
        TargetFormat::Tiff => ImageFormat::Tiff,
        TargetFormat::Heic => {
            return Err(EncodeError::UnsupportedTarget {
                target: target.to_string(),
            });
        }
        TargetFormat::Generic(ext) => match ImageFormat::from_extension(ext) {
            Some(format) => format,
            None => {
                log::debug!("No format known for `.{ext}`, keeping {:?}", asset.format());
                asset.format()
            }
        },
    };

    if !format.writing_enabled() {
        return Err(EncodeError::UnsupportedTarget {
            target: format!("{target} ({format:?})"),
        });
    }
    Ok(format)
}

/// Copy of `model` holding only what `format` can embed.
fn carried_model(model: &MetadataModel, format: ImageFormat) -> MetadataModel {
    let carried = carried_groups(format);
    let mut kept = model.clone();
    for kind in model.group_kinds() {
        if !carried.contains(&kind) {
            log::debug!("{format:?} cannot carry {kind} metadata, dropping it");
            kept.remove_group(kind);
        }
    }
    kept
}

fn decode(asset: &ImageAsset) -> Result<DynamicImage, EncodeError> {
    image::load_from_memory_with_format(asset.bytes(), asset.format()).map_err(|e| EncodeError::SourceDecodeFailure {
        reason: e.to_string(),
    })
}

/// Narrow pixels to what the target encoder accepts.
fn encodable(pixels: DynamicImage, format: ImageFormat) -> DynamicImage {
    match (format, pixels.color()) {
        (ImageFormat::Jpeg, ColorType::L8 | ColorType::Rgb8) => pixels,
        (ImageFormat::Jpeg, ColorType::La8 | ColorType::L16 | ColorType::La16) => {
            log::debug!("JPEG output drops alpha and keeps 8-bit grey");
            DynamicImage::ImageLuma8(pixels.to_luma8())
        }
        (ImageFormat::Jpeg, _) => {
            log::debug!("JPEG output drops alpha and keeps 8-bit RGB");
            DynamicImage::ImageRgb8(pixels.to_rgb8())
        }
        (ImageFormat::Png, ColorType::Rgb32F | ColorType::Rgba32F) => DynamicImage::ImageRgba16(pixels.to_rgba16()),
        _ => pixels,
    }
}

fn encode_pixels(pixels: &DynamicImage, format: ImageFormat, destination: &Path) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Cursor::new(Vec::new());
    match pixels.write_to(&mut buffer, format) {
        Ok(()) => Ok(buffer.into_inner()),
        // generic encoders take a narrower set of colour types
        Err(ImageError::Unsupported(_)) if !matches!(pixels, DynamicImage::ImageRgba8(_)) => {
            log::debug!("{format:?} encoder rejected {:?}, retrying as RGBA8", pixels.color());
            encode_pixels(&DynamicImage::ImageRgba8(pixels.to_rgba8()), format, destination)
        }
        Err(e) => Err(EncodeError::FinalizeFailure {
            path: destination.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Build the complete output file in memory.
fn render(asset: &ImageAsset, model: &MetadataModel, format: ImageFormat, destination: &Path) -> Result<Vec<u8>, EncodeError> {
    let same_container = format == asset.format();

    match format {
        ImageFormat::Jpeg if same_container => metadata::rewrite_jpeg(asset.bytes(), model, None),
        ImageFormat::Png if same_container => metadata::rewrite_png(asset.bytes(), model, None),
        ImageFormat::WebP if same_container => metadata::rewrite_webp(asset.bytes(), model, None),
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => {
            let icc = metadata::icc_profile(asset.bytes(), asset.format());
            let pixels = encodable(decode(asset)?, format);
            let encoded = encode_pixels(&pixels, format, destination)?;
            let rewritten = match format {
                ImageFormat::Jpeg => metadata::rewrite_jpeg(&encoded, model, icc.as_deref()),
                ImageFormat::Png => metadata::rewrite_png(&encoded, model, icc.as_deref()),
                _ => metadata::rewrite_webp(&encoded, model, icc.as_deref()),
            };
            // our own encoder output failing to parse is not the source's fault
            rewritten.map_err(|e| match e {
                EncodeError::SourceDecodeFailure { reason } => EncodeError::FinalizeFailure {
                    path: destination.to_path_buf(),
                    reason,
                },
                other => other,
            })
        }
        ImageFormat::Tiff => {
            let icc = metadata::icc_profile(asset.bytes(), asset.format());
            let raster = exif::Raster::from_image(&decode(asset)?);
            exif::build_tiff(model, &raster, icc.as_deref()).map_err(|reason| EncodeError::MetadataEncoding { reason })
        }
        other => encode_pixels(&decode(asset)?, other, destination),
    }
}

/// Write `bytes` to `destination` through a temporary sibling file, so the
/// destination is either fully replaced or left as it was.
fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<(), EncodeError> {
    let parent = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(".imageanon-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|source| EncodeError::DestinationUnwritable {
            path: destination.to_path_buf(),
            source,
        })?;

    temp.write_all(bytes)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| EncodeError::FinalizeFailure {
            path: destination.to_path_buf(),
            reason: e.to_string(),
        })?;

    temp.persist(destination).map_err(|e| EncodeError::DestinationUnwritable {
        path: destination.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Encode `asset`'s pixels with `model` as its metadata and write the result
/// to `destination`.
///
/// JPEG, PNG and WebP saved in their own format keep the original compressed image data and
/// only rebuild the metadata blocks. Every other combination decodes and
/// re-encodes the pixels. Groups the output container cannot hold are left
/// out. On any error `destination` is untouched.
///
/// # Example
///
/// ```rust,no_run
/// use imageanon::editor::delete_group;
/// use imageanon::extract::extract;
/// use imageanon::format::resolve_format;
/// use imageanon::model::GroupKind;
/// use imageanon::pipeline::reencode;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (asset, model) = extract("holiday.jpg")?;
/// let model = delete_group(&model, GroupKind::Gps);
/// reencode(&asset, &model, &resolve_format("png"), "holiday.png")?;
/// # Ok(())
/// # }
/// ```
pub fn reencode(
    asset: &ImageAsset,
    model: &MetadataModel,
    target: &TargetFormat,
    destination: impl AsRef<Path>,
) -> Result<(), EncodeError> {
    let destination = destination.as_ref();
    let format = output_format(asset, target)?;
    if carried_groups(format).is_empty() && !model.is_empty() {
        log::warn!("{format:?} output is written without embedded metadata");
    }
    let model = carried_model(model, format);

    let bytes = render(asset, &model, format, destination)?;
    write_atomically(destination, &bytes)?;

    log::debug!(
        "Wrote {} ({format:?}, {} bytes, {} metadata groups)",
        destination.display(),
        bytes.len(),
        model.group_kinds().len()
    );
    Ok(())
}

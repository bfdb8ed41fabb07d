use image::ImageFormat;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::Png;
use img_parts::webp::{WebP, CHUNK_EXIF, CHUNK_XMP};
use img_parts::{Bytes, DynImage, ImageICC};

use super::{exif, iptc, jfif, png_text, xmp};
use super::{EXIF_CHUNK, EXIF_PREFIX, MARKER_APP0, MARKER_APP1, MARKER_APP13};
use crate::model::MetadataModel;

/// Read every metadata block `bytes` carries for its container.
///
/// Containers without a metadata reader yield an empty model.
pub(crate) fn read_metadata(bytes: &[u8], format: ImageFormat) -> Result<MetadataModel, String> {
    let mut model = MetadataModel::new();

    match format {
        ImageFormat::Jpeg => read_jpeg(&mut model, bytes)?,
        ImageFormat::Png => read_png(&mut model, bytes)?,
        ImageFormat::Tiff => exif::read_into(&mut model, bytes.to_vec(), true)?,
        ImageFormat::WebP => read_webp(&mut model, bytes)?,
        other => log::debug!("No metadata blocks read from {other:?} images"),
    }

    log::debug!(
        "Read {} metadata fields in {} groups",
        model.field_count(),
        model.group_kinds().len()
    );
    Ok(model)
}

fn read_jpeg(model: &mut MetadataModel, bytes: &[u8]) -> Result<(), String> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| format!("invalid JPEG structure: {e}"))?;

    for segment in jpeg.segments() {
        read_jpeg_segment(model, segment)?;
    }
    Ok(())
}

fn read_jpeg_segment(model: &mut MetadataModel, segment: &JpegSegment) -> Result<(), String> {
    let contents = segment.contents();

    match segment.marker() {
        MARKER_APP0 if contents.starts_with(jfif::JFIF_HEADER) => jfif::read_into(model, contents),
        MARKER_APP1 if contents.starts_with(EXIF_PREFIX) => {
            exif::read_into(model, contents[EXIF_PREFIX.len()..].to_vec(), false)?;
        }
        MARKER_APP1 if contents.starts_with(xmp::XMP_HEADER) => {
            xmp::read_into(model, &contents[xmp::XMP_HEADER.len()..]);
        }
        MARKER_APP1 if contents.starts_with(xmp::XMP_EXTENSION_HEADER) => {
            log::debug!("Skipping extended XMP segment");
        }
        MARKER_APP13 if contents.starts_with(iptc::PHOTOSHOP_HEADER) => iptc::read_into(model, contents),
        _ => {}
    }
    Ok(())
}

fn read_png(model: &mut MetadataModel, bytes: &[u8]) -> Result<(), String> {
    let png = Png::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| format!("invalid PNG structure: {e}"))?;

    for chunk in png.chunks() {
        let kind = chunk.kind();
        let contents = chunk.contents();
        match kind {
            EXIF_CHUNK => exif::read_into(model, contents.to_vec(), false)?,
            png_text::ITXT => match png_text::parse_itxt(contents) {
                Some((keyword, packet)) if keyword == xmp::PNG_XMP_KEYWORD => {
                    xmp::read_into(model, packet.as_bytes());
                }
                _ => png_text::read_chunk(model, kind, contents),
            },
            png_text::TEXT => png_text::read_chunk(model, kind, contents),
            _ if &kind == b"zTXt" => log::debug!("Skipping compressed zTXt chunk"),
            _ => {}
        }
    }
    Ok(())
}

fn read_webp(model: &mut MetadataModel, bytes: &[u8]) -> Result<(), String> {
    let webp = WebP::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| format!("invalid WebP structure: {e}"))?;

    if let Some(data) = webp.chunk_by_id(CHUNK_EXIF).and_then(|chunk| chunk.content().data()) {
        // bare TIFF per the container, but some writers keep the JPEG-style prefix
        let raw = data.strip_prefix(EXIF_PREFIX).unwrap_or(&data[..]);
        exif::read_into(model, raw.to_vec(), false)?;
    }
    if let Some(data) = webp.chunk_by_id(CHUNK_XMP).and_then(|chunk| chunk.content().data()) {
        xmp::read_into(model, data);
    }
    Ok(())
}

/// The embedded ICC colour profile, if the container has one.
pub(crate) fn icc_profile(bytes: &[u8], format: ImageFormat) -> Option<Vec<u8>> {
    if format == ImageFormat::Tiff {
        return exif::tiff_icc_profile(bytes);
    }
    let image = DynImage::from_bytes(Bytes::copy_from_slice(bytes)).ok().flatten()?;
    image.icc_profile().map(|profile| profile.to_vec())
}

use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};
use img_parts::riff::{RiffChunk, RiffContent};
use img_parts::webp::{WebP, CHUNK_ALPH, CHUNK_ANIM, CHUNK_EXIF, CHUNK_ICCP, CHUNK_VP8L, CHUNK_VP8X, CHUNK_XMP};
use img_parts::{Bytes, ImageEXIF, ImageICC};

use super::{exif, iptc, jfif, png_text, xmp};
use super::{EXIF_CHUNK, EXIF_PREFIX, MARKER_APP0, MARKER_APP1, MARKER_APP13, MARKER_COM, MAX_SEGMENT_PAYLOAD};
use crate::error::EncodeError;
use crate::model::MetadataModel;

fn metadata_error(reason: String) -> EncodeError {
    EncodeError::MetadataEncoding { reason }
}

fn source_error(reason: String) -> EncodeError {
    EncodeError::SourceDecodeFailure { reason }
}

/// Segments this crate owns: every metadata carrier it reads, plus the ones
/// it cannot represent and therefore must not pass through.
fn is_metadata_segment(segment: &JpegSegment) -> bool {
    let contents = segment.contents();
    match segment.marker() {
        MARKER_APP0 => contents.starts_with(jfif::JFIF_HEADER),
        MARKER_APP1 => {
            contents.starts_with(EXIF_PREFIX)
                || contents.starts_with(xmp::XMP_HEADER)
                || contents.starts_with(xmp::XMP_EXTENSION_HEADER)
        }
        MARKER_APP13 => contents.starts_with(iptc::PHOTOSHOP_HEADER),
        MARKER_COM => true,
        _ => false,
    }
}

/// Replace the metadata segments of a JPEG stream with ones built from
/// `model`. Scan data and every other segment are kept byte for byte.
///
/// When `icc` is given it replaces the stream's colour profile.
pub(crate) fn rewrite_jpeg(bytes: &[u8], model: &MetadataModel, icc: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
    let mut jpeg =
        Jpeg::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| source_error(format!("invalid JPEG structure: {e}")))?;

    let existing_app13 = jpeg
        .segments()
        .iter()
        .find(|s| s.marker() == MARKER_APP13 && s.contents().starts_with(iptc::PHOTOSHOP_HEADER))
        .map(|s| s.contents().to_vec());

    let removed = jpeg.segments().iter().filter(|s| is_metadata_segment(s)).count();
    jpeg.segments_mut().retain(|s| !is_metadata_segment(s));
    log::debug!("Removed {removed} metadata segments");

    let mut header = Vec::new();
    if let Some(app0) = jfif::encode(model).map_err(metadata_error)? {
        header.push(JpegSegment::new_with_contents(MARKER_APP0, Bytes::from(app0)));
    }
    if let Some(tiff) = exif::encode(model).map_err(metadata_error)? {
        let mut app1 = EXIF_PREFIX.to_vec();
        app1.extend_from_slice(&tiff);
        if app1.len() > MAX_SEGMENT_PAYLOAD {
            return Err(metadata_error(format!("EXIF block of {} bytes does not fit one JPEG segment", app1.len())));
        }
        header.push(JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(app1)));
    }
    if let Some(packet) = xmp::packet(model).map_err(metadata_error)? {
        let app1 = xmp::jpeg_payload(packet).map_err(metadata_error)?;
        header.push(JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(app1)));
    }
    if let Some(app13) = iptc::encode(model, existing_app13.as_deref()).map_err(metadata_error)? {
        if app13.len() > MAX_SEGMENT_PAYLOAD {
            return Err(metadata_error(format!("IPTC block of {} bytes does not fit one JPEG segment", app13.len())));
        }
        header.push(JpegSegment::new_with_contents(MARKER_APP13, Bytes::from(app13)));
    }

    // JFIF first, EXIF before XMP; the rest of the stream follows unchanged
    let segments = jpeg.segments_mut();
    for (index, segment) in header.into_iter().enumerate() {
        segments.insert(index, segment);
    }

    if let Some(icc) = icc {
        jpeg.set_icc_profile(Some(Bytes::copy_from_slice(icc)));
    }

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Chunk types this crate rebuilds or drops.
fn is_metadata_chunk(kind: [u8; 4]) -> bool {
    matches!(kind, EXIF_CHUNK | png_text::TEXT | png_text::ITXT) || &kind == b"zTXt" || &kind == b"tIME"
}

/// Replace the metadata chunks of a PNG stream with ones built from `model`.
/// Image data chunks are kept byte for byte.
pub(crate) fn rewrite_png(bytes: &[u8], model: &MetadataModel, icc: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
    let mut png =
        Png::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| source_error(format!("invalid PNG structure: {e}")))?;

    png.chunks_mut().retain(|chunk| !is_metadata_chunk(chunk.kind()));

    let tiff = exif::encode(model).map_err(metadata_error)?;
    png.set_exif(tiff.map(Bytes::from));

    let mut text = Vec::new();
    for (kind, data) in png_text::encode_chunks(model).map_err(metadata_error)? {
        text.push(PngChunk::new(kind, Bytes::from(data)));
    }
    if let Some(packet) = xmp::packet(model).map_err(metadata_error)? {
        let data = png_text::itxt_chunk(xmp::PNG_XMP_KEYWORD, packet)
            .ok_or_else(|| metadata_error("XMP packet cannot be stored in iTXt".to_string()))?;
        text.push(PngChunk::new(png_text::ITXT, Bytes::from(data)));
    }

    // textual chunks go right before the image data
    let chunks = png.chunks_mut();
    let at = chunks
        .iter()
        .position(|chunk| &chunk.kind() == b"IDAT")
        .unwrap_or(chunks.len().saturating_sub(1));
    for (offset, chunk) in text.into_iter().enumerate() {
        chunks.insert(at + offset, chunk);
    }

    if let Some(icc) = icc {
        png.set_icc_profile(Some(Bytes::copy_from_slice(icc)));
    }

    Ok(png.encoder().bytes().to_vec())
}

// VP8X feature flags
const VP8X_ICC: u8 = 0x20;
const VP8X_ALPHA: u8 = 0x10;
const VP8X_EXIF: u8 = 0x08;
const VP8X_XMP: u8 = 0x04;
const VP8X_ANIMATION: u8 = 0x02;

fn chunk_data(webp: &WebP, id: [u8; 4]) -> Option<&Bytes> {
    webp.chunk_by_id(id).and_then(|chunk| chunk.content().data())
}

/// Whether the image carries alpha, from the VP8X flags, an `ALPH` chunk or
/// the lossless bitstream header.
fn webp_has_alpha(webp: &WebP) -> bool {
    let flagged = chunk_data(webp, CHUNK_VP8X)
        .and_then(|data| data.first())
        .is_some_and(|flags| flags & VP8X_ALPHA != 0);
    let lossless = chunk_data(webp, CHUNK_VP8L)
        .and_then(|data| data.get(1..5))
        .is_some_and(|header| u32::from_le_bytes([header[0], header[1], header[2], header[3]]) & (1 << 28) != 0);
    flagged || lossless || webp.has_chunk(CHUNK_ALPH)
}

/// Turn a simple-format file into the extended one, which is the only layout
/// that may hold metadata chunks.
fn make_extended(webp: &mut WebP) -> Result<(), EncodeError> {
    if webp.has_chunk(CHUNK_VP8X) {
        return Ok(());
    }
    let (width, height) = webp
        .dimensions()
        .ok_or_else(|| source_error("WebP canvas size cannot be read".to_string()))?;
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
    data.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
    webp.chunks_mut()
        .insert(0, RiffChunk::new(CHUNK_VP8X, RiffContent::Data(Bytes::from(data))));
    Ok(())
}

fn sync_extended_flags(webp: &mut WebP, alpha: bool) {
    let mut flags = 0;
    for (id, flag) in [
        (CHUNK_ICCP, VP8X_ICC),
        (CHUNK_EXIF, VP8X_EXIF),
        (CHUNK_XMP, VP8X_XMP),
        (CHUNK_ANIM, VP8X_ANIMATION),
    ] {
        if webp.has_chunk(id) {
            flags |= flag;
        }
    }
    if alpha {
        flags |= VP8X_ALPHA;
    }

    for chunk in webp.chunks_mut().iter_mut().filter(|chunk| chunk.id() == CHUNK_VP8X) {
        if let RiffContent::Data(data) = chunk.content_mut() {
            let mut header = data.to_vec();
            if let Some(first) = header.first_mut() {
                *first = flags;
            }
            *data = Bytes::from(header);
        }
    }
}

/// Replace the `EXIF` and `XMP` chunks of a WebP file with ones built from
/// `model`. Image data chunks are kept byte for byte.
///
/// EXIF is stored as bare TIFF, as the container expects.
pub(crate) fn rewrite_webp(bytes: &[u8], model: &MetadataModel, icc: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
    let mut webp =
        WebP::from_bytes(Bytes::copy_from_slice(bytes)).map_err(|e| source_error(format!("invalid WebP structure: {e}")))?;
    let alpha = webp_has_alpha(&webp);

    webp.remove_chunks_by_id(CHUNK_EXIF);
    webp.remove_chunks_by_id(CHUNK_XMP);

    let tiff = exif::encode(model).map_err(metadata_error)?;
    let packet = xmp::packet(model).map_err(metadata_error)?;
    if tiff.is_some() || packet.is_some() || icc.is_some() {
        make_extended(&mut webp)?;
    }

    if let Some(icc) = icc {
        webp.remove_chunks_by_id(CHUNK_ICCP);
        // ICCP sits right after VP8X
        webp.chunks_mut()
            .insert(1, RiffChunk::new(CHUNK_ICCP, RiffContent::Data(Bytes::copy_from_slice(icc))));
    }
    if let Some(tiff) = tiff {
        webp.chunks_mut()
            .push(RiffChunk::new(CHUNK_EXIF, RiffContent::Data(Bytes::from(tiff))));
    }
    if let Some(packet) = packet {
        webp.chunks_mut()
            .push(RiffChunk::new(CHUNK_XMP, RiffContent::Data(Bytes::copy_from_slice(packet.as_bytes()))));
    }

    sync_extended_flags(&mut webp, alpha);
    Ok(webp.encoder().bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor;
    use crate::metadata::read_metadata;
    use crate::model::{GroupKind, MetadataField, MetadataValue};
    use image::ImageFormat;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(6, 4, |x, y| {
            image::Rgb([x as u8 * 30, y as u8 * 50, 90])
        }));
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn rich_model() -> MetadataModel {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Tiff, MetadataField::new("Tag0x010F", MetadataValue::Text("Acme".into())));
        model.insert_field(GroupKind::Gps, MetadataField::new("Tag0x0001", MetadataValue::Text("N".into())));
        model.insert_field(GroupKind::Xmp, MetadataField::new(xmp::KEY_PACKET, MetadataValue::Text("<x:xmpmeta/>".into())));
        model
    }

    fn scan_data(jpeg: &[u8]) -> Vec<Vec<u8>> {
        let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg)).unwrap();
        jpeg.segments()
            .iter()
            .filter(|s| !is_metadata_segment(s))
            .map(|s| s.contents().to_vec())
            .collect()
    }

    #[test]
    fn jpeg_metadata_is_replaced_and_scan_kept() {
        let source = encoded(ImageFormat::Jpeg);
        let out = rewrite_jpeg(&source, &rich_model(), None).unwrap();

        let model = read_metadata(&out, ImageFormat::Jpeg).unwrap();
        assert_eq!(
            model.group_kinds(),
            vec![GroupKind::Tiff, GroupKind::Gps, GroupKind::Xmp]
        );
        assert_eq!(
            model.field(GroupKind::Tiff, "Make").unwrap().value(),
            &MetadataValue::Text("Acme".into())
        );
        assert_eq!(scan_data(&out), scan_data(&source));
    }

    #[test]
    fn jpeg_comments_are_dropped() {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded(ImageFormat::Jpeg))).unwrap();
        jpeg.segments_mut()
            .insert(0, JpegSegment::new_with_contents(MARKER_COM, Bytes::from_static(b"shot at home")));
        let source = jpeg.encoder().bytes();

        let out = rewrite_jpeg(&source, &MetadataModel::new(), None).unwrap();
        let out = Jpeg::from_bytes(Bytes::from(out)).unwrap();
        assert!(out.segments().iter().all(|s| s.marker() != MARKER_COM));
    }

    #[test]
    fn png_metadata_round_trip() {
        let source = encoded(ImageFormat::Png);
        let mut model = rich_model();
        model.insert_field(GroupKind::Png, MetadataField::new("Title", MetadataValue::Text("Dunes".into())));

        let out = rewrite_png(&source, &model, None).unwrap();
        let read = read_metadata(&out, ImageFormat::Png).unwrap();
        assert_eq!(
            read.group_kinds(),
            vec![GroupKind::Tiff, GroupKind::Gps, GroupKind::Png, GroupKind::Xmp]
        );

        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Png).unwrap();
        let original = image::load_from_memory_with_format(&source, ImageFormat::Png).unwrap();
        assert_eq!(decoded.to_rgb8(), original.to_rgb8());

        let stripped = editor::delete_group(&read, GroupKind::Png);
        let out = rewrite_png(&out, &stripped, None).unwrap();
        let read = read_metadata(&out, ImageFormat::Png).unwrap();
        assert!(!read.contains_group(GroupKind::Png));
    }

    #[test]
    fn icc_profile_is_attached() {
        let profile = vec![7u8; 64];
        let out = rewrite_png(&encoded(ImageFormat::Png), &MetadataModel::new(), Some(profile.as_slice())).unwrap();
        assert_eq!(crate::metadata::icc_profile(&out, ImageFormat::Png), Some(profile));
    }

    #[test]
    fn unstorable_value_is_a_metadata_error() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Xmp, MetadataField::new(xmp::KEY_PACKET, MetadataValue::Integer(3)));
        let err = rewrite_jpeg(&encoded(ImageFormat::Jpeg), &model, None).unwrap_err();
        assert!(matches!(err, EncodeError::MetadataEncoding { .. }));
    }

    #[test]
    fn oversized_iptc_is_a_metadata_error() {
        let mut model = MetadataModel::new();
        let caption = "x".repeat(70_000);
        model.insert_field(GroupKind::Iptc, MetadataField::new("Caption-Abstract", MetadataValue::Text(caption)));

        let err = rewrite_jpeg(&encoded(ImageFormat::Jpeg), &model, None).unwrap_err();
        assert!(matches!(err, EncodeError::MetadataEncoding { .. }));
    }

    // ── webp ─────────────────────────────────────────────────────────

    fn vp8x_flags(webp: &[u8]) -> Option<u8> {
        let webp = WebP::from_bytes(Bytes::copy_from_slice(webp)).unwrap();
        chunk_data(&webp, CHUNK_VP8X).and_then(|data| data.first().copied())
    }

    #[test]
    fn webp_metadata_round_trip() {
        let source = encoded(ImageFormat::WebP);
        assert_eq!(vp8x_flags(&source), None);

        let out = rewrite_webp(&source, &rich_model(), None).unwrap();
        let read = read_metadata(&out, ImageFormat::WebP).unwrap();
        assert_eq!(
            read.group_kinds(),
            vec![GroupKind::Tiff, GroupKind::Gps, GroupKind::Xmp]
        );
        assert_eq!(vp8x_flags(&out), Some(VP8X_EXIF | VP8X_XMP));

        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        let original = image::load_from_memory_with_format(&source, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.to_rgb8(), original.to_rgb8());
    }

    #[test]
    fn webp_exif_is_bare_tiff() {
        let out = rewrite_webp(&encoded(ImageFormat::WebP), &rich_model(), None).unwrap();
        let webp = WebP::from_bytes(Bytes::from(out)).unwrap();
        let exif = chunk_data(&webp, CHUNK_EXIF).unwrap();
        assert!(exif.starts_with(b"MM") || exif.starts_with(b"II"));
    }

    #[test]
    fn webp_deleted_groups_clear_their_flags() {
        let tagged = rewrite_webp(&encoded(ImageFormat::WebP), &rich_model(), None).unwrap();
        let stripped = editor::delete_group(&rich_model(), GroupKind::Xmp);

        let out = rewrite_webp(&tagged, &stripped, None).unwrap();
        assert_eq!(vp8x_flags(&out), Some(VP8X_EXIF));
        assert!(!read_metadata(&out, ImageFormat::WebP).unwrap().contains_group(GroupKind::Xmp));
    }

    #[test]
    fn webp_keeps_lossless_alpha_flag() {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(3, 3, image::Rgba([1, 2, 3, 40])));
        let mut source = std::io::Cursor::new(Vec::new());
        image.write_to(&mut source, ImageFormat::WebP).unwrap();

        let out = rewrite_webp(source.get_ref(), &rich_model(), None).unwrap();
        assert_eq!(vp8x_flags(&out).map(|flags| flags & VP8X_ALPHA), Some(VP8X_ALPHA));
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.to_rgba8(), image.to_rgba8());
    }

    #[test]
    fn garbage_is_a_source_error() {
        let err = rewrite_png(b"not a png", &MetadataModel::new(), None).unwrap_err();
        assert!(matches!(err, EncodeError::SourceDecodeFailure { .. }));
    }
}

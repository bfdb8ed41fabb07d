//! EXIF IFDs ↔ the `TIFF`, `Exif`, `GPS` and `Interop` groups.
//!
//! Fields are classified by the IFD they live in, as reported by the EXIF
//! decoder, and remember their tag number and storage type so the writer can
//! rebuild the same IFDs minus whatever was deleted.

use std::io::Cursor;

use exif::experimental::Writer;
use exif::{Context, Field, In, Rational, SRational, Tag, Value};
use image::DynamicImage;

use crate::model::{GroupKind, MetadataField, MetadataModel, MetadataValue, NativeTag};

// TIFF field type codes
const BYTE: u16 = 1;
const ASCII: u16 = 2;
const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;
const SBYTE: u16 = 6;
const UNDEFINED: u16 = 7;
const SSHORT: u16 = 8;
const SLONG: u16 = 9;
const SRATIONAL: u16 = 10;
const FLOAT: u16 = 11;
const DOUBLE: u16 = 12;

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TAG_ICC_PROFILE: u16 = 0x8773;

/// IFD0 tags that point at data elsewhere in the file. They are regenerated
/// on write and never part of the model.
const OFFSET_TAGS: &[u16] = &[
    0x0111, // StripOffsets
    0x0117, // StripByteCounts
    0x0144, // TileOffsets
    0x0145, // TileByteCounts
    0x014A, // SubIFDs
    0x0201, // JPEGInterchangeFormat
    0x0202, // JPEGInterchangeFormatLength
    TAG_ICC_PROFILE,
];

/// IFD0 tags describing how pixels are laid out in a TIFF file.
const LAYOUT_TAGS: &[u16] = &[
    0x00FE, // NewSubfileType
    0x0100, // ImageWidth
    0x0101, // ImageLength
    0x0102, // BitsPerSample
    0x0103, // Compression
    0x0106, // PhotometricInterpretation
    0x0115, // SamplesPerPixel
    0x0116, // RowsPerStrip
    0x011C, // PlanarConfiguration
    0x013D, // Predictor
    0x0140, // ColorMap
    0x0142, // TileWidth
    0x0143, // TileLength
    0x0152, // ExtraSamples
    0x0153, // SampleFormat
    0x015B, // JPEGTables
    0x0212, // YCbCrSubSampling
];

fn group_of(context: Context) -> Option<GroupKind> {
    match context {
        Context::Tiff => Some(GroupKind::Tiff),
        Context::Exif => Some(GroupKind::Exif),
        Context::Gps => Some(GroupKind::Gps),
        Context::Interop => Some(GroupKind::Interop),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn context_of(kind: GroupKind) -> Option<Context> {
    match kind {
        GroupKind::Tiff => Some(Context::Tiff),
        GroupKind::Exif => Some(Context::Exif),
        GroupKind::Gps => Some(Context::Gps),
        GroupKind::Interop => Some(Context::Interop),
        _ => None,
    }
}

fn is_structural(tag: Tag) -> bool {
    match tag.context() {
        Context::Tiff => {
            matches!(tag.number(), TAG_EXIF_IFD | TAG_GPS_IFD) || OFFSET_TAGS.contains(&tag.number())
        }
        Context::Exif => tag.number() == TAG_INTEROP_IFD,
        _ => false,
    }
}

fn is_layout(tag: Tag) -> bool {
    tag.context() == Context::Tiff && LAYOUT_TAGS.contains(&tag.number())
}

/// Parse a raw TIFF-structured EXIF block into the model.
///
/// `tiff_container` is set when the block is a whole TIFF file, in which case
/// the pixel-layout tags belong to the image and not to its metadata.
/// Entries damaged beyond repair are skipped; a block that cannot be parsed
/// at all is an error.
pub(crate) fn read_into(model: &mut MetadataModel, raw: Vec<u8>, tiff_container: bool) -> Result<(), String> {
    let mut reader = exif::Reader::new();
    reader.continue_on_error(true);

    let exif = match reader.read_raw(raw) {
        Ok(exif) => exif,
        Err(exif::Error::PartialResult(partial)) => {
            let (exif, errors) = partial.into_inner();
            for err in errors {
                log::warn!("Ignoring damaged EXIF entry: {err}");
            }
            exif
        }
        Err(e) => return Err(format!("invalid EXIF data: {e}")),
    };

    for field in exif.fields() {
        if field.ifd_num != In::PRIMARY {
            log::debug!("Skipping thumbnail IFD field {}", field.tag);
            continue;
        }
        if is_structural(field.tag) || (tiff_container && is_layout(field.tag)) {
            continue;
        }
        let Some(kind) = group_of(field.tag.context()) else {
            continue;
        };
        let Some((value, format)) = to_model_value(&field.value) else {
            log::debug!("Skipping {} with unknown storage type", field.tag);
            continue;
        };

        let native = NativeTag {
            id: field.tag.number(),
            format,
        };
        model.insert_field(kind, MetadataField::with_native(field_key(field.tag), value, native));
    }

    Ok(())
}

/// The ICC profile stored in a TIFF file's first IFD, if any.
pub(crate) fn tiff_icc_profile(raw: &[u8]) -> Option<Vec<u8>> {
    let mut reader = exif::Reader::new();
    reader.continue_on_error(true);
    let exif = match reader.read_raw(raw.to_vec()) {
        Ok(exif) => exif,
        Err(exif::Error::PartialResult(partial)) => partial.into_inner().0,
        Err(_) => return None,
    };
    let field = exif.get_field(Tag(Context::Tiff, TAG_ICC_PROFILE), In::PRIMARY)?;
    match &field.value {
        Value::Undefined(bytes, _) | Value::Byte(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

/// Known tags keep the decoder's name, others are keyed by number.
fn field_key(tag: Tag) -> String {
    if tag.description().is_some() {
        tag.to_string()
    } else {
        format!("Tag0x{:04X}", tag.number())
    }
}

fn tag_id(field: &MetadataField) -> Option<u16> {
    if let Some(native) = field.native() {
        return Some(native.id);
    }
    let hex = field.key().strip_prefix("Tag0x")?;
    u16::from_str_radix(hex, 16).ok()
}

fn collapse(items: impl Iterator<Item = MetadataValue>) -> MetadataValue {
    let mut items: Vec<MetadataValue> = items.collect();
    if items.len() == 1 {
        items.remove(0)
    } else {
        MetadataValue::List(items)
    }
}

fn rational(numerator: i64, denominator: i64) -> MetadataValue {
    MetadataValue::Rational {
        numerator,
        denominator,
    }
}

fn ascii_text(bytes: &[u8]) -> MetadataValue {
    let text = String::from_utf8_lossy(bytes);
    MetadataValue::Text(text.trim_end_matches('\0').to_string())
}

fn to_model_value(value: &Value) -> Option<(MetadataValue, u16)> {
    let converted = match value {
        Value::Byte(v) => (MetadataValue::Bytes(v.clone()), BYTE),
        Value::Ascii(strings) => (collapse(strings.iter().map(|s| ascii_text(s))), ASCII),
        Value::Short(v) => (collapse(v.iter().map(|&n| MetadataValue::Integer(n.into()))), SHORT),
        Value::Long(v) => (collapse(v.iter().map(|&n| MetadataValue::Integer(n.into()))), LONG),
        Value::Rational(v) => (
            collapse(v.iter().map(|r| rational(r.num.into(), r.denom.into()))),
            RATIONAL,
        ),
        Value::SByte(v) => (collapse(v.iter().map(|&n| MetadataValue::Integer(n.into()))), SBYTE),
        Value::Undefined(v, _) => (MetadataValue::Bytes(v.clone()), UNDEFINED),
        Value::SShort(v) => (collapse(v.iter().map(|&n| MetadataValue::Integer(n.into()))), SSHORT),
        Value::SLong(v) => (collapse(v.iter().map(|&n| MetadataValue::Integer(n.into()))), SLONG),
        Value::SRational(v) => (
            collapse(v.iter().map(|r| rational(r.num.into(), r.denom.into()))),
            SRATIONAL,
        ),
        Value::Float(v) => (collapse(v.iter().map(|&x| MetadataValue::Float(x.into()))), FLOAT),
        Value::Double(v) => (collapse(v.iter().map(|&x| MetadataValue::Float(x))), DOUBLE),
        _ => return None,
    };
    Some(converted)
}

fn integers(value: &MetadataValue) -> Option<Vec<i64>> {
    value
        .items()
        .into_iter()
        .map(|item| match item {
            MetadataValue::Integer(n) => Some(*n),
            MetadataValue::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        })
        .collect()
}

fn narrow<T: TryFrom<i64>>(values: Vec<i64>) -> Option<Vec<T>> {
    values.into_iter().map(|n| T::try_from(n).ok()).collect()
}

fn rationals(value: &MetadataValue) -> Option<Vec<(i64, i64)>> {
    value
        .items()
        .into_iter()
        .map(|item| match item {
            MetadataValue::Rational {
                numerator,
                denominator,
            } => Some((*numerator, *denominator)),
            MetadataValue::Integer(n) => Some((*n, 1)),
            _ => None,
        })
        .collect()
}

fn floats(value: &MetadataValue) -> Option<Vec<f64>> {
    value
        .items()
        .into_iter()
        .map(|item| match item {
            MetadataValue::Float(x) => Some(*x),
            MetadataValue::Integer(n) => Some(*n as f64),
            MetadataValue::Rational {
                numerator,
                denominator,
            } if *denominator != 0 => Some(*numerator as f64 / *denominator as f64),
            _ => None,
        })
        .collect()
}

fn texts(value: &MetadataValue) -> Option<Vec<Vec<u8>>> {
    value
        .items()
        .into_iter()
        .map(|item| item.as_text().map(|s| s.as_bytes().to_vec()))
        .collect()
}

fn raw_bytes(value: &MetadataValue) -> Option<Vec<u8>> {
    match value {
        MetadataValue::Bytes(bytes) => Some(bytes.clone()),
        other => integers(other).and_then(narrow::<u8>),
    }
}

/// Pick a storage type for a field that was not read from a file.
fn infer_format(value: &MetadataValue) -> Option<u16> {
    let items = value.items();
    match items.first()? {
        MetadataValue::Text(_) => Some(ASCII),
        MetadataValue::Integer(_) => {
            let ints = integers(value)?;
            if ints.iter().all(|n| u32::try_from(*n).is_ok()) {
                Some(LONG)
            } else {
                Some(SLONG)
            }
        }
        MetadataValue::Float(_) => Some(DOUBLE),
        MetadataValue::Boolean(_) => Some(BYTE),
        MetadataValue::Bytes(_) => Some(UNDEFINED),
        MetadataValue::Rational { .. } => {
            let all_unsigned = rationals(value)?.iter().all(|(n, d)| *n >= 0 && *d >= 0);
            Some(if all_unsigned { RATIONAL } else { SRATIONAL })
        }
        MetadataValue::List(_) => None,
    }
}

fn to_exif_value(value: &MetadataValue, format: u16) -> Result<Value, String> {
    let converted = match format {
        BYTE => raw_bytes(value).map(Value::Byte),
        ASCII => texts(value).map(Value::Ascii),
        SHORT => integers(value).and_then(narrow::<u16>).map(Value::Short),
        LONG => integers(value).and_then(narrow::<u32>).map(Value::Long),
        SBYTE => integers(value).and_then(narrow::<i8>).map(Value::SByte),
        UNDEFINED => raw_bytes(value).map(|bytes| Value::Undefined(bytes, 0)),
        SSHORT => integers(value).and_then(narrow::<i16>).map(Value::SShort),
        SLONG => integers(value).and_then(narrow::<i32>).map(Value::SLong),
        RATIONAL => rationals(value).and_then(|pairs| {
            pairs
                .into_iter()
                .map(|(n, d)| {
                    Some(Rational {
                        num: u32::try_from(n).ok()?,
                        denom: u32::try_from(d).ok()?,
                    })
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Rational)
        }),
        SRATIONAL => rationals(value).and_then(|pairs| {
            pairs
                .into_iter()
                .map(|(n, d)| {
                    Some(SRational {
                        num: i32::try_from(n).ok()?,
                        denom: i32::try_from(d).ok()?,
                    })
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::SRational)
        }),
        FLOAT => floats(value).map(|v| Value::Float(v.into_iter().map(|x| x as f32).collect())),
        DOUBLE => floats(value).map(Value::Double),
        _ => None,
    };
    converted.ok_or_else(|| format!("value `{value}` cannot be stored as TIFF type {format}"))
}

/// Build the EXIF fields for every IFD group in the model, in tag order.
///
/// `skip_layout` drops pixel-layout tags, for when the caller supplies its own.
fn model_fields(model: &MetadataModel, skip_layout: bool) -> Result<Vec<Field>, String> {
    let mut fields = Vec::new();

    for kind in GroupKind::EXIF_IFDS {
        let (Some(group), Some(context)) = (model.group(kind), context_of(kind)) else {
            continue;
        };
        for field in group.fields() {
            let Some(id) = tag_id(field) else {
                log::warn!("{kind}:{} has no tag number, not written", field.key());
                continue;
            };
            let tag = Tag(context, id);
            if is_structural(tag) || (skip_layout && is_layout(tag)) {
                log::debug!("{kind}:{} is regenerated by the encoder", field.key());
                continue;
            }
            let format = field
                .native()
                .map(|native| native.format)
                .or_else(|| infer_format(field.value()))
                .ok_or_else(|| format!("{kind}:{} has no storable type", field.key()))?;
            let value = to_exif_value(field.value(), format)
                .map_err(|e| format!("{kind}:{}: {e}", field.key()))?;
            fields.push(Field {
                tag,
                ifd_num: In::PRIMARY,
                value,
            });
        }
    }

    fields.sort_by_key(|field| (context_rank(field.tag.context()), field.tag.number()));
    Ok(fields)
}

fn context_rank(context: Context) -> u8 {
    match context {
        Context::Tiff => 0,
        Context::Exif => 1,
        Context::Gps => 2,
        _ => 3,
    }
}

/// Serialize the model's IFD groups into a standalone EXIF (TIFF) block, as
/// carried by JPEG APP1 and PNG `eXIf`. `None` when there is nothing to write.
pub(crate) fn encode(model: &MetadataModel) -> Result<Option<Vec<u8>>, String> {
    let fields = model_fields(model, false)?;
    if fields.is_empty() {
        return Ok(None);
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }

    let mut buffer = Cursor::new(Vec::new());
    writer
        .write(&mut buffer, false)
        .map_err(|e| format!("failed to generate EXIF data: {e}"))?;
    Ok(Some(buffer.into_inner()))
}

/// Uncompressed, single-strip pixel data ready to be stored in a TIFF file.
pub(crate) struct Raster {
    width: u32,
    height: u32,
    channels: u16,
    bits: u16,
    data: Vec<u8>,
}

impl Raster {
    /// Lay out decoded pixels interleaved, 16-bit samples little-endian.
    /// Float images are narrowed to 16-bit RGBA.
    pub(crate) fn from_image(image: &DynamicImage) -> Self {
        fn le_bytes(samples: &[u16]) -> Vec<u8> {
            samples.iter().flat_map(|s| s.to_le_bytes()).collect()
        }

        let (channels, bits, data) = match image {
            DynamicImage::ImageLuma8(buf) => (1, 8, buf.as_raw().clone()),
            DynamicImage::ImageLumaA8(buf) => (2, 8, buf.as_raw().clone()),
            DynamicImage::ImageRgb8(buf) => (3, 8, buf.as_raw().clone()),
            DynamicImage::ImageRgba8(buf) => (4, 8, buf.as_raw().clone()),
            DynamicImage::ImageLuma16(buf) => (1, 16, le_bytes(buf.as_raw())),
            DynamicImage::ImageLumaA16(buf) => (2, 16, le_bytes(buf.as_raw())),
            DynamicImage::ImageRgb16(buf) => (3, 16, le_bytes(buf.as_raw())),
            DynamicImage::ImageRgba16(buf) => (4, 16, le_bytes(buf.as_raw())),
            other => (4, 16, le_bytes(other.to_rgba16().as_raw())),
        };

        Self {
            width: image.width(),
            height: image.height(),
            channels,
            bits,
            data,
        }
    }

    fn layout_fields(&self) -> Vec<Field> {
        let tiff = |id: u16, value: Value| Field {
            tag: Tag(Context::Tiff, id),
            ifd_num: In::PRIMARY,
            value,
        };
        let photometric = if self.channels >= 3 { 2 } else { 1 };

        let mut fields = vec![
            tiff(0x0100, Value::Long(vec![self.width])),
            tiff(0x0101, Value::Long(vec![self.height])),
            tiff(0x0102, Value::Short(vec![self.bits; usize::from(self.channels)])),
            tiff(0x0103, Value::Short(vec![1])),
            tiff(0x0106, Value::Short(vec![photometric])),
            tiff(0x0115, Value::Short(vec![self.channels])),
            tiff(0x0116, Value::Long(vec![self.height])),
            tiff(0x011C, Value::Short(vec![1])),
        ];
        if self.channels == 2 || self.channels == 4 {
            // unassociated alpha
            fields.push(tiff(0x0152, Value::Short(vec![2])));
        }
        fields
    }
}

/// Write a complete baseline TIFF: the raster as one uncompressed strip, the
/// model's IFD groups, and an optional ICC profile.
pub(crate) fn build_tiff(model: &MetadataModel, raster: &Raster, icc: Option<&[u8]>) -> Result<Vec<u8>, String> {
    let mut fields = model_fields(model, true)?;
    fields.extend(raster.layout_fields());
    if let Some(icc) = icc {
        fields.push(Field {
            tag: Tag(Context::Tiff, TAG_ICC_PROFILE),
            ifd_num: In::PRIMARY,
            value: Value::Undefined(icc.to_vec(), 0),
        });
    }
    fields.sort_by_key(|field| (context_rank(field.tag.context()), field.tag.number()));

    let strips: [&[u8]; 1] = [raster.data.as_slice()];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    writer.set_strips(&strips, In::PRIMARY);

    let mut buffer = Cursor::new(Vec::new());
    writer
        .write(&mut buffer, true)
        .map_err(|e| format!("failed to assemble TIFF: {e}"))?;
    Ok(buffer.into_inner())
}

//! The JFIF APP0 header.

use crate::model::{GroupKind, MetadataField, MetadataModel, MetadataValue};

pub(crate) const JFIF_HEADER: &[u8] = b"JFIF\0";

const KEY_VERSION: &str = "JFIFVersion";
const KEY_UNIT: &str = "DensityUnit";
const KEY_X_DENSITY: &str = "XDensity";
const KEY_Y_DENSITY: &str = "YDensity";

/// Parse an APP0 payload. The embedded thumbnail is not reported.
pub(crate) fn read_into(model: &mut MetadataModel, app0: &[u8]) {
    let Some(body) = app0.strip_prefix(JFIF_HEADER) else {
        return;
    };
    if body.len() < 7 {
        log::warn!("JFIF header too short ({} bytes), ignoring", body.len());
        return;
    }

    let version = format!("{}.{:02}", body[0], body[1]);
    let x_density = u16::from_be_bytes([body[3], body[4]]);
    let y_density = u16::from_be_bytes([body[5], body[6]]);

    let fields = [
        (KEY_VERSION, MetadataValue::Text(version)),
        (KEY_UNIT, MetadataValue::Integer(i64::from(body[2]))),
        (KEY_X_DENSITY, MetadataValue::Integer(i64::from(x_density))),
        (KEY_Y_DENSITY, MetadataValue::Integer(i64::from(y_density))),
    ];
    for (key, value) in fields {
        model.insert_field(GroupKind::Jfif, MetadataField::new(key, value));
    }
}

const KEYS: [&str; 4] = [KEY_VERSION, KEY_UNIT, KEY_X_DENSITY, KEY_Y_DENSITY];

fn integer_field<T: TryFrom<i64>>(model: &MetadataModel, key: &str) -> Result<T, String> {
    match model.field(GroupKind::Jfif, key).map(MetadataField::value) {
        Some(MetadataValue::Integer(n)) => T::try_from(*n).map_err(|_| format!("JFIF:{key} out of range: {n}")),
        Some(other) => Err(format!("JFIF:{key} must be an integer, got `{other}`")),
        None => Err(format!("JFIF:{key} is missing")),
    }
}

fn version(model: &MetadataModel) -> Result<(u8, u8), String> {
    let field = model
        .field(GroupKind::Jfif, KEY_VERSION)
        .ok_or_else(|| format!("JFIF:{KEY_VERSION} is missing"))?;
    let parsed = field.value().as_text().and_then(|text| {
        let (major, minor) = text.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    });
    parsed.ok_or_else(|| format!("JFIF:{KEY_VERSION} is not a version: `{}`", field.value()))
}

/// Build an APP0 payload from the `JFIF` group.
///
/// The header has no optional fields, so it is written only while all four
/// are present. Deleting any of them drops the segment. `None` in that case
/// and when the group is gone.
pub(crate) fn encode(model: &MetadataModel) -> Result<Option<Vec<u8>>, String> {
    let Some(group) = model.group(GroupKind::Jfif) else {
        return Ok(None);
    };
    if let Some(missing) = KEYS.iter().find(|key| !group.contains(key)) {
        log::debug!("JFIF:{missing} was deleted, dropping the JFIF header");
        return Ok(None);
    }

    let (major, minor) = version(model)?;
    let unit: u8 = integer_field(model, KEY_UNIT)?;
    let x_density: u16 = integer_field(model, KEY_X_DENSITY)?;
    let y_density: u16 = integer_field(model, KEY_Y_DENSITY)?;

    let mut out = JFIF_HEADER.to_vec();
    out.extend_from_slice(&[major, minor, unit]);
    out.extend_from_slice(&x_density.to_be_bytes());
    out.extend_from_slice(&y_density.to_be_bytes());
    out.extend_from_slice(&[0, 0]); // no thumbnail
    Ok(Some(out))
}

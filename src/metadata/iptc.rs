//! IPTC-IIM inside a Photoshop APP13 block.
//!
//! The APP13 payload is `Photoshop 3.0\0` followed by 8BIM image resources.
//! Resource 0x0404 holds the IIM datasets; every other resource is carried
//! through untouched.

use crate::model::{GroupKind, MetadataModel, MetadataValue, NativeTag};

pub(crate) const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IIM_RESOURCE: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;

// storage kinds kept in NativeTag::format
const AS_TEXT: u16 = 0;
const AS_SHORT: u16 = 1;
const AS_BYTES: u16 = 2;

/// Application record (2) dataset names.
const DATASETS: &[(u8, &str)] = &[
    (0, "RecordVersion"),
    (5, "ObjectName"),
    (7, "EditStatus"),
    (10, "Urgency"),
    (15, "Category"),
    (20, "SupplementalCategory"),
    (25, "Keywords"),
    (40, "SpecialInstructions"),
    (55, "DateCreated"),
    (60, "TimeCreated"),
    (62, "DigitalCreationDate"),
    (63, "DigitalCreationTime"),
    (65, "OriginatingProgram"),
    (70, "ProgramVersion"),
    (80, "By-line"),
    (85, "By-lineTitle"),
    (90, "City"),
    (92, "Sub-location"),
    (95, "Province-State"),
    (100, "Country-PrimaryLocationCode"),
    (101, "Country-PrimaryLocationName"),
    (103, "OriginalTransmissionReference"),
    (105, "Headline"),
    (110, "Credit"),
    (115, "Source"),
    (116, "CopyrightNotice"),
    (118, "Contact"),
    (120, "Caption-Abstract"),
    (122, "Writer-Editor"),
];

fn dataset_name(record: u8, dataset: u8) -> String {
    if record == 2 {
        if let Some((_, name)) = DATASETS.iter().find(|(number, _)| *number == dataset) {
            return (*name).to_string();
        }
    }
    format!("IIM{record}:{dataset}")
}

/// Resolve a field key back to its record/dataset numbers.
fn dataset_number(key: &str) -> Option<(u8, u8)> {
    if let Some((number, _)) = DATASETS.iter().find(|(_, name)| *name == key) {
        return Some((2, *number));
    }
    let (record, dataset) = key.strip_prefix("IIM")?.split_once(':')?;
    Some((record.parse().ok()?, dataset.parse().ok()?))
}

/// One 8BIM resource, as a byte range of the APP13 payload.
struct Resource {
    id: u16,
    start: usize,
    data: std::ops::Range<usize>,
    end: usize,
}

/// Walk the 8BIM resources after the Photoshop header. Stops quietly at the
/// first malformed resource.
fn resources(app13: &[u8]) -> Vec<Resource> {
    let mut found = Vec::new();
    let mut pos = PHOTOSHOP_HEADER.len();

    while pos + 12 <= app13.len() {
        if &app13[pos..pos + 4] != RESOURCE_SIGNATURE {
            break;
        }
        let id = u16::from_be_bytes([app13[pos + 4], app13[pos + 5]]);
        // pascal name: length byte + name, padded to even
        let name_len = usize::from(app13[pos + 6]);
        let name_padded = if (name_len + 1) % 2 == 0 { name_len + 1 } else { name_len + 2 };
        let size_at = pos + 6 + name_padded;
        if size_at + 4 > app13.len() {
            break;
        }
        let size = u32::from_be_bytes([
            app13[size_at],
            app13[size_at + 1],
            app13[size_at + 2],
            app13[size_at + 3],
        ]) as usize;
        let data_start = size_at + 4;
        let data_end = data_start + size;
        if data_end > app13.len() {
            log::warn!("Truncated Photoshop resource 0x{id:04X}, ignoring the rest of the block");
            break;
        }
        let end = (data_end + size % 2).min(app13.len());

        found.push(Resource {
            id,
            start: pos,
            data: data_start..data_end,
            end,
        });
        pos = end;
    }

    found
}

/// Parse the IIM datasets of an APP13 payload into the `IPTC` group.
/// Repeated datasets (keywords, categories) become lists.
pub(crate) fn read_into(model: &mut MetadataModel, app13: &[u8]) {
    for resource in resources(app13).into_iter().filter(|r| r.id == IIM_RESOURCE) {
        read_datasets(model, &app13[resource.data]);
    }
}

fn read_datasets(model: &mut MetadataModel, iim: &[u8]) {
    let mut pos = 0;

    while pos + 5 <= iim.len() {
        if iim[pos] != TAG_MARKER {
            log::debug!("IIM stream ends at offset {pos}");
            break;
        }
        let record = iim[pos + 1];
        let dataset = iim[pos + 2];
        let mut len = usize::from(u16::from_be_bytes([iim[pos + 3], iim[pos + 4]]));
        pos += 5;

        // extended dataset: the low bits give the size of the length field
        if len & 0x8000 != 0 {
            let width = len & 0x7FFF;
            if width > 4 || pos + width > iim.len() {
                log::warn!("Bad extended IIM length for {record}:{dataset}");
                break;
            }
            len = iim[pos..pos + width]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            pos += width;
        }
        if pos + len > iim.len() {
            log::warn!("Truncated IIM dataset {record}:{dataset}");
            break;
        }
        let payload = &iim[pos..pos + len];
        pos += len;

        let (value, format) = match (record, dataset) {
            (2, 0) if payload.len() == 2 => (
                MetadataValue::Integer(i64::from(u16::from_be_bytes([payload[0], payload[1]]))),
                AS_SHORT,
            ),
            (2, _) => (
                MetadataValue::Text(String::from_utf8_lossy(payload).into_owned()),
                AS_TEXT,
            ),
            _ => (MetadataValue::Bytes(payload.to_vec()), AS_BYTES),
        };
        let native = NativeTag {
            id: (u16::from(record) << 8) | u16::from(dataset),
            format,
        };
        model.append_value(GroupKind::Iptc, &dataset_name(record, dataset), value, Some(native));
    }
}

fn push_dataset(out: &mut Vec<u8>, record: u8, dataset: u8, payload: &[u8]) {
    out.extend_from_slice(&[TAG_MARKER, record, dataset]);
    match u16::try_from(payload.len()) {
        Ok(len) if len < 0x8000 => out.extend_from_slice(&len.to_be_bytes()),
        _ => {
            out.extend_from_slice(&0x8004u16.to_be_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(payload);
}

fn dataset_payload(value: &MetadataValue, format: Option<u16>) -> Result<Vec<u8>, String> {
    match (value, format) {
        (MetadataValue::Integer(n), Some(AS_SHORT) | None) => u16::try_from(*n)
            .map(|n| n.to_be_bytes().to_vec())
            .map_err(|_| format!("{n} does not fit a 2-byte dataset")),
        (MetadataValue::Text(s), _) => Ok(s.as_bytes().to_vec()),
        (MetadataValue::Bytes(b), _) => Ok(b.clone()),
        (other, _) => Ok(other.to_string().into_bytes()),
    }
}

/// Serialize the IIM datasets of the model.
fn encode_datasets(model: &MetadataModel) -> Result<Vec<u8>, String> {
    let Some(group) = model.group(GroupKind::Iptc) else {
        return Ok(Vec::new());
    };

    let mut datasets = Vec::new();
    for field in group.fields() {
        let numbers = match field.native() {
            Some(native) => Some(((native.id >> 8) as u8, (native.id & 0xFF) as u8)),
            None => dataset_number(field.key()),
        };
        let Some((record, dataset)) = numbers else {
            log::warn!("IPTC:{} has no dataset number, not written", field.key());
            continue;
        };
        let format = field.native().map(|native| native.format);
        for item in field.value().items() {
            let payload = dataset_payload(item, format).map_err(|e| format!("IPTC:{}: {e}", field.key()))?;
            datasets.push(((record, dataset), payload));
        }
    }

    // record order, repeats keep their relative order
    datasets.sort_by_key(|(numbers, _)| *numbers);

    let mut iim = Vec::new();
    for ((record, dataset), payload) in datasets {
        push_dataset(&mut iim, record, dataset, &payload);
    }
    Ok(iim)
}

/// Build an APP13 payload from the model's `IPTC` group, keeping every non-IIM
/// resource of `existing`. `None` when the result would carry nothing.
pub(crate) fn encode(model: &MetadataModel, existing: Option<&[u8]>) -> Result<Option<Vec<u8>>, String> {
    let mut out = Vec::new();
    out.extend_from_slice(PHOTOSHOP_HEADER);

    if let Some(data) = existing {
        for resource in resources(data).into_iter().filter(|r| r.id != IIM_RESOURCE) {
            out.extend_from_slice(&data[resource.start..resource.end]);
        }
    }

    let iim = encode_datasets(model)?;
    if !iim.is_empty() {
        out.extend_from_slice(RESOURCE_SIGNATURE);
        out.extend_from_slice(&IIM_RESOURCE.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00]); // empty pascal name, padded
        out.extend_from_slice(&(iim.len() as u32).to_be_bytes());
        out.extend_from_slice(&iim);
        if iim.len() % 2 != 0 {
            out.push(0x00);
        }
    }

    if out.len() == PHOTOSHOP_HEADER.len() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataField;

    fn text(s: &str) -> MetadataValue {
        MetadataValue::Text(s.to_string())
    }

    fn app13_with(resources: &[(u16, &[u8])]) -> Vec<u8> {
        let mut out = PHOTOSHOP_HEADER.to_vec();
        for (id, data) in resources {
            out.extend_from_slice(RESOURCE_SIGNATURE);
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
            if data.len() % 2 != 0 {
                out.push(0);
            }
        }
        out
    }

    fn sample_iim() -> Vec<u8> {
        let mut iim = Vec::new();
        push_dataset(&mut iim, 2, 0, &[0x00, 0x04]);
        push_dataset(&mut iim, 2, 25, b"sea");
        push_dataset(&mut iim, 2, 25, b"sky");
        push_dataset(&mut iim, 2, 90, b"Lisbon");
        push_dataset(&mut iim, 2, 200, b"custom");
        iim
    }

    #[test]
    fn datasets_become_named_fields() {
        let mut model = MetadataModel::new();
        read_into(&mut model, &app13_with(&[(IIM_RESOURCE, sample_iim().as_slice())]));

        let iptc = model.group(GroupKind::Iptc).unwrap();
        assert_eq!(iptc.get("RecordVersion").unwrap().value(), &MetadataValue::Integer(4));
        assert_eq!(iptc.get("City").unwrap().value(), &text("Lisbon"));
        assert_eq!(
            iptc.get("Keywords").unwrap().value(),
            &MetadataValue::List(vec![text("sea"), text("sky")])
        );
        assert_eq!(iptc.get("IIM2:200").unwrap().value(), &text("custom"));
    }

    #[test]
    fn extended_length_is_read() {
        let caption = "x".repeat(40_000);
        let mut iim = Vec::new();
        push_dataset(&mut iim, 2, 120, caption.as_bytes());
        assert_eq!(&iim[3..5], &[0x80, 0x04]);

        let mut model = MetadataModel::new();
        read_into(&mut model, &app13_with(&[(IIM_RESOURCE, &iim)]));
        assert_eq!(
            model.field(GroupKind::Iptc, "Caption-Abstract").unwrap().value(),
            &text(&caption)
        );
    }

    #[test]
    fn truncated_stream_keeps_complete_datasets() {
        let mut iim = sample_iim();
        iim.extend_from_slice(&[TAG_MARKER, 2, 105, 0x00, 0x40, b'a']);

        let mut model = MetadataModel::new();
        read_datasets(&mut model, &iim);
        assert!(model.field(GroupKind::Iptc, "City").is_some());
        assert!(model.field(GroupKind::Iptc, "Headline").is_none());
    }

    #[test]
    fn encode_keeps_foreign_resources() {
        let thumbnail: &[u8] = &[1, 2, 3];
        let source = app13_with(&[(0x040C, thumbnail), (IIM_RESOURCE, sample_iim().as_slice())]);
        let mut model = MetadataModel::new();
        read_into(&mut model, &source);
        let model = crate::editor::delete_field(&model, GroupKind::Iptc, "City");

        let encoded = encode(&model, Some(source.as_slice())).unwrap().unwrap();
        let ids: Vec<u16> = resources(&encoded).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0x040C, IIM_RESOURCE]);

        let mut again = MetadataModel::new();
        read_into(&mut again, &encoded);
        assert_eq!(again, model);
    }

    #[test]
    fn nothing_left_encodes_to_none() {
        let source = app13_with(&[(IIM_RESOURCE, sample_iim().as_slice())]);
        assert!(encode(&MetadataModel::new(), Some(source.as_slice())).unwrap().is_none());
        assert!(encode(&MetadataModel::new(), None).unwrap().is_none());
    }

    #[test]
    fn hand_added_fields_resolve_by_name() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Iptc, MetadataField::new("Headline", text("Breaking")));
        model.insert_field(GroupKind::Iptc, MetadataField::new("Unmapped", text("dropped")));

        let encoded = encode(&model, None).unwrap().unwrap();
        let mut again = MetadataModel::new();
        read_into(&mut again, &encoded);

        let iptc = again.group(GroupKind::Iptc).unwrap();
        assert_eq!(iptc.len(), 1);
        assert_eq!(iptc.get("Headline").unwrap().value(), &text("Breaking"));
    }
}

//! XMP packets, kept whole as a single `XMP:XMPPacket` text field.

use crate::model::{GroupKind, MetadataField, MetadataModel, MetadataValue};

pub(crate) const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
pub(crate) const XMP_EXTENSION_HEADER: &[u8] = b"http://ns.adobe.com/xmp/extension/\0";
/// iTXt keyword used for XMP in PNG.
pub(crate) const PNG_XMP_KEYWORD: &str = "XML:com.adobe.xmp";

pub(crate) const KEY_PACKET: &str = "XMPPacket";

pub(crate) fn read_into(model: &mut MetadataModel, packet: &[u8]) {
    let text = String::from_utf8_lossy(packet);
    let text = text.trim_end_matches('\0');
    if text.trim().is_empty() {
        return;
    }
    model.insert_field(
        GroupKind::Xmp,
        MetadataField::new(KEY_PACKET, MetadataValue::Text(text.to_string())),
    );
}

/// The packet to write back, if the `XMP` group survived editing.
pub(crate) fn packet(model: &MetadataModel) -> Result<Option<&str>, String> {
    match model.field(GroupKind::Xmp, KEY_PACKET) {
        None => Ok(None),
        Some(field) => field
            .value()
            .as_text()
            .map(Some)
            .ok_or_else(|| format!("XMP:{KEY_PACKET} must be text")),
    }
}

/// The APP1 payload carrying `packet` in a JPEG.
pub(crate) fn jpeg_payload(packet: &str) -> Result<Vec<u8>, String> {
    let size = XMP_HEADER.len() + packet.len();
    if size > super::MAX_SEGMENT_PAYLOAD {
        return Err(format!("XMP packet of {} bytes does not fit one JPEG segment", packet.len()));
    }
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(XMP_HEADER);
    out.extend_from_slice(packet.as_bytes());
    Ok(out)
}

//! PNG textual chunks (`tEXt`, `iTXt`) ↔ the `PNG` group.
//!
//! Keywords become field keys. Compressed text (`zTXt`, compressed `iTXt`) is
//! not decoded and is not reported.

use crate::model::{GroupKind, MetadataModel, MetadataValue, NativeTag};

pub(crate) const TEXT: [u8; 4] = *b"tEXt";
pub(crate) const ITXT: [u8; 4] = *b"iTXt";

// NativeTag::format for each chunk type
const FROM_TEXT: u16 = 0;
const FROM_ITXT: u16 = 1;

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn to_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// Keyword and text of a `tEXt` chunk.
pub(crate) fn parse_text(data: &[u8]) -> Option<(String, String)> {
    let nul = data.iter().position(|&b| b == 0)?;
    Some((latin1(&data[..nul]), latin1(&data[nul + 1..])))
}

/// Keyword and text of an uncompressed `iTXt` chunk.
pub(crate) fn parse_itxt(data: &[u8]) -> Option<(String, String)> {
    let nul = data.iter().position(|&b| b == 0)?;
    let keyword = latin1(&data[..nul]);
    let rest = data.get(nul + 1..)?;
    let (&compressed, rest) = rest.split_first()?;
    let (_method, rest) = rest.split_first()?;
    if compressed != 0 {
        log::debug!("Skipping compressed iTXt chunk `{keyword}`");
        return None;
    }
    // language tag, then translated keyword
    let language_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[language_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0)?;
    let text = String::from_utf8_lossy(&rest[translated_end + 1..]).into_owned();
    Some((keyword, text))
}

pub(crate) fn text_chunk(keyword: &str, text: &str) -> Option<Vec<u8>> {
    let mut out = to_latin1(keyword)?;
    out.push(0);
    out.extend(to_latin1(text)?);
    Some(out)
}

pub(crate) fn itxt_chunk(keyword: &str, text: &str) -> Option<Vec<u8>> {
    let mut out = to_latin1(keyword)?;
    // separator, uncompressed, method, empty language, empty translated keyword
    out.extend_from_slice(&[0, 0, 0, 0, 0]);
    out.extend_from_slice(text.as_bytes());
    Some(out)
}

/// Record a textual chunk. Repeated keywords collect into a list.
pub(crate) fn read_chunk(model: &mut MetadataModel, kind: [u8; 4], data: &[u8]) {
    let (parsed, format) = match kind {
        TEXT => (parse_text(data), FROM_TEXT),
        ITXT => (parse_itxt(data), FROM_ITXT),
        _ => return,
    };
    let Some((keyword, text)) = parsed else {
        return;
    };
    if keyword.is_empty() {
        log::debug!("Skipping text chunk without keyword");
        return;
    }
    let native = NativeTag { id: 0, format };
    model.append_value(GroupKind::Png, &keyword, MetadataValue::Text(text), Some(native));
}

fn valid_keyword(keyword: &str) -> bool {
    (1..=79).contains(&keyword.len()) && !keyword.contains('\0')
}

/// Build the textual chunks for the `PNG` group, one per value.
///
/// Values that came from `tEXt` and still fit Latin-1 are written back as
/// `tEXt`, everything else as `iTXt`.
pub(crate) fn encode_chunks(model: &MetadataModel) -> Result<Vec<([u8; 4], Vec<u8>)>, String> {
    let Some(group) = model.group(GroupKind::Png) else {
        return Ok(Vec::new());
    };

    let mut chunks = Vec::new();
    for field in group.fields() {
        let keyword = field.key();
        if !valid_keyword(keyword) || to_latin1(keyword).is_none() {
            log::warn!("PNG:{keyword} is not a valid PNG keyword, not written");
            continue;
        }
        let prefer_itxt = field.native().is_some_and(|native| native.format == FROM_ITXT);
        for item in field.value().items() {
            let text = match item {
                MetadataValue::Text(text) => text.clone(),
                MetadataValue::Bytes(_) => return Err(format!("PNG:{keyword} holds binary data")),
                other => other.to_string(),
            };
            let latin = if prefer_itxt { None } else { text_chunk(keyword, &text) };
            let chunk = match latin {
                Some(data) => (TEXT, data),
                None => (
                    ITXT,
                    itxt_chunk(keyword, &text).ok_or_else(|| format!("PNG:{keyword} cannot be encoded"))?,
                ),
            };
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetadataField;

    #[test]
    fn text_chunk_is_latin1() {
        let data = b"Author\0Jos\xe9";
        assert_eq!(parse_text(data), Some(("Author".into(), "José".into())));
        assert_eq!(text_chunk("Author", "José").unwrap(), data);
    }

    #[test]
    fn itxt_uncompressed_only() {
        let data = itxt_chunk("Comment", "héllo ✓").unwrap();
        assert_eq!(parse_itxt(&data), Some(("Comment".into(), "héllo ✓".into())));

        let compressed = b"Comment\0\x01\x00\0\0x\x9c";
        assert_eq!(parse_itxt(compressed), None);
    }

    #[test]
    fn repeated_keywords_collect() {
        let mut model = MetadataModel::new();
        read_chunk(&mut model, TEXT, b"Comment\0one");
        read_chunk(&mut model, TEXT, b"Comment\0two");
        read_chunk(&mut model, *b"zTXt", b"Comment\0\0x");

        assert_eq!(
            model.field(GroupKind::Png, "Comment").unwrap().value(),
            &MetadataValue::List(vec![
                MetadataValue::Text("one".into()),
                MetadataValue::Text("two".into())
            ])
        );
    }

    #[test]
    fn encode_picks_chunk_type() {
        let mut model = MetadataModel::new();
        read_chunk(&mut model, TEXT, b"Title\0Sunset");
        read_chunk(&mut model, ITXT, &itxt_chunk("Description", "Plain").unwrap());
        model.insert_field(GroupKind::Png, MetadataField::new("Author", MetadataValue::Text("Zoë ✓".into())));

        let chunks = encode_chunks(&model).unwrap();
        let kinds: Vec<[u8; 4]> = chunks.iter().map(|(kind, _)| *kind).collect();
        // Author, Description, Title
        assert_eq!(kinds, vec![ITXT, ITXT, TEXT]);

        let mut again = MetadataModel::new();
        for (kind, data) in &chunks {
            read_chunk(&mut again, *kind, data);
        }
        assert_eq!(
            again.field(GroupKind::Png, "Author").unwrap().value(),
            &MetadataValue::Text("Zoë ✓".into())
        );
    }

    #[test]
    fn invalid_keywords_are_skipped() {
        let mut model = MetadataModel::new();
        model.insert_field(GroupKind::Png, MetadataField::new("x".repeat(80), MetadataValue::Text("v".into())));
        assert!(encode_chunks(&model).unwrap().is_empty());
    }
}

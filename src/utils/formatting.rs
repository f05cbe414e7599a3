use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::{Tag, VR};

const MAX_VALUE_LEN: usize = 96;
const MEBIBYTE: f64 = 1024.0 * 1024.0;

/// Byte count as mebibytes with two decimals, e.g. `200.00MB`.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / MEBIBYTE)
}

pub fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// Renders an element value for the metadata panel. Binary payloads and
/// sequences are summarized rather than printed.
pub fn value_to_string<I, P>(value: &Value<I, P>, vr: VR) -> String {
    let rendered = match value {
        Value::Primitive(PrimitiveValue::Empty) => String::from("(empty)"),
        Value::Primitive(primitive) if is_binary_vr(vr) => {
            format!("Binary data ({} bytes)", primitive.calculate_byte_len())
        }
        Value::Primitive(PrimitiveValue::Tags(tags)) => tags
            .iter()
            .map(|tag| format_tag(*tag))
            .collect::<Vec<_>>()
            .join("\\"),
        Value::Primitive(primitive) => primitive.to_str().trim_end_matches('\0').to_string(),
        Value::Sequence(sequence) => plural(sequence.multiplicity() as usize, "item"),
        Value::PixelSequence(sequence) => {
            format!("Pixel data, {}", plural(sequence.fragments().len(), "fragment"))
        }
    };

    truncate(rendered)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn truncate(rendered: String) -> String {
    if rendered.chars().count() <= MAX_VALUE_LEN {
        return rendered;
    }
    let mut truncated: String = rendered.chars().take(MAX_VALUE_LEN).collect();
    truncated.push('…');
    truncated
}

fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::object::InMemDicomObject;

    #[test]
    fn megabytes_have_two_decimals() {
        assert_eq!(format_megabytes(200 * 1024 * 1024), "200.00MB");
        assert_eq!(format_megabytes(200 * 1024 * 1024 + 1), "200.00MB");
        assert_eq!(format_megabytes(512 * 1024), "0.50MB");
    }

    #[test]
    fn tags_are_hex_pairs() {
        assert_eq!(format_tag(Tag(0x0028, 0x0008)), "(0028,0008)");
    }

    #[test]
    fn long_values_are_truncated() {
        let value: Value<InMemDicomObject, Vec<u8>> =
            Value::Primitive(PrimitiveValue::from("x".repeat(200)));
        let rendered = value_to_string(&value, VR::LO);
        assert_eq!(rendered.chars().count(), MAX_VALUE_LEN + 1);
        assert!(rendered.ends_with('…'));
    }

    #[test]
    fn binary_values_are_summarized() {
        let value: Value<InMemDicomObject, Vec<u8>> =
            Value::Primitive(PrimitiveValue::U8(vec![1, 2, 3, 4].into()));
        assert_eq!(value_to_string(&value, VR::OB), "Binary data (4 bytes)");
    }
}

use crate::error::{RecordError, Result};
use crate::record::RecordBuf;
use crate::schema::FieldTable;
use crate::types::*;
use crate::value::Value;
use crate::view::decode_view;
use smol_str::SmolStr;

/// One decoded occurrence. Nested buffers are not decoded here: the caller
/// decides whether to open a view over them or convert them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Decoded {
    Value(Value),
    /// Absolute span of an embedded buffer inside the root buffer.
    Embedded(Span),
    Pointer(BufferHandle),
}

#[inline]
fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.try_into()
        .map_err(|_| RecordError::Corruption("occurrence size does not match field type"))
}

/// Decode `raw`, read from a record that starts at `base` in its root
/// buffer.
pub(crate) fn decode_occurrence(
    table: &FieldTable,
    raw: &RawOccurrence<'_>,
    base: usize,
) -> Result<Decoded> {
    let data = raw.data;
    let value = match raw.field_id.field_type() {
        FieldType::Char => Value::Char(fixed::<1>(data)?[0]),
        FieldType::Short => Value::Int(i16::from_le_bytes(fixed(data)?) as i64),
        FieldType::Long => Value::Int(i64::from_le_bytes(fixed(data)?)),
        FieldType::Float => Value::Float(f32::from_le_bytes(fixed(data)?) as f64),
        FieldType::Double => Value::Float(f64::from_le_bytes(fixed(data)?)),
        FieldType::String => Value::Str(SmolStr::from(
            std::str::from_utf8(data)
                .map_err(|_| RecordError::Corruption("string occurrence is not UTF-8"))?,
        )),
        FieldType::Carray => Value::Bytes(data.to_vec()),
        FieldType::View => Value::View(decode_view(table, data)?),
        FieldType::Ubf => {
            RecordBuf::new(data)?;
            return Ok(Decoded::Embedded(Span {
                start: base + raw.data_offset,
                len: data.len(),
            }));
        }
        FieldType::Ptr => {
            let bits = u64::from_le_bytes(fixed::<PTR_DATA_SIZE>(data)?);
            return Ok(Decoded::Pointer(BufferHandle::from_bits(bits)));
        }
    };
    Ok(Decoded::Value(value))
}

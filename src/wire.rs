//! Length-prefixed wire format of the blackbox payload.
//!
//! Layout: `hex4(count)` followed by `hex4(keyLen) KEY hex4(valLen) value` for
//! every field. Keys are upper-cased, values keep their case, lengths count
//! characters and are written as 4 lowercase hex digits.

use crate::error::{Result, SnareError};
use crate::models::Field;

/// Upper bound on the serialized payload, in characters.
pub const MAX_SERIALIZED_SIZE: usize = 4000;

/// Width of every hex length prefix.
const PREFIX_WIDTH: usize = 4;

/// Serialize fields into the snare.js wire format.
///
/// Empty values are skipped. The count prefix covers every non-empty field,
/// even those later cut off by [`MAX_SERIALIZED_SIZE`]: once a field would
/// overflow the budget, it and everything after it are dropped.
pub fn serialize_fields(fields: &[Field]) -> String {
    let present: Vec<&Field> = fields.iter().filter(|f| !f.value.is_empty()).collect();

    let mut out = format!("{:04x}", present.len());
    let mut total = PREFIX_WIDTH;

    for field in present {
        let key = field.key.to_uppercase();
        let key_len = key.chars().count();
        let value_len = field.value.chars().count();

        let entry_len = PREFIX_WIDTH + key_len + PREFIX_WIDTH + value_len;
        if total + entry_len > MAX_SERIALIZED_SIZE {
            tracing::debug!(key = %key, total, "serialized payload cap reached");
            break;
        }

        out.push_str(&format!("{:04x}", key_len));
        out.push_str(&key);
        out.push_str(&format!("{:04x}", value_len));
        out.push_str(&field.value);
        total += entry_len;
    }

    out
}

/// Parse a wire payload back into fields.
///
/// Stops at the declared count or at the end of input, whichever comes first,
/// so payloads truncated by the size cap still decode.
pub fn deserialize_fields(wire: &str) -> Result<Vec<Field>> {
    let chars: Vec<char> = wire.chars().collect();
    let mut cursor = Cursor { chars: &chars, pos: 0 };

    let count = cursor.read_len()?;
    let mut fields = Vec::with_capacity(count.min(64));

    while fields.len() < count && !cursor.is_empty() {
        let key_len = cursor.read_len()?;
        let key = cursor.read_str(key_len)?;
        let value_len = cursor.read_len()?;
        let value = cursor.read_str(value_len)?;
        fields.push(Field { key, value });
    }

    Ok(fields)
}

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
}

impl Cursor<'_> {
    fn is_empty(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn read_str(&mut self, len: usize) -> Result<String> {
        let end = self.pos + len;
        let slice = self.chars.get(self.pos..end).ok_or_else(|| {
            SnareError::MalformedBlackbox(format!(
                "field of {} chars overruns payload at offset {}",
                len, self.pos
            ))
        })?;
        self.pos = end;
        Ok(slice.iter().collect())
    }

    fn read_len(&mut self) -> Result<usize> {
        let offset = self.pos;
        let digits = self.read_str(PREFIX_WIDTH)?;
        usize::from_str_radix(&digits, 16).map_err(|_| {
            SnareError::MalformedBlackbox(format!(
                "invalid length prefix {:?} at offset {}",
                digits, offset
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_fields() {
        let fields = vec![Field::new("JENBL", "1"), Field::new("UAGT", "TestAgent")];

        assert_eq!(
            serialize_fields(&fields),
            "00020005JENBL000110004UAGT0009TestAgent"
        );
    }

    #[test]
    fn test_serialize_uppercases_keys() {
        let fields = vec![Field::new("jlang", "en-US")];
        assert_eq!(serialize_fields(&fields), "00010005JLANG0005en-US");
    }

    #[test]
    fn test_serialize_skips_empty_values() {
        let fields = vec![
            Field::new("JENBL", "1"),
            Field::new("JREFRR", ""),
            Field::new("UAGT", "TestAgent"),
        ];

        assert_eq!(
            serialize_fields(&fields),
            "00020005JENBL000110004UAGT0009TestAgent"
        );
    }

    #[test]
    fn test_serialize_keeps_duplicates_in_order() {
        let fields = vec![Field::new("A", "1"), Field::new("B", "2"), Field::new("A", "3")];
        assert_eq!(
            serialize_fields(&fields),
            "00030001A000110001B000120001A00013"
        );
    }

    #[test]
    fn test_serialize_cap_drops_tail_but_keeps_count() {
        // Each big block is 4 + 3 + 4 + 1980 = 1991 chars.
        let big = "x".repeat(1980);
        let fields = vec![
            Field::new("ONE", big.clone()),
            Field::new("TWO", big.clone()),
            Field::new("THR", big),
            Field::new("TINY", "1"),
        ];

        let wire = serialize_fields(&fields);

        // Count still says 4 although only ONE and TWO fit.
        assert!(wire.starts_with("0004"));
        assert_eq!(wire.len(), 4 + 2 * (4 + 3 + 4 + 1980));
        assert!(wire.len() <= MAX_SERIALIZED_SIZE);
        assert!(!wire.contains("THR"));
        // TINY would fit on its own but comes after the overflow.
        assert!(!wire.contains("TINY"));
    }

    #[test]
    fn test_serialize_cap_is_inclusive() {
        // 4 (count) + 4 + 1 + 4 + 3987 = 4000
        let fits = vec![Field::new("A", "x".repeat(3987))];
        let wire = serialize_fields(&fits);
        assert_eq!(wire.len(), MAX_SERIALIZED_SIZE);
        assert_eq!(deserialize_fields(&wire).unwrap(), fits);

        let overflows = vec![Field::new("A", "x".repeat(3988))];
        assert_eq!(serialize_fields(&overflows), "0001");
    }

    #[test]
    fn test_serialize_lengths_count_chars() {
        let fields = vec![Field::new("JLANG", "zé")];
        assert_eq!(serialize_fields(&fields), "00010005JLANG0002zé");
    }

    #[test]
    fn test_deserialize_fields() {
        let fields = deserialize_fields("00020005JENBL000110004UAGT0009TestAgent").unwrap();
        assert_eq!(
            fields,
            vec![Field::new("JENBL", "1"), Field::new("UAGT", "TestAgent")]
        );
    }

    #[test]
    fn test_deserialize_recovers_uppercased_keys() {
        let fields = vec![
            Field::new("intloc", "https://example.com/checkout"),
            Field::new("Jint", "form"),
        ];

        let parsed = deserialize_fields(&serialize_fields(&fields)).unwrap();
        assert_eq!(
            parsed,
            vec![
                Field::new("INTLOC", "https://example.com/checkout"),
                Field::new("JINT", "form"),
            ]
        );
    }

    #[test]
    fn test_deserialize_truncated_payload() {
        let big = "x".repeat(MAX_SERIALIZED_SIZE);
        let wire = serialize_fields(&[Field::new("SMALL", "1"), Field::new("BIG", big)]);

        let parsed = deserialize_fields(&wire).unwrap();
        assert_eq!(parsed, vec![Field::new("SMALL", "1")]);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(deserialize_fields("zz").is_err());
        assert!(deserialize_fields("00010005JEN").is_err());
        assert!(deserialize_fields("0001zzzzJENBL00011").is_err());
    }
}

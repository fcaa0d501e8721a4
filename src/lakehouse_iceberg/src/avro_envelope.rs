//! The simplified Avro-shaped envelope the generator writes (spec.md §6):
//! magic `Obj\x01`, a length-prefixed schema name, zero padding to exactly
//! 128 bytes, then the serialized JSON body. spec.md §9 flags the wire
//! format as an open question; see DESIGN.md for the decision to keep the
//! JSON placeholder rather than emit true block-framed Avro binary.

pub const MAGIC: &[u8; 4] = b"Obj\x01";
pub const ENVELOPE_LEN: usize = 128;

/// Wraps `body` (already-serialized JSON bytes) in the fixed 128-byte header
/// described by spec.md §6, followed by the body.
pub fn wrap(schema_name: &str, body: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(ENVELOPE_LEN);
    header.extend_from_slice(MAGIC);
    let schema_bytes = schema_name.as_bytes();
    header.extend_from_slice(&(schema_bytes.len() as u32).to_be_bytes());
    header.extend_from_slice(schema_bytes);
    if header.len() > ENVELOPE_LEN {
        header.truncate(ENVELOPE_LEN);
    } else {
        header.resize(ENVELOPE_LEN, 0);
    }

    let mut out = header;
    out.extend_from_slice(body);
    out
}

/// Splits a previously-`wrap`ped buffer back into `(schema_name, body)`.
pub fn unwrap(data: &[u8]) -> Option<(String, &[u8])> {
    if data.len() < ENVELOPE_LEN || &data[0..4] != MAGIC {
        return None;
    }
    let len = u32::from_be_bytes(data[4..8].try_into().ok()?) as usize;
    if 8 + len > ENVELOPE_LEN {
        return None;
    }
    let schema_name = String::from_utf8(data[8..8 + len].to_vec()).ok()?;
    Some((schema_name, &data[ENVELOPE_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_schema_name_and_body() {
        let body = br#"{"hello":"world"}"#;
        let wrapped = wrap("manifest_entry", body);
        assert_eq!(wrapped.len(), ENVELOPE_LEN + body.len());
        let (name, unwrapped_body) = unwrap(&wrapped).unwrap();
        assert_eq!(name, "manifest_entry");
        assert_eq!(unwrapped_body, body);
    }

    #[test]
    fn header_is_exactly_128_bytes() {
        let wrapped = wrap("s", b"");
        assert_eq!(&wrapped[0..ENVELOPE_LEN].len(), &ENVELOPE_LEN);
        assert_eq!(&wrapped[0..4], MAGIC);
    }
}

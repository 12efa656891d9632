//! Byte cursor and metadata key-value decoding.

use serde::{Deserialize, Serialize};

use crate::error::{GgufError, Result};

const MAX_KEY_LEN: u64 = 1024 * 1024; // 1 MiB
const MAX_STR_LEN: u64 = 10 * 1024 * 1024; // 10 MiB
/// Array-valued KVs keep at most this many items; the rest are skipped so
/// later KVs still decode.
const ARRAY_SAMPLE_LIMIT: usize = 256;

const KV_TYPE_STRING: u32 = 8;
const KV_TYPE_ARRAY: u32 = 9;

/// Forward-only reader over the bytes of a GGUF file.
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: u64) -> Result<&'a [u8]> {
        let end = usize::try_from(n)
            .ok()
            .and_then(|n| self.pos.checked_add(n))
            .filter(|&end| end <= self.data.len())
            .ok_or(GgufError::Truncated { offset: self.pos, needed: n, len: self.data.len() })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N as u64)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string_with_limit(&mut self, limit: u64) -> Result<String> {
        let len = self.u64()?;
        if len > limit {
            return Err(GgufError::StringTooLarge(len));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| GgufError::Malformed("non-UTF-8 string"))
    }

    pub(crate) fn string(&mut self) -> Result<String> {
        self.string_with_limit(MAX_STR_LEN)
    }

    pub(crate) fn key(&mut self) -> Result<String> {
        self.string_with_limit(MAX_KEY_LEN)
    }
}

/// A decoded metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GgufValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
    String(String),
    /// At most 256 leading items of the array.
    Array(Vec<GgufValue>),
    U64(u64),
    I64(i64),
    F64(f64),
}

impl GgufValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value widened to `u64`, for any non-negative integer variant.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::U64(v) => Some(v),
            Self::I8(v) => u64::try_from(v).ok(),
            Self::I16(v) => u64::try_from(v).ok(),
            Self::I32(v) => u64::try_from(v).ok(),
            Self::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

/// A key-value pair from the GGUF metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgufKv {
    pub key: String,
    pub value: GgufValue,
}

fn scalar_size_bytes(ty: u32) -> Option<u64> {
    match ty {
        0 | 1 | 7 => Some(1),
        2 | 3 => Some(2),
        4..=6 => Some(4),
        10..=12 => Some(8),
        _ => None,
    }
}

fn read_scalar(r: &mut Cursor<'_>, ty: u32) -> Result<GgufValue> {
    Ok(match ty {
        0 => GgufValue::U8(r.u8()?),
        1 => GgufValue::I8(i8::from_le_bytes(r.array()?)),
        2 => GgufValue::U16(u16::from_le_bytes(r.array()?)),
        3 => GgufValue::I16(i16::from_le_bytes(r.array()?)),
        4 => GgufValue::U32(r.u32()?),
        5 => GgufValue::I32(i32::from_le_bytes(r.array()?)),
        6 => GgufValue::F32(f32::from_le_bytes(r.array()?)),
        7 => GgufValue::Bool(r.u8()? != 0),
        10 => GgufValue::U64(r.u64()?),
        11 => GgufValue::I64(i64::from_le_bytes(r.array()?)),
        12 => GgufValue::F64(f64::from_le_bytes(r.array()?)),
        _ => return Err(GgufError::InvalidKvType(ty)),
    })
}

fn read_array(r: &mut Cursor<'_>) -> Result<Vec<GgufValue>> {
    let elem_ty = r.u32()?;
    let len = r.u64()?;
    let keep = usize::try_from(len).unwrap_or(usize::MAX).min(ARRAY_SAMPLE_LIMIT);
    let mut out = Vec::with_capacity(keep);

    if elem_ty == KV_TYPE_STRING {
        for i in 0..len {
            if (i as usize) < keep {
                out.push(GgufValue::String(r.string()?));
            } else {
                let slen = r.u64()?;
                if slen > MAX_STR_LEN {
                    return Err(GgufError::StringTooLarge(slen));
                }
                r.take(slen)?;
            }
        }
        return Ok(out);
    }

    let size = scalar_size_bytes(elem_ty).ok_or(GgufError::InvalidKvType(elem_ty))?;
    for _ in 0..keep {
        out.push(read_scalar(r, elem_ty)?);
    }
    let rest = (len - keep as u64)
        .checked_mul(size)
        .ok_or(GgufError::Malformed("array length overflows"))?;
    r.take(rest)?;
    Ok(out)
}

/// Decode one key-value pair at the cursor.
pub(crate) fn read_kv(r: &mut Cursor<'_>) -> Result<GgufKv> {
    let key = r.key()?;
    let value = match r.u32()? {
        KV_TYPE_STRING => GgufValue::String(r.string()?),
        KV_TYPE_ARRAY => GgufValue::Array(read_array(r)?),
        ty => read_scalar(r, ty)?,
    };
    Ok(GgufKv { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_bytes(key: &str, ty: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.extend_from_slice(&ty.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn reads_scalar_kv() {
        let bytes = kv_bytes("general.alignment", 4, &64u32.to_le_bytes());
        let kv = read_kv(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(kv.key, "general.alignment");
        assert_eq!(kv.value, GgufValue::U32(64));
        assert_eq!(kv.value.as_u64(), Some(64));
    }

    #[test]
    fn reads_string_kv() {
        let mut payload = 5u64.to_le_bytes().to_vec();
        payload.extend_from_slice(b"llama");
        let bytes = kv_bytes("general.architecture", KV_TYPE_STRING, &payload);
        let kv = read_kv(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(kv.value.as_str(), Some("llama"));
    }

    #[test]
    fn long_arrays_are_sampled_and_fully_consumed() {
        let mut payload = 4u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&300u64.to_le_bytes());
        for i in 0..300u32 {
            payload.extend_from_slice(&i.to_le_bytes());
        }
        let mut bytes = kv_bytes("tokenizer.ids", KV_TYPE_ARRAY, &payload);
        bytes.push(0xAB);

        let mut cursor = Cursor::new(&bytes);
        let kv = read_kv(&mut cursor).unwrap();
        let GgufValue::Array(items) = kv.value else { panic!("expected array") };
        assert_eq!(items.len(), ARRAY_SAMPLE_LIMIT);
        assert_eq!(items[255], GgufValue::U32(255));
        assert_eq!(cursor.u8().unwrap(), 0xAB);
    }

    #[test]
    fn string_arrays_are_read() {
        let mut payload = KV_TYPE_STRING.to_le_bytes().to_vec();
        payload.extend_from_slice(&2u64.to_le_bytes());
        for s in ["a", "bc"] {
            payload.extend_from_slice(&(s.len() as u64).to_le_bytes());
            payload.extend_from_slice(s.as_bytes());
        }
        let bytes = kv_bytes("tokenizer.tokens", KV_TYPE_ARRAY, &payload);
        let kv = read_kv(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(
            kv.value,
            GgufValue::Array(vec![GgufValue::String("a".into()), GgufValue::String("bc".into())])
        );
    }

    #[test]
    fn invalid_type_is_rejected() {
        let bytes = kv_bytes("k", 99, &[]);
        assert!(matches!(read_kv(&mut Cursor::new(&bytes)), Err(GgufError::InvalidKvType(99))));
    }

    #[test]
    fn oversize_string_is_rejected() {
        let bytes = kv_bytes("k", KV_TYPE_STRING, &u64::MAX.to_le_bytes());
        assert!(matches!(read_kv(&mut Cursor::new(&bytes)), Err(GgufError::StringTooLarge(_))));
    }

    #[test]
    fn truncated_value_is_reported() {
        let bytes = kv_bytes("k", 10, &[1, 2, 3]);
        assert!(matches!(read_kv(&mut Cursor::new(&bytes)), Err(GgufError::Truncated { .. })));
    }

    proptest::proptest! {
        #[test]
        fn read_kv_never_panics(data in proptest::collection::vec(0u8..=255, 0..64)) {
            let _ = read_kv(&mut Cursor::new(&data));
        }
    }
}

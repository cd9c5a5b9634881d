//! Avro binary primitives used by the message header.

use std::collections::BTreeMap;

use crate::codec::CodecError;
use crate::messages::DataValue;

const NULL_BRANCH: i64 = 0;
const BOOLEAN_BRANCH: i64 = 1;
const INT_BRANCH: i64 = 2;
const LONG_BRANCH: i64 = 3;
const DOUBLE_BRANCH: i64 = 5;
const STRING_BRANCH: i64 = 16;
const BYTES_BRANCH: i64 = 17;

pub fn write_long(out: &mut Vec<u8>, value: i64) {
    let mut n = ((value << 1) ^ (value >> 63)) as u64;
    while n & !0x7F != 0 {
        out.push(((n & 0x7F) | 0x80) as u8);
        n >>= 7;
    }
    out.push(n as u8);
}

pub fn write_int(out: &mut Vec<u8>, value: i32) {
    write_long(out, i64::from(value));
}

pub fn read_long(input: &mut &[u8]) -> Result<i64, CodecError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let (&byte, rest) = input.split_first().ok_or(CodecError::Truncated)?;
        *input = rest;
        // The tenth byte holds only the top bit of a 64-bit value.
        if shift == 63 && byte > 1 {
            return Err(CodecError::InvalidVarint);
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
}

pub fn read_int(input: &mut &[u8]) -> Result<i32, CodecError> {
    let value = read_long(input)?;
    i32::try_from(value).map_err(|_| CodecError::OutOfRange(value, "int"))
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

pub fn read_bytes<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = read_long(input)?;
    let len = usize::try_from(len).map_err(|_| CodecError::OutOfRange(len, "length"))?;
    if len > input.len() {
        return Err(CodecError::Truncated);
    }
    let (bytes, rest) = input.split_at(len);
    *input = rest;
    Ok(bytes)
}

pub fn write_string(out: &mut Vec<u8>, value: &str) {
    write_bytes(out, value.as_bytes());
}

pub fn read_string(input: &mut &[u8]) -> Result<String, CodecError> {
    let bytes = read_bytes(input)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8)
}

fn read_fixed<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], CodecError> {
    if input.len() < N {
        return Err(CodecError::Truncated);
    }
    let (head, rest) = input.split_at(N);
    *input = rest;
    let mut buf = [0u8; N];
    buf.copy_from_slice(head);
    Ok(buf)
}

pub fn write_data_value(out: &mut Vec<u8>, value: &DataValue) {
    match value {
        DataValue::Null => write_long(out, NULL_BRANCH),
        DataValue::Boolean(v) => {
            write_long(out, BOOLEAN_BRANCH);
            out.push(u8::from(*v));
        }
        DataValue::Int(v) => {
            write_long(out, INT_BRANCH);
            write_int(out, *v);
        }
        DataValue::Long(v) => {
            write_long(out, LONG_BRANCH);
            write_long(out, *v);
        }
        DataValue::Double(v) => {
            write_long(out, DOUBLE_BRANCH);
            out.extend_from_slice(&v.to_le_bytes());
        }
        DataValue::String(v) => {
            write_long(out, STRING_BRANCH);
            write_string(out, v);
        }
        DataValue::Bytes(v) => {
            write_long(out, BYTES_BRANCH);
            write_bytes(out, v);
        }
    }
}

pub fn read_data_value(input: &mut &[u8]) -> Result<DataValue, CodecError> {
    let branch = read_long(input)?;
    let value = match branch {
        NULL_BRANCH => DataValue::Null,
        BOOLEAN_BRANCH => {
            let [byte] = read_fixed::<1>(input)?;
            DataValue::Boolean(byte != 0)
        }
        INT_BRANCH => DataValue::Int(read_int(input)?),
        LONG_BRANCH => DataValue::Long(read_long(input)?),
        DOUBLE_BRANCH => DataValue::Double(f64::from_le_bytes(read_fixed::<8>(input)?)),
        STRING_BRANCH => DataValue::String(read_string(input)?),
        BYTES_BRANCH => DataValue::Bytes(read_bytes(input)?.to_vec()),
        other => return Err(CodecError::UnsupportedUnionBranch(other)),
    };
    Ok(value)
}

/// Writes a map as a single block followed by the zero terminator.
pub fn write_map(out: &mut Vec<u8>, map: &BTreeMap<String, DataValue>) {
    if !map.is_empty() {
        write_long(out, map.len() as i64);
        for (key, value) in map {
            write_string(out, key);
            write_data_value(out, value);
        }
    }
    write_long(out, 0);
}

pub fn read_map(input: &mut &[u8]) -> Result<BTreeMap<String, DataValue>, CodecError> {
    let mut map = BTreeMap::new();
    loop {
        let mut count = read_long(input)?;
        if count == 0 {
            break;
        }
        if count < 0 {
            count = count.checked_neg().ok_or(CodecError::InvalidVarint)?;
            // Negative counts are followed by the block size in bytes.
            read_long(input)?;
        }
        for _ in 0..count {
            let key = read_string(input)?;
            let value = read_data_value(input)?;
            map.insert(key, value);
        }
    }
    Ok(map)
}

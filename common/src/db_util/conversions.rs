//! Safe-ish conversions between rust and sql types.

use super::*;

pub fn i64_to_u64(i: i64) -> Result<u64> {
    u64::try_from(i).map_err(|_| anyhow!("i64 value {i} is negative and cannot be converted to u64"))
}
pub fn u64_to_i64(i: u64) -> Result<i64> {
    i64::try_from(i).map_err(|_| anyhow!("u64 value {i} exceeds i64::MAX"))
}

pub fn i32_to_u32(i: i32) -> Result<u32> {
    u32::try_from(i).map_err(|_| anyhow!("i32 value {i} is negative and cannot be converted to u32"))
}
pub fn u32_to_i32(i: u32) -> Result<i32> {
    i32::try_from(i).map_err(|_| anyhow!("u32 value {i} exceeds i32::MAX"))
}

pub fn u64s_to_i64s(ids: &HashSet<u64>) -> Result<Vec<i64>> {
    ids.iter().map(|i| u64_to_i64(*i)).collect()
}
pub fn i64s_to_u64s(ids: Vec<i64>) -> Result<HashSet<u64>> {
    ids.into_iter().map(i64_to_u64).collect()
}

pub fn deserialize_field_name(i: &str) -> Result<FieldName> {
    Ok(i.parse::<FieldName>()?)
}
pub fn serialize_field_name(i: FieldName) -> String {
    i.as_str().to_string()
}

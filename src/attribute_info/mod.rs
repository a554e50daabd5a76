mod types;

pub use types::*;

use std::io::Cursor;

use binrw::{BinResult, BinWrite};

/// Serialize a typed attribute payload and wrap it with its name index.
pub fn to_attribute<T>(name_index: u16, payload: &T) -> BinResult<AttributeInfo>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    payload.write_be(&mut cursor)?;
    let info = cursor.into_inner();
    Ok(AttributeInfo {
        attribute_name_index: name_index,
        attribute_length: info.len() as u32,
        info,
    })
}

mod pool;
mod types;

pub use pool::ConstantPool;
pub use types::*;

use binrw::{BinRead, BinResult, BinWrite};

/// Read `count - 1` pool slots, inserting `Unusable` after wide constants so
/// that vector position `i` holds pool index `i + 1`.
#[binrw::parser(reader, endian)]
pub fn read_const_pool(count: u16) -> BinResult<Vec<ConstantInfo>> {
    let mut pool = Vec::with_capacity(count as usize);
    let mut slot = 1u16;
    while slot < count {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        pool.push(entry);
        slot += 1;
        if wide {
            pool.push(ConstantInfo::Unusable);
            slot += 1;
        }
    }
    Ok(pool)
}

#[binrw::writer(writer, endian)]
pub fn write_const_pool(pool: &Vec<ConstantInfo>) -> BinResult<()> {
    for entry in pool {
        if !matches!(entry, ConstantInfo::Unusable) {
            entry.write_options(writer, endian, ())?;
        }
    }
    Ok(())
}

fn entry_at(pool: &[ConstantInfo], index: u16) -> Option<&ConstantInfo> {
    if index == 0 {
        return None;
    }
    pool.get(index as usize - 1)
}

pub fn utf8_at(pool: &[ConstantInfo], index: u16) -> Option<String> {
    match entry_at(pool, index)? {
        ConstantInfo::Utf8(utf8) => Some(utf8.value()),
        _ => None,
    }
}

pub fn class_name_at(pool: &[ConstantInfo], index: u16) -> Option<String> {
    match entry_at(pool, index)? {
        ConstantInfo::Class(class) => utf8_at(pool, class.name_index),
        _ => None,
    }
}

//! Binary framing on top of the opaque DB primitive (§4.5): magic numbers,
//! version negotiation, and the per-object/master file layouts.

use std::path::Path;

use super::db::{
    DbReadError,
    SecretDbReader,
    SecretDbWriter,
};
use crate::{
    entry::Entry,
    error::{
        HistoryError,
        Result,
    },
    log::Log,
    tags::MessageTag,
};

pub const MAGIC_FILE_START: u32 = 0xFEFE_FEFE;
pub const MAGIC_FILE_END: u32 = 0xEFEF_EFEF;
pub const MAGIC_ENTRY_START: u32 = 0xFFFF_FFFF;
pub const MAGIC_ENTRY_END: u32 = 0xEEEE_EEEE;

pub const CURRENT_VERSION: u32 = 5000;
pub const MIN_SUPPORTED_VERSION: u32 = 4999;

fn corrupt(path: &Path, reason: impl Into<String>) -> HistoryError {
    HistoryError::corrupt(path, reason)
}

fn map_read_err(path: &Path, e: DbReadError) -> HistoryError {
    corrupt(path, e.to_string())
}

pub struct MasterFile {
    pub version: u32,
    pub prehash: String,
    pub posthash: String,
}

pub fn write_master(writer: &mut SecretDbWriter, prehash: &str, posthash: &str) {
    writer.write_u32(CURRENT_VERSION);
    writer.write_string(Some(prehash));
    writer.write_string(Some(posthash));
}

pub fn read_master(reader: &mut SecretDbReader, path: &Path) -> Result<MasterFile> {
    let version = reader.read_u32().map_err(|e| map_read_err(path, e))?;
    let prehash = reader
        .read_string()
        .map_err(|e| map_read_err(path, e))?
        .ok_or_else(|| corrupt(path, "master file prehash is null"))?;
    let posthash = reader
        .read_string()
        .map_err(|e| map_read_err(path, e))?
        .ok_or_else(|| corrupt(path, "master file posthash is null"))?;
    if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(HistoryError::config_invalid(
            "UnsupportedMasterVersion",
            format!(
                "master file version {version} is outside the supported range \
                 [{MIN_SUPPORTED_VERSION}, {CURRENT_VERSION}]"
            ),
        ));
    }
    Ok(MasterFile {
        version,
        prehash,
        posthash,
    })
}

/// Parsed contents of a per-object file, before being matched against a
/// live `Log` (§4.5's load algorithm does that matching; this module only
/// decodes bytes).
pub struct ParsedObjectFile {
    pub prehash: String,
    pub posthash: String,
    pub object_name: String,
    pub max_lines: u64,
    pub max_time: u64,
    pub entries: Vec<Entry>,
}

pub fn write_object_file(writer: &mut SecretDbWriter, prehash: &str, posthash: &str, log: &Log) {
    writer.write_u32(MAGIC_FILE_START);
    writer.write_u32(CURRENT_VERSION);
    writer.write_string(Some(prehash));
    writer.write_string(Some(posthash));
    writer.write_string(Some(&log.name));
    writer.write_u64(log.max_lines as u64);
    writer.write_u64(log.max_time as u64);

    for entry in log.entries() {
        writer.write_u32(MAGIC_ENTRY_START);
        writer.write_u64(entry.t as u64);
        for tag in &entry.mtags {
            writer.write_string(Some(&tag.name));
            writer.write_string(tag.value.as_deref());
        }
        writer.write_string(None);
        writer.write_string(None);
        writer.write_string(Some(&entry.line));
        writer.write_u32(MAGIC_ENTRY_END);
    }
    writer.write_u32(MAGIC_FILE_END);
}

pub fn read_object_file(reader: &mut SecretDbReader, path: &Path) -> Result<ParsedObjectFile> {
    let magic = reader.read_u32().map_err(|e| map_read_err(path, e))?;
    if magic != MAGIC_FILE_START {
        return Err(corrupt(path, "bad FILE_START magic"));
    }
    let version = reader.read_u32().map_err(|e| map_read_err(path, e))?;
    if !(MIN_SUPPORTED_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }
    let prehash = reader
        .read_string()
        .map_err(|e| map_read_err(path, e))?
        .ok_or_else(|| corrupt(path, "null prehash"))?;
    let posthash = reader
        .read_string()
        .map_err(|e| map_read_err(path, e))?
        .ok_or_else(|| corrupt(path, "null posthash"))?;
    let object_name = reader
        .read_string()
        .map_err(|e| map_read_err(path, e))?
        .ok_or_else(|| corrupt(path, "null object name"))?;
    let max_lines = reader.read_u64().map_err(|e| map_read_err(path, e))?;
    let max_time = reader.read_u64().map_err(|e| map_read_err(path, e))?;

    let mut entries = Vec::new();
    loop {
        let magic = reader.read_u32().map_err(|e| map_read_err(path, e))?;
        if magic == MAGIC_FILE_END {
            break;
        }
        if magic != MAGIC_ENTRY_START {
            return Err(corrupt(path, "bad ENTRY_START magic"));
        }
        let t = reader.read_u64().map_err(|e| map_read_err(path, e))? as i64;

        let mut mtags = Vec::new();
        loop {
            let name = reader.read_string().map_err(|e| map_read_err(path, e))?;
            let value = reader.read_string().map_err(|e| map_read_err(path, e))?;
            match name {
                None => break,
                Some(name) => mtags.push(MessageTag { name, value }),
            }
        }

        let line = reader
            .read_string()
            .map_err(|e| map_read_err(path, e))?
            .ok_or_else(|| corrupt(path, "null line"))?;
        let end_magic = reader.read_u32().map_err(|e| map_read_err(path, e))?;
        if end_magic != MAGIC_ENTRY_END {
            return Err(corrupt(path, "bad ENTRY_END magic"));
        }
        entries.push(Entry::new(t, line, mtags));
    }

    Ok(ParsedObjectFile {
        prehash,
        posthash,
        object_name,
        max_lines,
        max_time,
        entries,
    })
}

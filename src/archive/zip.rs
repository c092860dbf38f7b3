/*!
 * ZIP Driver
 * Stored (uncompressed) ZIP archives with CRC-32 verification
 */

use super::driver::{ArchiveDriver, ArchiveReader, DriverContext, DriverError, EncodeEntry};
use super::types::{EntryInfo, EntryMeta};
use crate::address::EntryName;
use crate::core::limits::ZIP_EOCD_SEARCH_WINDOW;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const EOCD_LEN: usize = 22;
const METHOD_STORED: u16 = 0;
const VERSION: u16 = 20;
const DIR_ATTRIBUTE: u32 = 0x10;

/// ZIP driver writing stored entries
///
/// Compressed entries of foreign archives are listed, but reading them
/// reports `Unsupported`. ZIP64 is not supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipDriver;

impl ZipDriver {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone)]
struct ZipEntry {
    meta: EntryMeta,
    method: u16,
    crc: u32,
    compressed_size: usize,
    local_offset: usize,
}

struct ZipArchive {
    data: Bytes,
    entries: BTreeMap<EntryName, ZipEntry>,
}

impl ArchiveReader for ZipArchive {
    fn entries(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| EntryInfo::new(name.clone(), entry.meta))
            .collect()
    }

    fn read(&self, name: &EntryName) -> Result<Bytes, DriverError> {
        let entry = self.entries.get(name).ok_or_else(|| corrupt(name, "not in central directory"))?;
        if entry.meta.is_dir() {
            return Err(corrupt(name, "is a directory"));
        }
        if entry.method != METHOD_STORED {
            return Err(DriverError::Unsupported(format!(
                "compression method {} of {}",
                entry.method, name
            )));
        }

        let header = entry.local_offset;
        if read_u32(&self.data, header)? != LOCAL_HEADER_SIG {
            return Err(corrupt(name, "bad local header signature"));
        }
        let name_len = read_u16(&self.data, header + 26)? as usize;
        let extra_len = read_u16(&self.data, header + 28)? as usize;
        let start = header + LOCAL_HEADER_LEN + name_len + extra_len;
        let end = start + entry.compressed_size;
        if end > self.data.len() {
            return Err(corrupt(name, "data runs past end of archive"));
        }

        let content = self.data.slice(start..end);
        if crc32(&content) != entry.crc {
            return Err(corrupt(name, "CRC-32 mismatch"));
        }
        Ok(content)
    }
}

impl ArchiveDriver for ZipDriver {
    fn name(&self) -> &str {
        "zip"
    }

    fn decode(&self, _ctx: &DriverContext<'_>, data: Bytes) -> Result<Box<dyn ArchiveReader>, DriverError> {
        let eocd = find_eocd(&data)?;
        let count = read_u16(&data, eocd + 10)? as usize;
        let cd_offset = read_u32(&data, eocd + 16)? as usize;

        let mut entries = BTreeMap::new();
        let mut pos = cd_offset;
        for _ in 0..count {
            if read_u32(&data, pos)? != CENTRAL_HEADER_SIG {
                return Err(DriverError::Format("bad central directory signature".into()));
            }
            let method = read_u16(&data, pos + 10)?;
            let dos_time = read_u16(&data, pos + 12)?;
            let dos_date = read_u16(&data, pos + 14)?;
            let crc = read_u32(&data, pos + 16)?;
            let compressed_size = read_u32(&data, pos + 20)? as usize;
            let size = read_u32(&data, pos + 24)? as u64;
            let name_len = read_u16(&data, pos + 28)? as usize;
            let extra_len = read_u16(&data, pos + 30)? as usize;
            let comment_len = read_u16(&data, pos + 32)? as usize;
            let local_offset = read_u32(&data, pos + 42)? as usize;

            let raw_name = slice(&data, pos + CENTRAL_HEADER_LEN, name_len)?;
            let raw_name = String::from_utf8_lossy(raw_name);
            let name = EntryName::parse(&raw_name).map_err(|e| DriverError::Corrupt {
                entry: raw_name.to_string(),
                reason: e.to_string(),
            })?;
            let modified = from_dos_time(dos_date, dos_time);
            let meta = if raw_name.ends_with('/') {
                EntryMeta::directory(modified)
            } else {
                EntryMeta::file(size, modified)
            };

            if !name.is_root() {
                entries.insert(
                    name,
                    ZipEntry {
                        meta,
                        method,
                        crc,
                        compressed_size,
                        local_offset,
                    },
                );
            }
            pos += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
        }

        Ok(Box::new(ZipArchive { data, entries }))
    }

    fn encode(
        &self,
        _ctx: &DriverContext<'_>,
        entries: Vec<EncodeEntry>,
        sink: &mut dyn Write,
    ) -> Result<(), DriverError> {
        let mut central = Vec::new();
        let mut offset: usize = 0;
        let mut count: u16 = 0;

        for entry in &entries {
            let mut name = entry.name.as_str().to_string();
            let content: &[u8] = match &entry.content {
                Some(bytes) => bytes.as_ref(),
                None => {
                    name.push('/');
                    &[]
                }
            };
            let name_len = u16::try_from(name.len())
                .map_err(|_| DriverError::Unsupported(format!("entry name too long: {}", name)))?;
            let size = u32::try_from(content.len())
                .map_err(|_| DriverError::Unsupported(format!("{} exceeds 4GiB without ZIP64", name)))?;
            let local_offset = u32::try_from(offset)
                .map_err(|_| DriverError::Unsupported("archive exceeds 4GiB without ZIP64".into()))?;
            count = count
                .checked_add(1)
                .ok_or_else(|| DriverError::Unsupported("more than 65535 entries".into()))?;

            let crc = crc32(content);
            let (dos_date, dos_time) = to_dos_time(entry.meta.modified);

            let mut header = Vec::with_capacity(LOCAL_HEADER_LEN + name.len());
            put_u32(&mut header, LOCAL_HEADER_SIG);
            put_u16(&mut header, VERSION);
            put_u16(&mut header, 0);
            put_u16(&mut header, METHOD_STORED);
            put_u16(&mut header, dos_time);
            put_u16(&mut header, dos_date);
            put_u32(&mut header, crc);
            put_u32(&mut header, size);
            put_u32(&mut header, size);
            put_u16(&mut header, name_len);
            put_u16(&mut header, 0);
            header.extend_from_slice(name.as_bytes());
            sink.write_all(&header)?;
            sink.write_all(content)?;
            offset += header.len() + content.len();

            put_u32(&mut central, CENTRAL_HEADER_SIG);
            put_u16(&mut central, VERSION);
            put_u16(&mut central, VERSION);
            put_u16(&mut central, 0);
            put_u16(&mut central, METHOD_STORED);
            put_u16(&mut central, dos_time);
            put_u16(&mut central, dos_date);
            put_u32(&mut central, crc);
            put_u32(&mut central, size);
            put_u32(&mut central, size);
            put_u16(&mut central, name_len);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u16(&mut central, 0);
            put_u32(&mut central, if entry.content.is_none() { DIR_ATTRIBUTE } else { 0 });
            put_u32(&mut central, local_offset);
            central.extend_from_slice(name.as_bytes());
        }

        let cd_offset = u32::try_from(offset)
            .map_err(|_| DriverError::Unsupported("archive exceeds 4GiB without ZIP64".into()))?;
        let mut eocd = Vec::with_capacity(EOCD_LEN);
        put_u32(&mut eocd, EOCD_SIG);
        put_u16(&mut eocd, 0);
        put_u16(&mut eocd, 0);
        put_u16(&mut eocd, count);
        put_u16(&mut eocd, count);
        put_u32(&mut eocd, central.len() as u32);
        put_u32(&mut eocd, cd_offset);
        put_u16(&mut eocd, 0);

        sink.write_all(&central)?;
        sink.write_all(&eocd)?;
        Ok(())
    }
}

fn find_eocd(data: &[u8]) -> Result<usize, DriverError> {
    if data.len() < EOCD_LEN {
        return Err(DriverError::Format("too short for a zip archive".into()));
    }
    let lowest = data.len().saturating_sub(ZIP_EOCD_SEARCH_WINDOW);
    (lowest..=data.len() - EOCD_LEN)
        .rev()
        .find(|&pos| data[pos..pos + 4] == EOCD_SIG.to_le_bytes())
        .ok_or_else(|| DriverError::Format("no end of central directory record".into()))
}

fn corrupt(name: &EntryName, reason: &str) -> DriverError {
    DriverError::Corrupt {
        entry: name.to_string(),
        reason: reason.to_string(),
    }
}

fn slice(data: &[u8], pos: usize, len: usize) -> Result<&[u8], DriverError> {
    data.get(pos..pos + len)
        .ok_or_else(|| DriverError::Format(format!("truncated record at offset {}", pos)))
}

fn read_u16(data: &[u8], pos: usize) -> Result<u16, DriverError> {
    let raw = slice(data, pos, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32, DriverError> {
    let raw = slice(data, pos, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// MS-DOS (date, time); clamped to the 1980..=2107 range the format covers
fn to_dos_time(modified: SystemTime) -> (u16, u16) {
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let at = OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    if at.year() < 1980 {
        return ((1 << 5) | 1, 0);
    }
    let year = (at.year() - 1980).min(127) as u16;
    let date = (year << 9) | ((u8::from(at.month()) as u16) << 5) | at.day() as u16;
    let time = ((at.hour() as u16) << 11) | ((at.minute() as u16) << 5) | (at.second() as u16 / 2);
    (date, time)
}

fn from_dos_time(date: u16, time: u16) -> SystemTime {
    let year = 1980 + (date >> 9) as i32;
    let parsed = Month::try_from(((date >> 5) & 0x0f) as u8)
        .ok()
        .and_then(|month| Date::from_calendar_date(year, month, (date & 0x1f) as u8).ok())
        .zip(Time::from_hms((time >> 11) as u8, ((time >> 5) & 0x3f) as u8, ((time & 0x1f) * 2) as u8).ok())
        .map(|(date, time)| PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp());
    match parsed {
        Some(secs) if secs >= 0 => UNIX_EPOCH + Duration::from_secs(secs as u64),
        _ => UNIX_EPOCH,
    }
}

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = crc_table();

/// IEEE CRC-32 as used by ZIP
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

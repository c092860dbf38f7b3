/*!
 * TAR Driver
 * POSIX ustar archives with header checksum validation
 */

use super::driver::{ArchiveDriver, ArchiveReader, DriverContext, DriverError, EncodeEntry};
use super::types::{EntryInfo, EntryMeta};
use crate::address::EntryName;
use crate::core::limits::TAR_BLOCK_SIZE;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const MAGIC: &[u8] = b"ustar";
const MAX_OCTAL_SIZE: u64 = 0o77_777_777_777;

/// TAR driver
///
/// Regular files and directories are kept; links and special entries are
/// skipped when reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarDriver;

impl TarDriver {
    pub fn new() -> Self {
        Self
    }
}

struct TarArchive {
    data: Bytes,
    /// Entry metadata and content offset
    entries: BTreeMap<EntryName, (EntryMeta, usize)>,
}

impl ArchiveReader for TarArchive {
    fn entries(&self) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .map(|(name, (meta, _))| EntryInfo::new(name.clone(), *meta))
            .collect()
    }

    fn read(&self, name: &EntryName) -> Result<Bytes, DriverError> {
        match self.entries.get(name) {
            Some((meta, offset)) if meta.is_file() => {
                let end = offset + meta.size as usize;
                if end > self.data.len() {
                    return Err(DriverError::Corrupt {
                        entry: name.to_string(),
                        reason: "data runs past end of archive".into(),
                    });
                }
                Ok(self.data.slice(*offset..end))
            }
            _ => Err(DriverError::Corrupt {
                entry: name.to_string(),
                reason: "not a file entry".into(),
            }),
        }
    }
}

impl ArchiveDriver for TarDriver {
    fn name(&self) -> &str {
        "tar"
    }

    fn decode(&self, _ctx: &DriverContext<'_>, data: Bytes) -> Result<Box<dyn ArchiveReader>, DriverError> {
        if data.len() < TAR_BLOCK_SIZE || data.len() % TAR_BLOCK_SIZE != 0 {
            return Err(DriverError::Format("not a whole number of tar blocks".into()));
        }

        let mut entries = BTreeMap::new();
        let mut pos = 0;
        while pos + TAR_BLOCK_SIZE <= data.len() {
            let header = &data[pos..pos + TAR_BLOCK_SIZE];
            if header.iter().all(|&b| b == 0) {
                break;
            }

            let first = pos == 0;
            if &header[257..262] != MAGIC {
                return Err(if first {
                    DriverError::Format("missing ustar magic".into())
                } else {
                    DriverError::Corrupt {
                        entry: format!("header at offset {}", pos),
                        reason: "missing ustar magic".into(),
                    }
                });
            }
            let stored = parse_octal(&header[148..156])?;
            if stored != checksum(header) {
                return Err(if first {
                    DriverError::Format("header checksum mismatch".into())
                } else {
                    DriverError::Corrupt {
                        entry: format!("header at offset {}", pos),
                        reason: "checksum mismatch".into(),
                    }
                });
            }

            let raw_name = header_name(header);
            let size = parse_octal(&header[124..136])?;
            let mtime = parse_octal(&header[136..148])?;
            let modified = UNIX_EPOCH + Duration::from_secs(mtime);
            let content_offset = pos + TAR_BLOCK_SIZE;

            let meta = match header[156] {
                b'0' | 0 => Some(EntryMeta::file(size, modified)),
                b'5' => Some(EntryMeta::directory(modified)),
                other => {
                    debug!(entry = %raw_name, typeflag = other, "Skipping unsupported tar entry");
                    None
                }
            };

            if let Some(meta) = meta {
                let name = EntryName::parse(&raw_name).map_err(|e| DriverError::Corrupt {
                    entry: raw_name.clone(),
                    reason: e.to_string(),
                })?;
                if !name.is_root() {
                    entries.insert(name, (meta, content_offset));
                }
            }

            pos = content_offset + padded(size as usize);
        }

        Ok(Box::new(TarArchive { data, entries }))
    }

    fn encode(
        &self,
        _ctx: &DriverContext<'_>,
        entries: Vec<EncodeEntry>,
        sink: &mut dyn Write,
    ) -> Result<(), DriverError> {
        for entry in &entries {
            let content: &[u8] = entry.content.as_deref().unwrap_or(&[]);
            let header = build_header(entry, content.len() as u64)?;
            sink.write_all(&header)?;
            sink.write_all(content)?;
            let padding = padded(content.len()) - content.len();
            sink.write_all(&[0u8; TAR_BLOCK_SIZE][..padding])?;
        }
        sink.write_all(&[0u8; TAR_BLOCK_SIZE * 2])?;
        Ok(())
    }
}

fn build_header(entry: &EncodeEntry, size: u64) -> Result<[u8; TAR_BLOCK_SIZE], DriverError> {
    let is_dir = entry.content.is_none();
    let mut path = entry.name.as_str().to_string();
    if is_dir {
        path.push('/');
    }
    let (prefix, name) = split_path(&path)?;
    if size > MAX_OCTAL_SIZE {
        return Err(DriverError::Unsupported(format!("{} exceeds the ustar size field", path)));
    }
    let mtime = entry
        .meta
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(MAX_OCTAL_SIZE);

    let mut header = [0u8; TAR_BLOCK_SIZE];
    header[..name.len()].copy_from_slice(name.as_bytes());
    write_octal(&mut header[100..108], if is_dir { 0o755 } else { 0o644 });
    write_octal(&mut header[108..116], 0);
    write_octal(&mut header[116..124], 0);
    write_octal(&mut header[124..136], size);
    write_octal(&mut header[136..148], mtime);
    header[156] = if is_dir { b'5' } else { b'0' };
    header[257..263].copy_from_slice(b"ustar\0");
    header[263..265].copy_from_slice(b"00");
    header[345..345 + prefix.len()].copy_from_slice(prefix.as_bytes());

    let sum = checksum(&header);
    write_octal(&mut header[148..155], sum);
    header[155] = b' ';
    Ok(header)
}

/// Split a path into ustar (prefix, name) fields
fn split_path(path: &str) -> Result<(&str, &str), DriverError> {
    if path.len() <= NAME_LEN {
        return Ok(("", path));
    }
    // Trailing slash of a directory belongs to the name part
    let search = path.strip_suffix('/').unwrap_or(path);
    search
        .match_indices('/')
        .map(|(idx, _)| idx)
        .filter(|&idx| idx <= PREFIX_LEN && path.len() - idx - 1 <= NAME_LEN)
        .last()
        .map(|idx| (&path[..idx], &path[idx + 1..]))
        .ok_or_else(|| DriverError::Unsupported(format!("path too long for ustar: {}", path)))
}

fn header_name(header: &[u8]) -> String {
    let name = field_str(&header[0..NAME_LEN]);
    let prefix = field_str(&header[345..345 + PREFIX_LEN]);
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Header checksum with the checksum field counted as spaces
fn checksum(header: &[u8]) -> u64 {
    header
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u64 } else { b as u64 })
        .sum()
}

fn parse_octal(field: &[u8]) -> Result<u64, DriverError> {
    let text = field_str(field);
    let digits = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 8)
        .map_err(|_| DriverError::Format(format!("bad octal field {:?}", digits)))
}

/// Zero-padded octal, NUL-terminated
fn write_octal(field: &mut [u8], value: u64) {
    let width = field.len() - 1;
    let text = format!("{:0width$o}", value, width = width);
    field[..width].copy_from_slice(&text.as_bytes()[text.len() - width..]);
    field[width] = 0;
}

fn padded(len: usize) -> usize {
    (len + TAR_BLOCK_SIZE - 1) / TAR_BLOCK_SIZE * TAR_BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MountPoint;

    fn roundtrip(entries: Vec<EncodeEntry>) -> Box<dyn ArchiveReader> {
        let mp = MountPoint::parse("tar:mem:/a.tar!/").unwrap();
        let mut out = Vec::new();
        TarDriver::new()
            .encode(&DriverContext::new(&mp), entries, &mut out)
            .unwrap();
        assert_eq!(out.len() % TAR_BLOCK_SIZE, 0);
        TarDriver::new()
            .decode(&DriverContext::new(&mp), Bytes::from(out))
            .unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let reader = roundtrip(vec![
            EncodeEntry {
                name: EntryName::parse("d").unwrap(),
                meta: EntryMeta::directory(modified),
                content: None,
            },
            EncodeEntry {
                name: EntryName::parse("d/f.txt").unwrap(),
                meta: EntryMeta::file(600, modified),
                content: Some(Bytes::from(vec![b'z'; 600])),
            },
        ]);

        let entries = reader.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].meta.is_dir());
        assert_eq!(entries[1].meta.size, 600);
        assert_eq!(entries[1].meta.modified, modified);
        let content = reader.read(&EntryName::parse("d/f.txt").unwrap()).unwrap();
        assert_eq!(content.len(), 600);
    }

    #[test]
    fn test_long_path_uses_prefix() {
        let long = format!("{}/{}", "p".repeat(120), "n".repeat(90));
        let reader = roundtrip(vec![EncodeEntry {
            name: EntryName::parse(&long).unwrap(),
            meta: EntryMeta::file(1, UNIX_EPOCH),
            content: Some(Bytes::from_static(b"1")),
        }]);
        assert_eq!(reader.entries()[0].name.as_str(), long);
    }

    #[test]
    fn test_rejects_non_tar() {
        let mp = MountPoint::parse("tar:mem:/a.tar!/").unwrap();
        let result = TarDriver::new().decode(&DriverContext::new(&mp), Bytes::from(vec![b'x'; 1024]));
        assert!(matches!(result, Err(DriverError::Format(_))));
        let result = TarDriver::new().decode(&DriverContext::new(&mp), Bytes::from_static(b"short"));
        assert!(matches!(result, Err(DriverError::Format(_))));
    }

    #[test]
    fn test_checksum_validation() {
        let mp = MountPoint::parse("tar:mem:/a.tar!/").unwrap();
        let mut out = Vec::new();
        TarDriver::new()
            .encode(
                &DriverContext::new(&mp),
                vec![EncodeEntry {
                    name: EntryName::parse("x").unwrap(),
                    meta: EntryMeta::file(1, UNIX_EPOCH),
                    content: Some(Bytes::from_static(b"1")),
                }],
                &mut out,
            )
            .unwrap();
        out[0] = b'y';
        let result = TarDriver::new().decode(&DriverContext::new(&mp), Bytes::from(out));
        assert!(matches!(result, Err(DriverError::Format(_))));
    }
}

//! MBR partition table codec and task handler.
//!
//! Decodes the classic 512-byte boot sector: 446 bytes of boot code,
//! four 16-byte partition entries, and the `0x55 0xAA` trailer. Each
//! entry carries both a packed CHS address and an LBA start; the two may
//! disagree, and the partition type decides which one names the real
//! start of the partition.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;

use crate::task::descriptor::TaskDescriptor;
use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};

pub const MBR_TASK_NAME: &str = "mbr";
pub const MBR_SIGNATURE_PATTERN: &str = r"^DOS/MBR boot sector";

pub const SECTOR_SIZE: u64 = 512;
pub const PARTITION_COUNT: usize = 4;

const SECTOR_BYTES: usize = SECTOR_SIZE as usize;
const BOOT_CODE_LEN: usize = 446;
const PARTITION_ENTRY_LEN: usize = 16;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

// Standard geometry assumption for the CHS/LBA reconciliation.
const HEADS_PER_CYLINDER: u64 = 16;
const SECTORS_PER_TRACK: u64 = 63;

// FAT16/32 types that are addressed strictly by CHS, and their
// LBA-mapped counterparts. Everything else reconciles by comparison.
const CHS_MAPPED_FAT: [u8; 3] = [0x04, 0x06, 0x0B];
const LBA_MAPPED_FAT: [u8; 2] = [0x0C, 0x0E];

static PARTITION_TYPES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0x00, "Empty"),
        (0x01, "DOS 12-bit FAT"),
        (0x04, "DOS 3.0+ 16-bit FAT (up to 32M)"),
        (0x05, "DOS 3.3+ Extended Partition"),
        (0x06, "DOS 3.31+ 16-bit FAT (over 32M)"),
        (0x07, "Windows NT NTFS"),
        (0x0B, "WIN95 OSR2 FAT32"),
        (0x0C, "WIN95 OSR2 FAT32, LBA-mapped"),
        (0x0E, "WIN95: DOS 16-bit FAT, LBA-mapped"),
        (0x0F, "WIN95: Extended partition, LBA-mapped"),
        (0x11, "Hidden DOS 12-bit FAT"),
        (0x14, "Hidden DOS 16-bit FAT <32M"),
        (0x16, "Hidden DOS 16-bit FAT >=32M"),
        (0x17, "Hidden IFS (e.g., HPFS)"),
        (0x1B, "Hidden WIN95 OSR2 FAT32"),
        (0x1C, "Hidden WIN95 OSR2 FAT32, LBA-mapped"),
        (0x1E, "Hidden WIN95 16-bit FAT, LBA-mapped"),
        (0x27, "Windows RE hidden partition"),
        (0x42, "Windows 2000 dynamic extended partition marker"),
        (0x82, "Linux swap"),
        (0x83, "Linux native partition"),
        (0x85, "Linux extended partition"),
        (0x8E, "Linux Logical Volume Manager partition"),
        (0xA5, "FreeBSD"),
        (0xA6, "OpenBSD"),
        (0xA8, "Mac OS-X"),
        (0xA9, "NetBSD"),
        (0xAB, "Mac OS-X Boot partition"),
        (0xAF, "MacOS X HFS"),
        (0xEE, "GPT protective MBR"),
        (0xEF, "EFI system partition"),
        (0xFD, "Linux raid partition with autodetect"),
    ])
});

/// Name for a partition-type byte. Unknown values yield no name, not an
/// error.
pub fn partition_type_name(code: u8) -> Option<&'static str> {
    PARTITION_TYPES.get(&code).copied()
}

#[derive(Debug, Error)]
pub enum MbrError {
    #[error("mbr sector must be {SECTOR_SIZE} bytes, got {0}")]
    ShortSector(usize),
}

/// Decoded packed cylinder-head-sector address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

impl Chs {
    /// Decode the 3-byte on-disk form: head, then sector in the low six
    /// bits with the cylinder's top two bits, then the cylinder's low
    /// byte.
    pub fn decode(raw: [u8; 3]) -> Self {
        Self {
            head: raw[0],
            sector: raw[1] & 0x3F,
            cylinder: u16::from(raw[2]) | (u16::from(raw[1] & 0xC0) << 2),
        }
    }

    /// The `0xFE 0xFF 0xFF` tuple that signals "address by LBA instead".
    pub fn is_lba_sentinel(&self) -> bool {
        self.head == 0xFE && self.sector == 0x3F && self.cylinder == 0x3FF
    }

    /// Sector index equivalent to this CHS address under the standard
    /// 16-head / 63-sector geometry.
    pub fn lba_equivalent(&self) -> u64 {
        (u64::from(self.cylinder) * HEADS_PER_CYLINDER + u64::from(self.head)) * SECTORS_PER_TRACK
            + u64::from(self.sector).saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRecord {
    pub status: u8,
    pub chs_first: Chs,
    pub partition_type: u8,
    pub chs_last: Chs,
    pub lba_start: u32,
    pub sector_count: u32,
}

impl PartitionRecord {
    fn parse(entry: &[u8]) -> Self {
        Self {
            status: entry[0],
            chs_first: Chs::decode([entry[1], entry[2], entry[3]]),
            partition_type: entry[4],
            chs_last: Chs::decode([entry[5], entry[6], entry[7]]),
            lba_start: u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]),
            sector_count: u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]),
        }
    }

    pub fn type_name(&self) -> Option<&'static str> {
        partition_type_name(self.partition_type)
    }

    pub fn is_empty(&self) -> bool {
        self.partition_type == 0x00
    }

    /// Whether the LBA field names the partition start. CHS-mapped FAT
    /// types force CHS addressing (warning when the CHS bytes hold the
    /// LBA sentinel), LBA-mapped FAT types force LBA, everything else
    /// trusts LBA only when both addresses agree.
    pub fn use_lba(&self, warnings: &mut Vec<String>) -> bool {
        if CHS_MAPPED_FAT.contains(&self.partition_type) {
            if self.chs_first.is_lba_sentinel() {
                warnings.push(format!(
                    "partition type {:#04x} is CHS-mapped but CHS-first holds the LBA sentinel",
                    self.partition_type
                ));
            }
            return false;
        }
        if LBA_MAPPED_FAT.contains(&self.partition_type) {
            return true;
        }
        self.chs_first.lba_equivalent() == u64::from(self.lba_start)
    }

    /// Byte offset of the partition start, relative to the sector this
    /// record was parsed from.
    pub fn resolved_byte_offset(&self, warnings: &mut Vec<String>) -> u64 {
        let sector = if self.use_lba(warnings) {
            u64::from(self.lba_start)
        } else {
            self.chs_first.lba_equivalent()
        };
        sector * SECTOR_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbrRecord {
    pub partitions: [PartitionRecord; PARTITION_COUNT],
    pub signature: [u8; 2],
}

impl MbrRecord {
    /// Parse one 512-byte sector. Format anomalies (bad trailer,
    /// unexpected status byte, implausible CHS fields) become warnings;
    /// parsing always yields all four records.
    pub fn parse(sector: &[u8]) -> Result<(Self, Vec<String>), MbrError> {
        if sector.len() < SECTOR_BYTES {
            return Err(MbrError::ShortSector(sector.len()));
        }

        let mut warnings = Vec::new();
        let signature = [sector[SECTOR_BYTES - 2], sector[SECTOR_BYTES - 1]];
        if signature != BOOT_SIGNATURE {
            warnings.push(format!(
                "boot signature mismatch: expected 55 aa, got {:02x} {:02x}",
                signature[0], signature[1]
            ));
        }

        let partitions = std::array::from_fn(|idx| {
            let start = BOOT_CODE_LEN + idx * PARTITION_ENTRY_LEN;
            let record = PartitionRecord::parse(&sector[start..start + PARTITION_ENTRY_LEN]);
            if !record.is_empty() {
                if record.status != 0x00 && record.status != 0x80 {
                    warnings.push(format!(
                        "partition {idx}: unexpected status byte {:#04x}",
                        record.status
                    ));
                }
                for (label, chs) in [("CHS-first", record.chs_first), ("CHS-last", record.chs_last)]
                {
                    if chs.sector == 0 {
                        warnings.push(format!("partition {idx}: {label} sector is 0"));
                    }
                    if chs.cylinder == 0xFF {
                        warnings.push(format!("partition {idx}: {label} cylinder is 0xff"));
                    }
                }
            }
            record
        });

        Ok((
            Self {
                partitions,
                signature,
            },
            warnings,
        ))
    }
}

fn read_sector(path: &Path, offset: u64) -> std::io::Result<[u8; SECTOR_BYTES]> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut sector = [0u8; SECTOR_BYTES];
    file.read_exact(&mut sector)?;
    Ok(sector)
}

/// Task handler: parse the partition table at the task's offset and mint
/// one follow-on descriptor per occupied partition, addressed to the
/// handlers the registry resolves for the partition-type name.
pub struct MbrTaskHandler;

impl TaskHandler for MbrTaskHandler {
    fn run(&self, spec: &TaskSpec, env: &RunEnv) -> anyhow::Result<Outcome> {
        let sector = read_sector(&spec.path, spec.offset)?;
        let (record, mut warnings) = MbrRecord::parse(&sector)?;

        let mut names = Vec::with_capacity(PARTITION_COUNT);
        let mut follow_ons = Vec::new();
        for (idx, partition) in record.partitions.iter().enumerate() {
            let name = partition.type_name().unwrap_or("");
            names.push(Value::String(name.to_string()));
            if partition.is_empty() {
                continue;
            }
            if name.is_empty() {
                warnings.push(format!(
                    "partition {idx}: unknown partition type {:#04x}",
                    partition.partition_type
                ));
                continue;
            }

            let offset = spec.offset + partition.resolved_byte_offset(&mut warnings);
            let handlers = env.registry.find_by_signature(name, false);
            if handlers.is_empty() {
                warnings.push(format!(
                    "partition {idx}: no handler for partition type {name:?}"
                ));
                continue;
            }
            follow_ons.push(
                TaskDescriptor::new(handlers, spec.path.to_string_lossy().into_owned())
                    .with_offset(offset)
                    .with_priority(spec.priority),
            );
        }

        Ok(Outcome {
            result: Value::Array(names),
            warnings,
            follow_ons,
        })
    }
}

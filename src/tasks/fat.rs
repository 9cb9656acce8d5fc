//! FAT boot-sector probe for partitions surfaced by the MBR task.
//!
//! Decodes the BIOS parameter block at the partition start and records
//! the volume geometry. Terminal: filesystem contents are not walked.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use serde_json::json;

use crate::task::{Outcome, RunEnv, TaskHandler, TaskSpec};

pub const FAT_TASK_NAME: &str = "dos_partition";
pub const FAT_SIGNATURE_PATTERN: &str =
    r"DOS 3\.0\+ 16-bit FAT|DOS 3\.31\+ 16-bit FAT|WIN95 OSR2 FAT32|WIN95: DOS 16-bit FAT";

const BOOT_SECTOR_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub oem_name: String,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
}

impl BiosParameterBlock {
    pub fn parse(sector: &[u8; BOOT_SECTOR_LEN]) -> Self {
        Self {
            oem_name: String::from_utf8_lossy(&sector[3..11]).trim_end().to_string(),
            bytes_per_sector: u16::from_le_bytes([sector[11], sector[12]]),
            sectors_per_cluster: sector[13],
            reserved_sectors: u16::from_le_bytes([sector[14], sector[15]]),
            fat_count: sector[16],
            root_entries: u16::from_le_bytes([sector[17], sector[18]]),
            media_descriptor: sector[21],
            sectors_per_fat: u16::from_le_bytes([sector[22], sector[23]]),
        }
    }

    /// Plausibility check on the sector size field; bogus values usually
    /// mean the partition entry pointed at garbage.
    pub fn is_plausible(&self) -> bool {
        self.bytes_per_sector.is_power_of_two() && (512..=4096).contains(&self.bytes_per_sector)
    }
}

pub struct FatTaskHandler;

impl TaskHandler for FatTaskHandler {
    fn run(&self, spec: &TaskSpec, _env: &RunEnv) -> anyhow::Result<Outcome> {
        let mut file = File::open(&spec.path)?;
        file.seek(SeekFrom::Start(spec.offset))?;
        let mut sector = [0u8; BOOT_SECTOR_LEN];
        file.read_exact(&mut sector)?;

        let bpb = BiosParameterBlock::parse(&sector);
        let mut warnings = Vec::new();
        if !bpb.is_plausible() {
            warnings.push(format!(
                "implausible bytes-per-sector {} at offset {}",
                bpb.bytes_per_sector, spec.offset
            ));
        }

        let result = json!({
            "oem_name": bpb.oem_name,
            "bytes_per_sector": bpb.bytes_per_sector,
            "sectors_per_cluster": bpb.sectors_per_cluster,
            "reserved_sectors": bpb.reserved_sectors,
            "fat_count": bpb.fat_count,
            "root_entries": bpb.root_entries,
            "media_descriptor": bpb.media_descriptor,
            "sectors_per_fat": bpb.sectors_per_fat,
        });
        Ok(Outcome {
            result,
            warnings,
            follow_ons: Vec::new(),
        })
    }
}

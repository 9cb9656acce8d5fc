//! Partition-table decoding against byte-built boot sectors.

mod common;

use std::sync::Arc;

use siftwork::config::Config;
use siftwork::task::{Priority, Task};
use siftwork::tasks::builtin_registry;
use siftwork::tasks::mbr::{MBR_TASK_NAME, MbrRecord, SECTOR_SIZE};

use common::{PartitionSpec, chs_bytes, mbr_sector, run_env, write_image};

fn two_partition_sector() -> [u8; 512] {
    mbr_sector(&[
        // FAT16, CHS-mapped type: CHS equivalent of LBA 2048.
        PartitionSpec {
            status: 0x80,
            chs_first: chs_bytes(2, 0, 33),
            partition_type: 0x04,
            chs_last: chs_bytes(2, 15, 63),
            lba_start: 2048,
            sector_count: 2048,
        },
        // Extended partition, default policy: CHS agrees with LBA 4096.
        PartitionSpec {
            status: 0x00,
            chs_first: chs_bytes(4, 1, 2),
            partition_type: 0x05,
            chs_last: chs_bytes(5, 0, 1),
            lba_start: 4096,
            sector_count: 4096,
        },
    ])
}

#[test]
fn decodes_names_and_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(&dir, "disk.raw", &two_partition_sector());

    let registry = Arc::new(builtin_registry().unwrap());
    let env = run_env(Arc::clone(&registry), Arc::new(Config::default()));

    let mut task = Task::resolve(&registry, MBR_TASK_NAME, &path, 0, Priority::Normal).unwrap();
    task.start(&env).unwrap();

    let result = task.result().unwrap();
    assert_eq!(result[0], "DOS 3.0+ 16-bit FAT (up to 32M)");
    assert_eq!(result[1], "DOS 3.3+ Extended Partition");
    assert_eq!(result[2], "Empty");
    assert_eq!(result[3], "Empty");

    let follow_ons = task.follow_ons();
    assert_eq!(follow_ons.len(), 2);
    assert_eq!(follow_ons[0].offset, 2048 * SECTOR_SIZE);
    assert_eq!(follow_ons[1].offset, 4096 * SECTOR_SIZE);
    // FAT partitions are addressed to the FAT probe first; the extended
    // partition only matches the catch-all.
    assert_eq!(follow_ons[0].name[0], "dos_partition");
    assert_eq!(follow_ons[1].name, vec!["raw".to_string()]);
    assert!(task.warnings().is_empty());
}

#[test]
fn empty_entries_never_mint_follow_ons() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_image(&dir, "disk.raw", &mbr_sector(&[PartitionSpec::empty()]));

    let registry = Arc::new(builtin_registry().unwrap());
    let env = run_env(Arc::clone(&registry), Arc::new(Config::default()));

    let mut task = Task::resolve(&registry, MBR_TASK_NAME, &path, 0, Priority::Normal).unwrap();
    task.start(&env).unwrap();

    assert!(task.follow_ons().is_empty());
    assert!(task.warnings().is_empty());
    assert_eq!(task.result().unwrap()[0], "Empty");
}

#[test]
fn unknown_type_warns_and_mints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let sector = mbr_sector(&[PartitionSpec {
        status: 0x00,
        chs_first: chs_bytes(0, 0, 1),
        partition_type: 0x99,
        chs_last: chs_bytes(0, 0, 2),
        lba_start: 0,
        sector_count: 16,
    }]);
    let path = write_image(&dir, "disk.raw", &sector);

    let registry = Arc::new(builtin_registry().unwrap());
    let env = run_env(Arc::clone(&registry), Arc::new(Config::default()));

    let mut task = Task::resolve(&registry, MBR_TASK_NAME, &path, 0, Priority::Normal).unwrap();
    task.start(&env).unwrap();

    assert!(task.follow_ons().is_empty());
    assert_eq!(task.result().unwrap()[0], "");
    assert!(task.warnings().iter().any(|w| w.contains("unknown partition type")));
}

#[test]
fn chs_sentinel_on_chs_mapped_type_warns() {
    let dir = tempfile::tempdir().unwrap();
    let sector = mbr_sector(&[PartitionSpec {
        status: 0x80,
        chs_first: [0xFE, 0xFF, 0xFF],
        partition_type: 0x04,
        chs_last: [0xFE, 0xFF, 0xFF],
        lba_start: 2048,
        sector_count: 2048,
    }]);
    let path = write_image(&dir, "disk.raw", &sector);

    let registry = Arc::new(builtin_registry().unwrap());
    let env = run_env(Arc::clone(&registry), Arc::new(Config::default()));

    let mut task = Task::resolve(&registry, MBR_TASK_NAME, &path, 0, Priority::Normal).unwrap();
    task.start(&env).unwrap();

    assert!(task.warnings().iter().any(|w| w.contains("LBA sentinel")));
    // CHS addressing still applies: the sentinel decodes far from LBA 2048.
    assert_eq!(task.follow_ons().len(), 1);
    assert_ne!(task.follow_ons()[0].offset, 2048 * SECTOR_SIZE);
}

#[test]
fn bad_boot_signature_is_a_warning_not_an_error() {
    let mut sector = two_partition_sector();
    sector[510] = 0x00;
    sector[511] = 0x00;

    let (record, warnings) = MbrRecord::parse(&sector).unwrap();
    assert!(warnings.iter().any(|w| w.contains("boot signature mismatch")));
    assert_eq!(record.partitions[0].partition_type, 0x04);
    assert_eq!(record.partitions[1].lba_start, 4096);
}

#[test]
fn format_anomalies_become_warnings() {
    let sector = mbr_sector(&[PartitionSpec {
        status: 0x42,
        chs_first: [0, 0, 0xFF], // sector 0, cylinder 0xff
        partition_type: 0x83,
        chs_last: chs_bytes(1, 0, 1),
        lba_start: 63,
        sector_count: 128,
    }]);

    let (record, warnings) = MbrRecord::parse(&sector).unwrap();
    assert_eq!(record.partitions[0].partition_type, 0x83);
    assert!(warnings.iter().any(|w| w.contains("unexpected status byte")));
    assert!(warnings.iter().any(|w| w.contains("sector is 0")));
    assert!(warnings.iter().any(|w| w.contains("cylinder is 0xff")));
}

//! Built-in task types.

pub mod dir;
pub mod extract;
pub mod fat;
pub mod mbr;
pub mod raw;
pub mod symlink;

use std::sync::Arc;

use crate::registry::{Registry, RegistryError, TaskType};

use dir::{DIR_SIGNATURE_PATTERN, DIR_TASK_NAME, DirScannerHandler};
use fat::{FAT_SIGNATURE_PATTERN, FAT_TASK_NAME, FatTaskHandler};
use mbr::{MBR_SIGNATURE_PATTERN, MBR_TASK_NAME, MbrTaskHandler};
use raw::{RAW_SIGNATURE_PATTERN, RAW_TASK_NAME, RawTaskHandler};
use symlink::{SYMLINK_SIGNATURE_PATTERN, SYMLINK_TASK_NAME, SymlinkTaskHandler};

/// Registry with every built-in task type. The catch-all classification
/// task is registered last so concrete handlers win signature ties.
pub fn builtin_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    registry.register(TaskType::new(
        MBR_TASK_NAME,
        MBR_SIGNATURE_PATTERN,
        Arc::new(MbrTaskHandler),
    )?);
    registry.register(TaskType::new(
        DIR_TASK_NAME,
        DIR_SIGNATURE_PATTERN,
        Arc::new(DirScannerHandler),
    )?);
    registry.register(TaskType::new(
        FAT_TASK_NAME,
        FAT_SIGNATURE_PATTERN,
        Arc::new(FatTaskHandler),
    )?);
    registry.register(TaskType::new(
        SYMLINK_TASK_NAME,
        SYMLINK_SIGNATURE_PATTERN,
        Arc::new(SymlinkTaskHandler),
    )?);
    registry.register(TaskType::new(
        RAW_TASK_NAME,
        RAW_SIGNATURE_PATTERN,
        Arc::new(RawTaskHandler),
    )?);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_all_loses_signature_ties() {
        let registry = builtin_registry().unwrap();
        let names = registry.find_by_signature("DOS/MBR boot sector", false);
        assert_eq!(names, vec![MBR_TASK_NAME.to_string(), RAW_TASK_NAME.to_string()]);
        let names = registry.find_by_signature("DOS 3.0+ 16-bit FAT (up to 32M)", false);
        assert_eq!(names[0], FAT_TASK_NAME);
        let names = registry.find_by_signature("symbolic link", false);
        assert_eq!(names[0], SYMLINK_TASK_NAME);
    }

    #[test]
    fn every_builtin_is_addressable_by_name() {
        let registry = builtin_registry().unwrap();
        for name in [
            MBR_TASK_NAME,
            DIR_TASK_NAME,
            FAT_TASK_NAME,
            SYMLINK_TASK_NAME,
            RAW_TASK_NAME,
        ] {
            assert!(registry.find_by_name(name).is_ok());
        }
    }
}

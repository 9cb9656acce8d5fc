use std::fs::File;
use std::io::Read;
use std::path::Path;

const MBR_BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Signature classifier collaborator. Produces a textual description of an
/// artifact's content, matched against registered task-type patterns.
pub trait SignatureClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> std::io::Result<String>;
}

/// Built-in magic-byte classifier covering the signatures the built-in
/// task types dispatch on. A stand-in for an external libmagic-style
/// classifier, which plugs in through the same trait.
pub struct MagicClassifier;

impl SignatureClassifier for MagicClassifier {
    fn classify(&self, path: &Path) -> std::io::Result<String> {
        let meta = std::fs::symlink_metadata(path)?;
        if meta.file_type().is_symlink() {
            return Ok("symbolic link".to_string());
        }
        if meta.is_dir() {
            return Ok("directory".to_string());
        }

        let mut file = File::open(path)?;
        let mut buf = [0u8; 512];
        let mut read = 0usize;
        while read < buf.len() {
            let n = file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(classify_bytes(&buf[..read]).to_string())
    }
}

/// Classify a leading byte window. Specific header magics win over the
/// sector-trailer check for boot sectors.
pub fn classify_bytes(buf: &[u8]) -> &'static str {
    if buf.starts_with(b"PK\x03\x04") {
        return "Zip archive data";
    }
    if buf.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "JPEG image data";
    }
    if buf.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "PNG image data";
    }
    if buf.starts_with(b"GIF8") {
        return "GIF image data";
    }
    if buf.starts_with(b"%PDF-") {
        return "PDF document";
    }
    if buf.len() >= 512 && buf[510..512] == MBR_BOOT_SIGNATURE {
        return "DOS/MBR boot sector";
    }
    "data"
}

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::task::Priority;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SeedPriority {
    Low,
    Normal,
    High,
}

impl From<SeedPriority> for Priority {
    fn from(value: SeedPriority) -> Self {
        match value {
            SeedPriority::Low => Priority::Low,
            SeedPriority::Normal => Priority::Normal,
            SeedPriority::High => Priority::High,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Artifact to triage (disk image, archive, file, or directory)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Byte offset into the artifact for the seed task
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Number of worker threads (overrides config when set)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Results file path (overrides config when set)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Priority of the seed task
    #[arg(long, value_enum, default_value_t = SeedPriority::Normal)]
    pub priority: SeedPriority,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

#[cfg(test)]
mod tests {
    use super::CliOptions;
    use clap::Parser;

    #[test]
    fn parses_minimal_invocation() {
        let opts = CliOptions::try_parse_from(["siftwork", "--input", "disk.raw"]).expect("parse");
        assert_eq!(opts.input.to_str(), Some("disk.raw"));
        assert_eq!(opts.offset, 0);
        assert!(opts.workers.is_none());
    }

    #[test]
    fn parses_offset_and_workers() {
        let opts = CliOptions::try_parse_from([
            "siftwork",
            "--input",
            "disk.raw",
            "--offset",
            "512",
            "--workers",
            "4",
        ])
        .expect("parse");
        assert_eq!(opts.offset, 512);
        assert_eq!(opts.workers, Some(4));
    }

    #[test]
    fn parses_seed_priority() {
        let opts =
            CliOptions::try_parse_from(["siftwork", "--input", "disk.raw", "--priority", "high"])
                .expect("parse");
        assert!(matches!(opts.priority, super::SeedPriority::High));
    }
}

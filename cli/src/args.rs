use std::{path::PathBuf, str::FromStr};

use anyhow::bail;
use clap::{Parser, ValueEnum};
use flowzstd::Quality;

/// A byte count with an optional unit suffix, e.g. `64K` or `2M`.
#[derive(Debug, Clone)]
pub struct ByteValue(u64);

impl ByteValue {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for ByteValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit): (String, String) = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .partition(|c| c.is_ascii_digit());
        let value: u64 = value.parse()?;

        let value = match unit.as_str() {
            "B" | "" => value,
            "K" | "kib" => value * 1024,
            "M" | "mib" => value * 1024 * 1024,
            "G" | "gib" => value * 1024 * 1024 * 1024,
            _ => bail!("Unknown unit: {unit:?}"),
        };

        if value == 0 {
            bail!("Byte value cannot be zero");
        }

        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum QualityArg {
    None,
    Fastest,
    Default,
    Maximum,
}

impl From<QualityArg> for Quality {
    fn from(value: QualityArg) -> Self {
        match value {
            QualityArg::None => Quality::None,
            QualityArg::Fastest => Quality::Fastest,
            QualityArg::Default => Quality::Default,
            QualityArg::Maximum => Quality::Maximum,
        }
    }
}

#[derive(Debug, Parser, Clone)]
pub struct CliFlags {
    /// Suppress the summary output.
    #[arg(short, long, action, global = true)]
    pub quiet: bool,

    /// Overwrite existing output files.
    #[arg(short, long, action, global = true)]
    pub force: bool,

    /// Write to STDOUT instead of a file.
    #[arg(short = 'c', long, action, global = true)]
    pub stdout: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct CompressArgs {
    /// The input file; reads from STDIN if `-` or not provided.
    #[arg(default_value = "-")]
    pub input_file: PathBuf,

    /// The output file. Defaults to the input file with `.zst` appended.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// The compression level.
    #[arg(short = 'l', long, default_value_t = flowzstd::DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: i32,

    /// Coarse compression quality; takes precedence over the compression level.
    #[arg(long, value_enum)]
    pub quality: Option<QualityArg>,

    /// End the current frame whenever this many uncompressed bytes have been written.
    #[arg(long)]
    pub frame_size: Option<ByteValue>,

    /// Do not write frame checksums.
    #[arg(long, action)]
    pub no_checksum: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct DecompressArgs {
    /// The input file; reads from STDIN if `-` or not provided.
    #[arg(default_value = "-")]
    pub input_file: PathBuf,

    /// The output file. Defaults to the input file without its extension.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// The maximum window log the decoder accepts, between 10 and 31.
    #[arg(short, long)]
    pub window_log_max: Option<u32>,
}

#[derive(Debug, Parser, Clone)]
pub struct ListArgs {
    /// The input file; reads from STDIN if `-` or not provided.
    #[arg(default_value = "-")]
    pub input_file: PathBuf,
}

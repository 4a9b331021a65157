use std::{
    ffi::OsString,
    fs::File,
    io::{self, IsTerminal, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use flowzstd::{
    DEFAULT_SCRATCH_SIZE, DecodeOptions, EncodeOptions, Encoder, FrameKind, FrameScanner, Quality,
};

use crate::args::{CliFlags, CompressArgs, DecompressArgs, ListArgs};

#[derive(Debug, Subcommand)]
#[command(arg_required_else_help(true))]
pub enum Command {
    /// Compress INPUT_FILE (default); reads from STDIN if INPUT_FILE is `-` or not provided
    #[clap(alias = "c")]
    Compress(CompressArgs),
    /// Decompress INPUT_FILE
    #[clap(alias = "d")]
    Decompress(DecompressArgs),
    /// Print information about the frames of a Zstandard stream
    #[clap(alias = "l")]
    List(ListArgs),
}

impl Command {
    pub fn run(&self, flags: &CliFlags) -> Result<()> {
        match self {
            Self::Compress(args) => compress(args, flags),
            Self::Decompress(args) => decompress(args, flags),
            Self::List(args) => list(args),
        }
    }
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_stdin(path) {
        return Ok(Box::new(io::stdin()));
    }

    let file = File::open(path).context("Failed to open input file")?;
    Ok(Box::new(file))
}

fn create_output(path: Option<&Path>, flags: &CliFlags) -> Result<Box<dyn Write>> {
    let Some(path) = path else {
        let stdout = io::stdout();
        if !flags.force && !flags.stdout && stdout.is_terminal() {
            bail!("stdout is a terminal, aborting");
        }
        return Ok(Box::new(stdout));
    };

    if !flags.force && path.exists() {
        bail!("{} already exists; use --force to overwrite", path.display());
    }
    let file = File::create(path).context("Failed to create output file")?;

    Ok(Box::new(file))
}

fn compress(args: &CompressArgs, flags: &CliFlags) -> Result<()> {
    let mut reader = open_input(&args.input_file)?;
    let out_path = compress_out_path(args, flags);
    let writer = create_output(out_path.as_deref(), flags)?;

    let level = match args.quality {
        Some(quality) => Quality::from(quality).level(),
        None => args.compression_level,
    };
    let mut encoder = EncodeOptions::new()
        .compression_level(level)
        .checksum_flag(!args.no_checksum)
        .into_encoder(writer)
        .context("Failed to create encoder")?;

    let bytes_read = match &args.frame_size {
        None => io::copy(&mut reader, &mut encoder).context("Compression failed")?,
        Some(frame_size) => {
            compress_framed(&mut reader, &mut encoder, frame_size.as_u64())
                .context("Compression failed")?
        }
    };

    encoder.end_frame()?;
    let bytes_written = encoder.written_compressed();
    encoder.finish()?;

    if !flags.quiet {
        let name = input_name(&args.input_file);
        let ratio = 100. / bytes_read as f64 * bytes_written as f64;
        eprintln!("{name} : {ratio:.2}% ( {bytes_read} => {bytes_written} bytes )");
    }

    Ok(())
}

// Ends a frame every `frame_size` uncompressed bytes.
fn compress_framed<R, W>(
    reader: &mut R,
    encoder: &mut Encoder<'_, W>,
    frame_size: u64,
) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let mut buf = vec![0u8; DEFAULT_SCRATCH_SIZE];
    let mut total = 0u64;
    let mut in_frame = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }

        let mut pos = 0;
        while pos < n {
            let take = usize::try_from(frame_size - in_frame)
                .unwrap_or(usize::MAX)
                .min(n - pos);
            encoder.compress(&buf[pos..pos + take])?;
            pos += take;
            total += take as u64;
            in_frame += take as u64;

            if in_frame == frame_size {
                encoder.end_frame()?;
                in_frame = 0;
            }
        }
    }
}

fn decompress(args: &DecompressArgs, flags: &CliFlags) -> Result<()> {
    let reader = open_input(&args.input_file)?;
    let out_path = decompress_out_path(args, flags);
    let mut writer = create_output(out_path.as_deref(), flags)?;

    let mut opts = DecodeOptions::new();
    if let Some(window_log) = args.window_log_max {
        opts = opts.window_log_max(window_log);
    }
    let mut decoder = opts
        .into_decoder(reader)
        .context("Failed to create decoder")?;

    let bytes_written = io::copy(&mut decoder, &mut writer).context("Decompression failed")?;
    writer.flush()?;

    if !flags.quiet {
        let name = input_name(&args.input_file);
        eprintln!("{name} : {bytes_written} bytes");
    }

    Ok(())
}

fn list(args: &ListArgs) -> Result<()> {
    let reader = open_input(&args.input_file)?;
    let scanner = FrameScanner::new(reader);

    println!(
        "{: <8} {: <12} {: <14} {: <14} {: <10} {: <10}",
        "Index", "Type", "Compressed", "Content Size", "Checksum", "Offset"
    );

    let mut frames = 0u64;
    let mut compressed = 0u64;
    for (index, info) in scanner.enumerate() {
        let info = info.with_context(|| format!("Failed to read frame {index}"))?;
        let content_size = match info.content_size() {
            Some(n) => n.to_string(),
            None => String::from("-"),
        };
        let kind = match info.kind() {
            FrameKind::Standard => "frame",
            FrameKind::Skippable => "skippable",
        };

        println!(
            "{: <8} {: <12} {: <14} {: <14} {: <10} {: <10}",
            index,
            kind,
            info.compressed_size(),
            content_size,
            if info.has_checksum() { "yes" } else { "no" },
            info.offset(),
        );

        frames += 1;
        compressed += info.compressed_size();
    }

    println!("{frames} frames, {compressed} bytes compressed");

    Ok(())
}

fn compress_out_path(args: &CompressArgs, flags: &CliFlags) -> Option<PathBuf> {
    if flags.stdout || is_stdin(&args.input_file) && args.output_file.is_none() {
        return None;
    }

    args.output_file.clone().or_else(|| {
        // TODO: Use `add_extension` when stable: https://github.com/rust-lang/rust/issues/127292
        let extension = args.input_file.extension().map_or_else(
            || OsString::from("zst"),
            |e| {
                let mut ext = OsString::from(e);
                ext.push(".zst");
                ext
            },
        );

        Some(args.input_file.with_extension(extension))
    })
}

fn decompress_out_path(args: &DecompressArgs, flags: &CliFlags) -> Option<PathBuf> {
    if flags.stdout || is_stdin(&args.input_file) && args.output_file.is_none() {
        return None;
    }

    args.output_file
        .clone()
        .or_else(|| Some(args.input_file.with_extension("")))
}

fn input_name(path: &Path) -> &str {
    if is_stdin(path) {
        "STDIN"
    } else {
        path.as_os_str().to_str().unwrap_or("")
    }
}

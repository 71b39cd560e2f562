use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use memmap2::Mmap;

use snake_common::{ArchConfig, NamedTensors};
use snake_core::{Tokenizer, DEFAULT_GROUP_SIZE};
use snake_export::{
    ConfigHeader, ExportProfile, HeaderFormat, ModelExporter, Q8Options, ScalePlacement,
};

#[derive(Parser, Debug)]
#[command(name = "snake", about = "Chain tokenizer and flat weight exporter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn chain merges from a text corpus and write the vocabulary file.
    TrainTokenizer(TrainTokenizerArgs),
    /// Print the token ids of a string.
    Encode(EncodeArgs),
    /// Print the text of a list of token ids.
    Decode(DecodeArgs),
    /// Write a checkpoint as a flat binary model file (optional config header).
    Export(ExportArgs),
    /// Write only the config header of a checkpoint.
    Header(HeaderArgs),
}

// ── Tokenizer ──────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainTokenizerArgs {
    /// Training corpus (raw bytes).
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value = "tokenizer.bin")]
    output: PathBuf,
    /// Stop once the vocabulary has this many entries; train to exhaustion if omitted.
    #[arg(long)]
    vocab_size: Option<usize>,
    /// Strings to register as single tokens after training.
    #[arg(long = "special")]
    special: Vec<String>,
    /// Append to an existing vocabulary file instead of replacing it.
    #[arg(long)]
    append: bool,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    #[arg(long, default_value = "tokenizer.bin")]
    tokenizer: PathBuf,
    #[arg(long)]
    text: String,
}

#[derive(Parser, Debug)]
struct DecodeArgs {
    #[arg(long, default_value = "tokenizer.bin")]
    tokenizer: PathBuf,
    ids: Vec<u32>,
}

// ── Export / Header ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct ExportArgs {
    /// `.safetensors` or PyTorch `.bin` checkpoint.
    #[arg(long)]
    checkpoint: PathBuf,
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    #[arg(long, default_value = "model.bin")]
    output: PathBuf,
    /// Store the large matrices as Q8_0.
    #[arg(long)]
    quantize: bool,
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE)]
    group_size: usize,
    #[arg(long, default_value = "per-tensor", value_parser = ["per-tensor", "per-template"])]
    scale_placement: String,
    /// Also write the config header here.
    #[arg(long)]
    header: Option<PathBuf>,
    #[arg(long, default_value = "c", value_parser = ["c", "binary"])]
    header_format: String,
    /// Skip the per-layer shape check.
    #[arg(long)]
    no_check: bool,
}

#[derive(Parser, Debug)]
struct HeaderArgs {
    #[arg(long)]
    checkpoint: PathBuf,
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    #[arg(long, default_value = "config.h")]
    output: PathBuf,
    #[arg(long, default_value = "c", value_parser = ["c", "binary"])]
    header_format: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::TrainTokenizer(args) => cmd_train_tokenizer(args),
        Command::Encode(args) => cmd_encode(args),
        Command::Decode(args) => cmd_decode(args),
        Command::Export(args) => cmd_export(args),
        Command::Header(args) => cmd_header(args),
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_train_tokenizer(args: TrainTokenizerArgs) -> Result<()> {
    let file = File::open(&args.input)
        .with_context(|| format!("open corpus {}", args.input.display()))?;
    let len = file.metadata().context("stat corpus")?.len();
    // Zero-length files cannot be mapped on every platform.
    let mmap = if len == 0 {
        None
    } else {
        Some(unsafe { Mmap::map(&file).context("mmap corpus")? })
    };
    let data: &[u8] = mmap.as_deref().unwrap_or(&[]);
    eprintln!("Corpus: {} bytes", data.len());

    let mut tokenizer = Tokenizer::new();
    let pb = match args.vocab_size {
        Some(target) => {
            let pb = ProgressBar::new(target.saturating_sub(tokenizer.len()) as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} merges {msg}")
                    .context("progress template")?
                    .progress_chars("=>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    let report = tokenizer.train_bytes_with(data, args.vocab_size, |_, seq_len| {
        pb.inc(1);
        pb.set_message(format!("seq {seq_len}"));
    })?;
    pb.finish_with_message("done");

    if !args.special.is_empty() {
        let ids = tokenizer.add_special_tokens(&args.special)?;
        for (text, id) in args.special.iter().zip(&ids) {
            eprintln!("Special token {text:?} -> {id}");
        }
    }

    if args.output.exists() && !args.append {
        std::fs::remove_file(&args.output)
            .with_context(|| format!("replace {}", args.output.display()))?;
    }
    tokenizer
        .save(&args.output)
        .with_context(|| format!("write vocabulary {}", args.output.display()))?;
    tracing::info!(
        path = %args.output.display(),
        merges = report.merges,
        reused = report.reused,
        vocab_size = tokenizer.len(),
        append = args.append,
        "Vocabulary written"
    );
    eprintln!(
        "Done. {} merges ({} reused), vocab {} -> {}, corpus {} -> {} tokens",
        report.merges,
        report.reused,
        report.vocab_size,
        tokenizer.len(),
        data.len(),
        report.sequence_len
    );
    Ok(())
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    let tokenizer = Tokenizer::load(path)
        .with_context(|| format!("load vocabulary {}", path.display()))?;
    if tokenizer.is_empty() {
        anyhow::bail!("vocabulary {} is empty", path.display());
    }
    Ok(tokenizer)
}

fn cmd_encode(args: EncodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.tokenizer)?;
    let ids = tokenizer.encode(&args.text);
    let line: Vec<String> = ids.iter().map(u32::to_string).collect();
    println!("{}", line.join(" "));
    eprintln!("{} bytes -> {} tokens", args.text.len(), ids.len());
    Ok(())
}

fn cmd_decode(args: DecodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.tokenizer)?;
    let text = tokenizer.decode(&args.ids)?;
    println!("{text}");
    Ok(())
}

fn header_format(name: &str) -> HeaderFormat {
    match name {
        "binary" => HeaderFormat::Binary,
        _ => HeaderFormat::C,
    }
}

fn load_checkpoint(checkpoint: &Path, config: &Path) -> Result<(NamedTensors, ArchConfig)> {
    let config = ArchConfig::load(config)
        .with_context(|| format!("load config {}", config.display()))?;
    let tensors = NamedTensors::load(checkpoint)
        .with_context(|| format!("load checkpoint {}", checkpoint.display()))?;
    eprintln!(
        "Loaded {} tensors: n_layer={}, d_model={}, vocab={}",
        tensors.len(),
        config.n_layer,
        config.d_model,
        config.vocab_size
    );
    Ok((tensors, config))
}

fn cmd_export(args: ExportArgs) -> Result<()> {
    let (mut tensors, config) = load_checkpoint(&args.checkpoint, &args.config)?;

    let profile = if args.quantize {
        let placement = match args.scale_placement.as_str() {
            "per-template" => ScalePlacement::PerTemplate,
            _ => ScalePlacement::PerTensor,
        };
        ExportProfile::Q8_0(Q8Options {
            group_size: args.group_size,
            placement,
            ..Q8Options::default()
        })
    } else {
        ExportProfile::Float32
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} tensors")
            .context("progress template")?
            .progress_chars("=>-"),
    );
    let exporter = ModelExporter::new(profile)
        .check_shapes(!args.no_check)
        .with_progress(pb);

    eprintln!("Exporting to {} ...", args.output.display());
    let summary = exporter.export_to_path(&mut tensors, &config, &args.output)?;
    tracing::info!(
        path = %args.output.display(),
        tensors = summary.tensors.len(),
        quantized = summary.quantized_count(),
        derived_layers = summary.derived_layers,
        "Model exported"
    );
    eprintln!(
        "Done. {} tensors ({} quantised), {} bytes ({:.2} MB)",
        summary.tensors.len(),
        summary.quantized_count(),
        summary.bytes_written,
        summary.bytes_written as f64 / 1024.0 / 1024.0
    );
    if let Some(err) = summary.max_error() {
        eprintln!("Max quantisation error: {err:.6}");
    }

    if let Some(header_path) = &args.header {
        let header = ConfigHeader::derive(&tensors, &config)?;
        header.save(header_path, header_format(&args.header_format))?;
        eprintln!("Config header: {}", header_path.display());
    }
    Ok(())
}

fn cmd_header(args: HeaderArgs) -> Result<()> {
    let (tensors, config) = load_checkpoint(&args.checkpoint, &args.config)?;
    let header = ConfigHeader::derive(&tensors, &config)?;
    header.check(&tensors)?;
    header.save(&args.output, header_format(&args.header_format))?;
    tracing::info!(?header, "Header derived");
    for (name, value) in header.entries() {
        eprintln!("{name:<20} {value}");
    }
    eprintln!("Config header: {}", args.output.display());
    Ok(())
}

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use btrieve_dump::dump::{write_records, DumpFormat};
use btrieve_dump::extract::{extract, page_map, ExtractOptions, ShortYieldPolicy};
use btrieve_dump::fcr::{load, FileDescriptor};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "btrieve-dump", about = "Dump the records of a Btrieve file", arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every record, one per line
    Dump {
        input: PathBuf,
        /// Output format: spaced (default) or json
        #[arg(short, long, default_value = "spaced")]
        format: String,
        /// Fail when the file holds fewer records than its header declares
        #[arg(long)]
        strict: bool,
        /// Scan pages on all cores (needs the `parallel` feature)
        #[arg(long)]
        parallel: bool,
    },
    /// Show the file control record
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List pages after the FCR and whether each holds records
    Pages {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = match parse_args(std::env::args_os()) {
        Ok(Some(cli)) => cli,
        // Bare invocation: usage on stdout, success.
        Ok(None) => {
            return match Cli::command().print_help() {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(e) => e.exit(),
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_line(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

/// Parse the command line.  `Ok(None)` means no arguments were given.
fn parse_args<I, T>(args: I) -> Result<Option<Cli>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(e) if e.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Ok(None),
        Err(e) => Err(e),
    }
}

fn error_line(err: &dyn std::error::Error) -> String {
    format!("error: {err}")
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, format, strict, parallel } => {
            let format = parse_format(&format);
            let bytes = std::fs::read(&input)?;
            let desc = load(&bytes)?;
            let options = ExtractOptions {
                short_yield: if strict { ShortYieldPolicy::Fail } else { ShortYieldPolicy::Warn },
                parallel,
            };
            let extraction = extract(&bytes, &desc, &options)?;
            info!("{}", extraction.report.summary());

            let stdout = io::stdout();
            write_records(BufWriter::new(stdout.lock()), format, &desc, &extraction)?;
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let bytes = std::fs::read(&input)?;
            let desc = load(&bytes)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&desc)?);
            } else {
                print_info(&input, &desc);
            }
        }

        // ── Pages ────────────────────────────────────────────────────────────
        Commands::Pages { input } => {
            let bytes = std::fs::read(&input)?;
            let desc = load(&bytes)?;
            let mut out = BufWriter::new(io::stdout().lock());
            writeln!(out, "{:>8} {:>10} {:>6}  Kind", "Page", "Offset", "Usage")?;
            for page in page_map(&bytes, &desc)? {
                let kind = if page.is_data { "data" } else { "other" };
                writeln!(out, "{:>8} {:>#10x} {:>#06x}  {}", page.index, page.offset, page.usage, kind)?;
            }
            out.flush()?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn print_info(path: &Path, desc: &FileDescriptor) {
    println!("── Btrieve file ─────────────────────────────────────────");
    println!("  Path             {}", path.display());
    println!("  Format           {}", desc.format);
    println!("  Active FCR       {:?}", desc.active_fcr);
    if let Some(usage) = desc.fcr_usage {
        println!("  FCR usage        {}", usage);
    }
    println!("  Page size        {} B", desc.page_size);
    println!("  Pages (FCR)      {}", desc.page_count);
    println!("  Pages (file)     {}", desc.total_pages());
    println!("  Record length    {} B", desc.physical_length);
    println!("  Records          {}", desc.record_count);
    println!("  Record type      {}", desc.record_type);
    println!("  User flags       {:#06x}", desc.user_flags as u16);
    println!("  File size        {} B", desc.file_size);
}

fn parse_format(s: &str) -> DumpFormat {
    DumpFormat::from_name(s).unwrap_or_else(|| {
        eprintln!("Unknown format '{}', defaulting to spaced", s);
        DumpFormat::Spaced
    })
}

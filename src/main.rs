//! Filter the spectra of an mzML file.
//!
//! ```bash
//! # Keep MS1 spectra and drop points below an intensity of 10
//! mzfilter input.mzML output.mzML -f mslevel:1 -f baseline:10
//!
//! # Read from stdin and write to stdout
//! cat input.mzML | mzfilter - - -f to_minutes -f rt:10,20
//! ```
use std::error::Error;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::{error, info, warn, LevelFilter};

use mzfilter::io::{run_pipeline, scan_mz_range, PipelineSummary};
use mzfilter::{FilterChain, MzMLReader, MzMLWriter};

/// Apply an ordered chain of filters to the spectra of an mzML file
#[derive(Parser, Debug)]
#[command(name = "mzfilter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The mzML file to read, or `-` for stdin
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// The mzML file to write, or `-` for stdout
    #[arg(value_name = "OUTPUT", required_unless_present = "mz_range")]
    output: Option<PathBuf>,

    /// A filter specification, `name:arg1,arg2,...`. Filters are applied in the order given.
    #[arg(short = 'f', long = "filter", value_name = "SPEC")]
    filters: Vec<String>,

    /// Do not record the filters in the output's data processing history
    #[arg(long)]
    no_provenance: bool,

    /// Filter spectra in parallel batches of this size
    #[arg(short = 'b', long, value_name = "N")]
    batch_size: Option<usize>,

    /// Print the m/z range of the input's MS1 spectra and exit
    #[arg(long)]
    mz_range: bool,

    /// Log more, repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Log less, repeat to only log errors
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        match (self.verbose, self.quiet) {
            (0, 0) => LevelFilter::Info,
            (1, _) => LevelFilter::Debug,
            (v, _) if v > 1 => LevelFilter::Trace,
            (_, 1) => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(File::open(path)?))
    }
}

fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdout().lock()))
    } else {
        Ok(Box::new(File::create(path)?))
    }
}

fn filter_file(cli: &Cli, output: &Path) -> Result<PipelineSummary, Box<dyn Error>> {
    let chain = FilterChain::parse(cli.filters.iter())?;
    info!("Filtering {} with {} filters", cli.input.display(), chain.len());

    let mut reader = MzMLReader::new(open_input(&cli.input)?)?;
    let mut writer = MzMLWriter::new(open_output(output)?, reader.document().clone())?;
    if !cli.no_provenance {
        writer = writer.with_processing(chain.specs());
    }

    let summary = match cli.batch_size {
        #[cfg(feature = "parallelism")]
        Some(batch_size) => {
            mzfilter::io::run_pipeline_parallel(&mut reader, &chain, &mut writer, batch_size)?
        }
        #[cfg(not(feature = "parallelism"))]
        Some(_) => {
            warn!("Built without parallelism, ignoring --batch-size");
            run_pipeline(&mut reader, &chain, &mut writer)?
        }
        None => run_pipeline(&mut reader, &chain, &mut writer)?,
    };
    writer.set_trailer(reader.document().trailer.clone());
    writer.close()?;
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    if cli.mz_range {
        let range = open_input(&cli.input)
            .map_err(Box::<dyn Error>::from)
            .and_then(|handle| Ok(MzMLReader::new(handle)?))
            .and_then(|mut reader| Ok(scan_mz_range(&mut reader)?));
        return match range {
            Ok(Some((low, high))) => {
                println!("{low}\t{high}");
                ExitCode::SUCCESS
            }
            Ok(None) => {
                warn!("{} has no MS1 m/z values", cli.input.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to scan {}: {e}", cli.input.display());
                ExitCode::FAILURE
            }
        };
    }

    let Some(output) = cli.output.as_ref() else {
        error!("No output path was given");
        return ExitCode::FAILURE;
    };
    match filter_file(&cli, output) {
        Ok(summary) => {
            info!(
                "Wrote {} of {} spectra to {}",
                summary.written,
                summary.read,
                output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

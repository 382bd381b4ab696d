use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::{
    config::GenerationRequest,
    dataset::Compression,
    error::Error,
    materializer::{Materializer, UniformFill, WriterOptions},
    orchestrator::Orchestrator,
    pool::WorkerPool,
    regulator::ThreadSleeper,
};

mod config;
mod dataset;
mod error;
mod materializer;
mod naming;
mod orchestrator;
mod pool;
mod regulator;
mod sizer;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opt {
    #[clap(long, default_value_t = 1.0, allow_negative_numbers = true, help = "size of each file in gigabytes")]
    file_size: f64,

    #[clap(
        long,
        default_value_t = 0.5,
        allow_negative_numbers = true,
        help = "target aggregate bandwidth in gigabytes per second.
every file is held back until it took at least file_size / bandwidth seconds"
    )]
    bandwidth: f64,

    #[clap(long, default_value_t = 3, help = "number of files to generate")]
    num_files: usize,

    #[clap(long, help = "directory for generated files, created if missing")]
    output_directory: PathBuf,

    #[clap(long, help = "number of worker threads. defaults to available parallelism")]
    workers: Option<usize>,

    #[clap(long, help = "host identifier embedded in file names. defaults to the machine host name")]
    host: Option<String>,

    #[clap(long, default_value = "uncompressed")]
    compression: Compression,

    #[clap(
        long,
        default_value_t = 1 << 20,
        help = "number of values written per row group. larger groups use more memory while writing"
    )]
    rows_per_group: usize,

    #[clap(long, default_value = "false", help = "sync file data to disk before closing every file")]
    fsync: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let opt: Opt = Opt::parse();
    if opt.rows_per_group == 0 {
        return Err(Error::invalid("rows per group must be positive").into());
    }
    let workers = opt
        .workers
        .map(|workers| NonZeroUsize::new(workers).ok_or_else(|| Error::invalid("number of workers must be at least 1")))
        .transpose()?;
    let host = match opt.host {
        Some(host) => host,
        None => hostname().context("resolving host name")?,
    };
    let request =
        GenerationRequest::from_gigabytes(opt.file_size, opt.bandwidth, opt.num_files, opt.output_directory, host)?;
    let pool = match workers {
        Some(workers) => WorkerPool::new(workers)?,
        None => WorkerPool::with_available_parallelism()?,
    };
    info!("running with {} workers", pool.size());

    let materializer = Materializer::new(
        UniformFill,
        WriterOptions {
            compression: opt.compression,
            rows_per_group: opt.rows_per_group,
            fsync: opt.fsync,
        },
    );
    let report = Orchestrator::new(request, &pool, materializer, ThreadSleeper).run()?;
    info!("generated {} files", report.outcomes.len());
    Ok(())
}

fn hostname() -> Result<String> {
    let mut buf = [0u8; 256];
    if unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) } != 0 {
        bail!("gethostname: {}", std::io::Error::last_os_error());
    }
    // the name is truncated without a terminator if it doesn't fit
    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

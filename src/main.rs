//! chmweb - Compiled HTML Help to static website converter

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use chmweb::Options;

#[derive(Parser)]
#[command(name = "chmweb")]
#[command(version, about = "Convert Compiled HTML Help archives into static websites")]
struct Cli {
    /// Input archives followed by the output directory:
    /// `manual.chm site/`, `a.chm b.chm site/`, or `collection.chw site/`
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Compress every generated page with gzip (writes *.gz, removes the
    /// plain originals)
    #[arg(long)]
    gzip_pages: bool,

    /// Write the contents tree as JSON to the given path
    #[arg(long, value_name = "PATH")]
    write_toc_json: Option<PathBuf>,

    /// Worker process count (defaults to available parallelism)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Run as a pool worker on stdin/stdout (internal)
    #[arg(long, hide = true)]
    worker: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.worker {
        return match chmweb::pool::worker::run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("worker error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if cli.paths.len() < 2 {
        eprintln!("error: expected at least one archive and an output directory");
        return ExitCode::FAILURE;
    }
    let mut inputs = cli.paths;
    let outdir = inputs.pop().expect("checked above");

    let options = Options {
        inputs,
        outdir,
        gzip_pages: cli.gzip_pages,
        toc_json: cli.write_toc_json,
        jobs: cli.jobs,
    };

    match chmweb::run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

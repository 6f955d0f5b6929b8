//! Worker-side job loop.
//!
//! A worker is this same executable re-invoked with a hidden flag. Its life
//! is one loop: read a framed job from stdin, run it, flush any warnings,
//! write the result frame. A job error is reported in an `Error` frame and
//! the worker exits with status 1; parent closure appears as EOF and the
//! worker exits cleanly.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::contents::parser::{parse_hhc, ContentsItem};
use crate::error::Result;
use crate::pool::protocol::{read_frame, write_frame, Reply};
use crate::scan::page::{scan_page, PageRecord};

/// A job dispatched to a worker. Paths are absolute; workers share no state
/// with the parent beyond what rides in the frame.
#[derive(Debug, Serialize, Deserialize)]
pub enum Job {
    ScanPage { path: PathBuf },
    ParseContents { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum JobResult {
    Page(PageRecord),
    Contents(Vec<ContentsItem>),
}

/// Run the worker loop until stdin closes. Never returns on job failure.
pub fn run() -> Result<()> {
    let mut stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    while let Some(job) = read_frame::<_, Job>(&mut stdin)? {
        let mut warnings = Vec::new();
        let outcome = execute(job, &mut warnings);
        for warning in warnings {
            write_frame(&mut stdout, &Reply::<JobResult>::Warning(warning))?;
        }
        match outcome {
            Ok(result) => write_frame(&mut stdout, &Reply::Result(result))?,
            Err(err) => {
                write_frame(&mut stdout, &Reply::<JobResult>::Error(err.to_string()))?;
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// The pure function the pool executes. Per-document problems degrade to
/// warnings plus an empty result; only infrastructure failures error.
fn execute(job: Job, warnings: &mut Vec<String>) -> Result<JobResult> {
    match job {
        Job::ScanPage { path } => {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warnings.push(format!("cannot read {}: {err}", path.display()));
                    return Ok(JobResult::Page(PageRecord::default()));
                }
            };
            Ok(JobResult::Page(scan_page(&bytes, warnings)))
        }
        Job::ParseContents { path } => {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warnings.push(format!("cannot read {}: {err}", path.display()));
                    return Ok(JobResult::Contents(Vec::new()));
                }
            };
            match parse_hhc(&bytes) {
                Ok(items) => Ok(JobResult::Contents(items)),
                Err(err) => {
                    warnings.push(format!("contents file {} unusable: {err}", path.display()));
                    Ok(JobResult::Contents(Vec::new()))
                }
            }
        }
    }
}

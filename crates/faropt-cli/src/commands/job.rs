use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use faropt_api::schemas::TaskStatus;
use faropt_core::cancellable::CancellablePoller;
use faropt_core::{
    BackendKind, CancellationToken, FarOpt, FarOptError, JobHandle, JobId, LogEvent,
};

use crate::{print_info, print_success, print_warn};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Directory holding the optimization code, with `main.py` or `main.jl` at its root.
    pub source: PathBuf,
    /// Run as a short synchronous function invocation instead of a container task.
    #[arg(long)]
    pub micro: bool,
    /// Block until the job is stopped.
    #[arg(long)]
    pub wait: bool,
    /// Print log events as they arrive until the job is stopped.
    #[arg(long)]
    pub follow: bool,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    pub job_id: JobId,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    pub job_id: JobId,
    /// Keep polling for new events until the job is stopped.
    #[arg(long)]
    pub follow: bool,
    /// Number of events already seen.
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub job_id: JobId,
    /// Name of the file under the job's output directory.
    pub file: String,
    /// Where to write the file. Defaults to the file name in the current directory.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MetricArgs {
    pub job_id: JobId,
    pub name: String,
    /// How far back to look, in minutes.
    #[arg(long, default_value_t = 60)]
    pub window: u64,
}

pub(crate) fn backend_kind(micro: bool) -> BackendKind {
    if micro {
        BackendKind::Micro
    } else {
        BackendKind::Macro
    }
}

pub(crate) fn handle_submit(
    args: SubmitArgs,
    faropt: &FarOpt,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let mut job = faropt.job();
    let archive = job
        .configure(&args.source)
        .with_context(|| format!("Failed to package {}", args.source.display()))?;
    print_info!(
        "Packaged {} files ({} bytes) from {}",
        archive.file_count(),
        archive.uncompressed_size(),
        args.source.display()
    );

    let job_id = job.submit(backend_kind(args.micro))?;
    print_success!("Submitted job {job_id}");

    follow_up(faropt, &job, args.wait, args.follow, token)
}

/// Shared tail of `submit` and `recipe run`.
pub(crate) fn follow_up(
    faropt: &FarOpt,
    job: &JobHandle,
    wait: bool,
    follow: bool,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    if job.backend() == Some(BackendKind::Micro) {
        if let Some(micrologs) = job.micrologs() {
            for line in micrologs.lines() {
                println!("{line}");
            }
        }
        return Ok(());
    }

    if follow {
        follow_logs(faropt, job, 0, token)?;
    } else if wait {
        let status = job.wait(token)?;
        print_success!("Job is {status}");
    }
    Ok(())
}

pub(crate) fn handle_status(args: JobArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    if job.backend() == Some(BackendKind::Micro) {
        print_info!("Micro job {} is {}", args.job_id, TaskStatus::Stopped);
        return Ok(());
    }

    let task = job.status()?;
    print_info!("Job {} is {}", args.job_id, task.last_status);
    print_info!("Task: {}", task.task_arn);
    if let Some(desired) = task.desired_status {
        print_info!("Desired status: {desired}");
    }
    if let Some(reason) = task.stopped_reason {
        print_info!("Stopped reason: {reason}");
    }
    Ok(())
}

pub(crate) fn handle_wait(
    args: JobArgs,
    faropt: &FarOpt,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    let status = job.wait(token)?;
    print_success!("Job {} is {status}", args.job_id);
    Ok(())
}

pub(crate) fn handle_logs(
    args: LogsArgs,
    faropt: &FarOpt,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    if args.follow {
        return follow_logs(faropt, &job, args.skip, token);
    }

    let mut count = args.skip;
    for event in job.stream_logs(None, args.skip)? {
        print_event(&event?);
        count += 1;
    }
    print_info!("{count} events, resume with --skip {count}");
    Ok(())
}

/// Print new events every poll interval until the job stops.
fn follow_logs(
    faropt: &FarOpt,
    job: &JobHandle,
    skip: usize,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let interval = faropt.config().poll_interval();
    let poller = CancellablePoller::with_interval(token.clone(), interval);
    let mut seen = skip;

    let outcome = poller.poll_until(|| {
        let stopped = match job.primary_status() {
            Ok(status) => status == TaskStatus::Stopped,
            Err(FarOptError::NotFound(_)) => return None,
            Err(e) => return Some(Err(e)),
        };
        match job.stream_logs(None, seen) {
            Ok(stream) => {
                for event in stream {
                    match event {
                        Ok(event) => {
                            print_event(&event);
                            seen += 1;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
            Err(FarOptError::LogsUnavailable(_)) | Err(FarOptError::NotFound(_)) => {}
            Err(e) => return Some(Err(e)),
        }
        stopped.then_some(Ok(()))
    });

    match outcome.into_result(|| FarOptError::Cancelled) {
        Ok(result) => result?,
        Err(e) => {
            print_warn!("Stopped following logs after {seen} events, resume with --skip {seen}");
            return Err(e.into());
        }
    }
    print_success!("Job is {}, {seen} events", TaskStatus::Stopped);
    Ok(())
}

fn print_event(event: &LogEvent) {
    match event.time() {
        Some(time) => println!("{} {}", time.format("%Y-%m-%d %H:%M:%S%.3f"), event.message),
        None => println!("{}", event.message),
    }
}

pub(crate) fn handle_stop(args: JobArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    if job.backend() == Some(BackendKind::Micro) {
        print_warn!("Micro job {} cannot be stopped", args.job_id);
        return Ok(());
    }
    job.stop()?;
    print_success!("Requested stop of job {}", args.job_id);
    Ok(())
}

pub(crate) fn handle_jobs(args: ListArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let jobs = faropt.list_jobs(args.limit)?;
    if jobs.is_empty() {
        print_info!("No jobs found");
    }
    for job in jobs {
        println!("{}\t{}\t{}/{}", job.jobid, job.backend(), job.bucket, job.path);
    }
    Ok(())
}

pub(crate) fn handle_outputs(args: JobArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    let outputs = job.list_outputs()?;
    if outputs.is_empty() {
        print_info!("Job {} has no outputs yet", args.job_id);
    }
    for name in outputs {
        println!("{name}");
    }
    Ok(())
}

pub(crate) fn handle_download(args: DownloadArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    let bytes = job.download_output(&args.file)?;
    let target = args.output.unwrap_or_else(|| PathBuf::from(&args.file));
    std::fs::write(&target, &bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    print_success!("Downloaded {} bytes to {}", bytes.len(), target.display());
    Ok(())
}

pub(crate) fn handle_metric(args: MetricArgs, faropt: &FarOpt) -> anyhow::Result<()> {
    let job = faropt.attach_registered(&args.job_id)?;
    let datapoints = job.metric(&args.name, Duration::from_secs(args.window * 60))?;
    if datapoints.is_empty() {
        print_info!(
            "No datapoints for {} in the last {} minutes",
            args.name,
            args.window
        );
    }
    for point in datapoints {
        let average = point
            .average
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{average}", point.timestamp);
    }
    Ok(())
}

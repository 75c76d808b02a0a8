//! Download bundles and the leases that keep them alive.
//!
//! A bundle is a ZIP holding `report.json` and `output/<name>` for every
//! successful input. It is written once to `<workspace>/bundle.zip` and then
//! served from disk for every download.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use semi_core::error::CoreError;
use semi_core::job_status::{JobMode, JobStatus};
use semi_core::types::JobId;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::record::{JobResult, SharedEntry};

/// A finished bundle on disk.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub len: u64,
    /// Hex SHA-256 of the bundle bytes.
    pub sha256: String,
}

impl Artifact {
    /// Quoted strong validator for the `ETag` header.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.sha256)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct ReportEntry<'a> {
    input: &'a str,
    output: Option<String>,
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    job_id: JobId,
    mode: JobMode,
    status: JobStatus,
    total_inputs: usize,
    output_count: usize,
    error_count: usize,
    results: Vec<ReportEntry<'a>>,
}

/// What goes into a bundle, captured under the record lock.
#[derive(Debug, Clone)]
pub struct BundleSource {
    pub job_id: JobId,
    pub mode: JobMode,
    pub status: JobStatus,
    pub total_inputs: usize,
    pub results: Vec<JobResult>,
}

impl BundleSource {
    pub fn capture(entry: &SharedEntry) -> Self {
        let record = entry.lock();
        Self {
            job_id: entry.id,
            mode: entry.mode,
            status: record.status,
            total_inputs: entry.total(),
            results: record.results.clone(),
        }
    }
}

fn archive_name(output: &Path) -> Option<String> {
    output
        .file_name()
        .map(|name| format!("output/{}", name.to_string_lossy()))
}

/// Write the bundle for `source` to `dest`.
///
/// Entries carry a fixed timestamp, so the same results always produce the
/// same bytes. The file is written next to `dest` and renamed into place.
pub fn build_bundle(source: &BundleSource, dest: &Path) -> Result<Artifact, PackageError> {
    let part = dest.with_extension("zip.part");
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(BufWriter::new(File::create(&part)?));

    let report = Report {
        job_id: source.job_id,
        mode: source.mode,
        status: source.status,
        total_inputs: source.total_inputs,
        output_count: source.results.iter().filter(|r| r.succeeded()).count(),
        error_count: source.results.iter().filter(|r| !r.succeeded()).count(),
        results: source
            .results
            .iter()
            .map(|r| ReportEntry {
                input: &r.input,
                output: r.output.as_deref().and_then(archive_name),
                error: r.error.as_deref(),
            })
            .collect(),
    };
    zip.start_file("report.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(&report)?)?;

    for output in source.results.iter().filter_map(|r| r.output.as_deref()) {
        let Some(name) = archive_name(output) else {
            continue;
        };
        zip.start_file(name, options)?;
        io::copy(&mut File::open(output)?, &mut zip)?;
    }

    zip.finish()?.flush()?;

    let mut hasher = Sha256::new();
    let len = io::copy(&mut File::open(&part)?, &mut hasher)?;
    std::fs::rename(&part, dest)?;

    Ok(Artifact {
        path: dest.to_path_buf(),
        len,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

/// Return the job's bundle, building it on first use.
///
/// Concurrent callers wait for the first build; a failed build leaves the
/// cell empty so a later download retries.
pub async fn ensure_artifact(entry: &SharedEntry) -> Result<Artifact, CoreError> {
    let artifact = entry
        .artifact
        .get_or_try_init(|| async {
            let source = BundleSource::capture(entry);
            let dest = entry.workspace.bundle_path();
            let job_id = entry.id;

            let artifact = tokio::task::spawn_blocking(move || build_bundle(&source, &dest))
                .await
                .map_err(|e| CoreError::Internal(format!("Bundle task failed: {e}")))?
                .map_err(|e| {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to build bundle");
                    CoreError::Internal(format!("Failed to build bundle: {e}"))
                })?;

            tracing::info!(
                job_id = %job_id,
                bytes = artifact.len,
                sha256 = %artifact.sha256,
                "Bundle built",
            );
            Ok::<_, CoreError>(artifact)
        })
        .await?;
    Ok(artifact.clone())
}

/// Counted claim on a job's files. While any lease is alive the reaper
/// leaves the job alone.
#[derive(Debug)]
pub struct DownloadLease {
    entry: SharedEntry,
}

impl DownloadLease {
    /// Take a lease. Fails with not-found once the job has been reaped.
    pub fn acquire(entry: &SharedEntry) -> Result<Self, CoreError> {
        let mut record = entry.lock();
        if record.reaped {
            return Err(CoreError::job_not_found(entry.id));
        }
        record.leases += 1;
        Ok(Self {
            entry: entry.clone(),
        })
    }
}

impl Drop for DownloadLease {
    fn drop(&mut self) {
        let mut record = self.entry.lock();
        record.leases = record.leases.saturating_sub(1);
    }
}

/// File body that holds a [`DownloadLease`] until it is dropped, whether the
/// transfer completed or the client went away.
pub struct LeasedStream {
    inner: ReaderStream<tokio::fs::File>,
    _lease: DownloadLease,
}

impl LeasedStream {
    pub fn new(file: tokio::fs::File, lease: DownloadLease) -> Self {
        Self {
            inner: ReaderStream::new(file),
            _lease: lease,
        }
    }
}

impl Stream for LeasedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

//! One extraction pass per dump file: decompress, parse, filter, flatten, sink.

use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{error, info, warn};

use crate::{
    dump_parser::{DumpParser, ParsedPage, StructuralError},
    flatten::flatten_page,
    sink::{RowSink, SinkError},
    source,
    subjects::{Admission, PageFilter},
};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Cooperative stop signal, honoured between pages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub progress_every: Duration,
    /// Pages with an index below this are parsed but not emitted.
    pub resume_after_pages: u64,
    /// Resume point of each partition run by [`run_partitions`], keyed by partition label. Replaces
    /// `resume_after_pages` there; partitions without an entry start from the first page.
    pub resume_points: FxHashMap<String, u64>,
    pub cancel: CancellationToken,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_INTERVAL,
            resume_after_pages: 0,
            resume_points: FxHashMap::default(),
            cancel: CancellationToken::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub partition_id: String,
    pub pages_seen: u64,
    pub pages_matched: u64,
    pub revisions_emitted: u64,
}

impl ProgressReport {
    fn log(&self, elapsed: Duration) {
        info!(
            partition = self.partition_id.as_str(),
            pages_seen = self.pages_seen,
            pages_matched = self.pages_matched,
            revisions_emitted = self.revisions_emitted,
            elapsed_secs = elapsed.as_secs(),
            "progress"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub progress: ProgressReport,
    pub malformed_revisions: u64,
    /// Number of leading pages whose rows are durably in the sink. Pass as `resume_after_pages` to continue.
    pub last_committed_page: u64,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("failed to open partition {partition_id}")]
    Open {
        partition_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dump in partition {partition_id} at byte {}", .source.offset())]
    Structural {
        partition_id: String,
        #[source]
        source: StructuralError,
    },
    #[error("sink failed in partition {partition_id} after {committed_pages} committed pages")]
    Sink {
        partition_id: String,
        committed_pages: u64,
        #[source]
        source: SinkError,
    },
}

// rejects every title, so pages before the resume point are walked without building anything
struct SkipAll;

impl PageFilter for SkipAll {
    fn admit(&self, _title: &str) -> Admission {
        Admission::Discard
    }
}

/// Run one partition to completion, cancellation or the first fatal error.
///
/// Rows of a page are flushed to the sink before the next page is parsed, so the sink's backpressure
/// reaches the parser directly.
pub fn extract_partition<R, F, S>(
    partition_id: &str,
    reader: R,
    filter: &F,
    sink: &mut S,
    options: &ExtractOptions,
) -> Result<PartitionSummary, PartitionError>
where
    R: BufRead,
    F: PageFilter + ?Sized,
    S: RowSink + ?Sized,
{
    let span = tracing::info_span!("partition", id = partition_id);
    let _entered = span.enter();

    let mut parser = DumpParser::new(reader);
    let mut progress = ProgressReport {
        partition_id: partition_id.to_string(),
        pages_seen: 0,
        pages_matched: 0,
        revisions_emitted: 0,
    };
    // pages before the resume point were committed by an earlier run
    let mut committed = options.resume_after_pages;
    let mut cancelled = false;
    let started = Instant::now();
    let mut last_report = started;

    let sink_error = |committed_pages: u64, source: SinkError| {
        error!(message = "Sink failed", committed_pages, error = %source);
        PartitionError::Sink {
            partition_id: partition_id.to_string(),
            committed_pages,
            source,
        }
    };

    loop {
        if options.cancel.is_cancelled() {
            warn!(pages_seen = progress.pages_seen, "cancelled");
            cancelled = true;
            break;
        }

        let parsed = if progress.pages_seen < options.resume_after_pages {
            parser.next_page(&SkipAll)
        } else {
            parser.next_page(filter)
        };
        let parsed = parsed.map_err(|source| PartitionError::Structural {
            partition_id: partition_id.to_string(),
            source,
        })?;

        match parsed {
            None => break,
            Some(ParsedPage::Discarded { .. }) => {}
            Some(ParsedPage::Retained { page, .. }) => {
                progress.pages_matched += 1;
                for row in flatten_page(&page) {
                    sink.append(&row).map_err(|e| sink_error(committed, e))?;
                    progress.revisions_emitted += 1;
                }
                sink.flush().map_err(|e| sink_error(committed, e))?;
            }
        }
        progress.pages_seen += 1;
        committed = committed.max(progress.pages_seen);

        if last_report.elapsed() >= options.progress_every {
            progress.log(started.elapsed());
            last_report = Instant::now();
        }
    }

    sink.finish().map_err(|e| sink_error(committed, e))?;

    progress.log(started.elapsed());
    let summary = PartitionSummary {
        progress,
        malformed_revisions: parser.malformed_revisions(),
        last_committed_page: committed,
        cancelled,
    };
    if summary.malformed_revisions > 0 {
        warn!(
            malformed_revisions = summary.malformed_revisions,
            "skipped revisions with missing mandatory fields"
        );
    }
    Ok(summary)
}

#[derive(Debug)]
pub struct PartitionOutcome {
    pub path: PathBuf,
    pub partition_id: String,
    pub result: Result<PartitionSummary, PartitionError>,
}

/// Run one partition per input file in parallel. A failing partition never affects the others.
///
/// `make_sink` receives the input path, the partition label and the partition's resume point, and creates that
/// partition's sink. A sink for a resumed partition has to keep the rows already written.
pub fn run_partitions<F, S, M>(
    paths: &[PathBuf],
    filter: &F,
    options: &ExtractOptions,
    make_sink: M,
) -> Vec<PartitionOutcome>
where
    F: PageFilter + ?Sized,
    S: RowSink,
    M: Fn(&Path, &str, u64) -> Result<S, SinkError> + Sync,
{
    paths
        .par_iter()
        .map(|path| {
            let partition_id = source::partition_label(path);
            let result = run_partition(path, &partition_id, filter, options, &make_sink);
            if let Err(e) = &result {
                error!(path = %path.display(), error = %e, "partition failed");
            }
            PartitionOutcome {
                path: path.clone(),
                partition_id,
                result,
            }
        })
        .collect()
}

fn run_partition<F, S, M>(
    path: &Path,
    partition_id: &str,
    filter: &F,
    options: &ExtractOptions,
    make_sink: &M,
) -> Result<PartitionSummary, PartitionError>
where
    F: PageFilter + ?Sized,
    S: RowSink,
    M: Fn(&Path, &str, u64) -> Result<S, SinkError>,
{
    let resume_after_pages = options.resume_points.get(partition_id).copied().unwrap_or(0);
    let options = ExtractOptions {
        resume_after_pages,
        ..options.clone()
    };

    let reader = source::open_dump(path).map_err(|source| PartitionError::Open {
        partition_id: partition_id.to_string(),
        source,
    })?;
    let mut sink = make_sink(path, partition_id, resume_after_pages).map_err(|source| {
        PartitionError::Sink {
            partition_id: partition_id.to_string(),
            committed_pages: resume_after_pages,
            source,
        }
    })?;
    extract_partition(partition_id, reader, filter, &mut sink, &options)
}

//! Processing several files.
//!
//! [`run_each`] gives every file its own compositor. [`run_bound`] treats the
//! files as consecutive parts of one long recording and fills a single
//! canvas: the first pass opens every file and resolves its duration, the
//! second acquires each file's share of the bound plan at its cumulative
//! offset.
//!
//! In both modes a file failing with a
//! [fatal-per-file](SnapError::is_fatal_per_file) error is reported through
//! [`SessionEvent::FileSkipped`] and the queue moves on. Any other error
//! ends the queue.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::compositor::{CanvasSpec, Compositor, RunSummary};
use crate::config::SnapOptions;
use crate::error::SnapError;
use crate::plan::{ShotLayout, SnapPlanner};
use crate::progress::SessionEvent;
use crate::session::{AcquisitionReport, RunReport, Session};
use crate::source::MediaSource;

/// A file the queue gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Path of the file.
    pub path: PathBuf,
    /// Rendered error.
    pub error: String,
}

/// Outcome of [`run_each`].
#[derive(Debug, Clone, Default)]
pub struct QueueReport {
    /// One report per processed file, in queue order.
    pub runs: Vec<RunReport>,
    /// Files that were skipped.
    pub skipped: Vec<SkippedFile>,
    /// Whether the queue stopped because of cancellation.
    pub cancelled: bool,
}

/// One file's share of a bound canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPart {
    /// Path of the file.
    pub path: PathBuf,
    /// Where the file starts in the bound range, milliseconds.
    pub offset_ms: i64,
    /// Resolved duration of the file, milliseconds.
    pub duration_ms: i64,
    /// The file's acquisition.
    pub acquisition: AcquisitionReport,
}

/// Outcome of [`run_bound`].
#[derive(Debug, Clone, Default)]
pub struct BoundReport {
    /// Files that made it into the canvas, in queue order.
    pub parts: Vec<BoundPart>,
    /// Files that were skipped.
    pub skipped: Vec<SkippedFile>,
    /// Shots placed over all files.
    pub taken: usize,
    /// Shots planned over all files.
    pub planned: usize,
    /// Total duration of the bound range, milliseconds.
    pub duration_ms: i64,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

fn skip(
    options: &SnapOptions,
    skipped: &mut Vec<SkippedFile>,
    path: &Path,
    error: SnapError,
) -> Result<(), SnapError> {
    if !error.is_fatal_per_file() {
        return Err(error);
    }
    warn!("Skipping {}: {error}", path.display());
    let error = error.to_string();
    options.listener.on_event(&SessionEvent::FileSkipped {
        path: path.to_path_buf(),
        error: error.clone(),
    });
    skipped.push(SkippedFile {
        path: path.to_path_buf(),
        error,
    });
    Ok(())
}

/// Process every file on its own.
///
/// `open` turns a path into a session (for FFmpeg files,
/// [`Session::open`]); `compositor_for` builds the compositor receiving that
/// file's shots.
pub fn run_each<S, O, C>(
    paths: &[PathBuf],
    options: &SnapOptions,
    mut open: O,
    mut compositor_for: C,
) -> Result<QueueReport, SnapError>
where
    S: MediaSource,
    O: FnMut(&Path, &SnapOptions) -> Result<Session<S>, SnapError>,
    C: FnMut(&Path) -> Result<Box<dyn Compositor>, SnapError>,
{
    let mut report = QueueReport::default();
    for path in paths {
        if options.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let mut session = match open(path, options) {
            Ok(session) => session,
            Err(error) => {
                skip(options, &mut report.skipped, path, error)?;
                continue;
            }
        };
        let mut compositor = compositor_for(path)?;
        let run = match session.run(compositor.as_mut()) {
            Ok(run) => run,
            Err(error) => {
                session.close();
                skip(options, &mut report.skipped, path, error)?;
                continue;
            }
        };
        session.close();

        report.cancelled |= run.cancelled;
        report.runs.push(run);
        if report.cancelled {
            break;
        }
    }
    info!(
        "Queue finished: {} processed, {} skipped",
        report.runs.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Bind every file into one canvas.
///
/// `label` names the canvas handed to [`Compositor::begin`]. Keyframe rips
/// cannot be bound.
pub fn run_bound<S, O>(
    paths: &[PathBuf],
    options: &SnapOptions,
    label: &str,
    mut open: O,
    compositor: &mut dyn Compositor,
) -> Result<BoundReport, SnapError>
where
    S: MediaSource,
    O: FnMut(&Path, &SnapOptions) -> Result<Session<S>, SnapError>,
{
    let mut report = BoundReport::default();
    let mut sessions: Vec<(PathBuf, i64, Session<S>)> = Vec::with_capacity(paths.len());

    for path in paths {
        match open(path, options) {
            Ok(session) => {
                let offset = report.duration_ms;
                report.duration_ms += session.duration().millis;
                sessions.push((path.clone(), offset, session));
            }
            Err(error) => skip(options, &mut report.skipped, path, error)?,
        }
    }
    let Some((_, _, first)) = sessions.first() else {
        return Err(SnapError::InvalidOptions(
            "none of the files to bind could be opened".to_string(),
        ));
    };

    let range_end = options
        .time_to_ms
        .map_or(report.duration_ms, |to| to.min(report.duration_ms));
    let layout = ShotLayout::resolve(options, range_end - options.time_from_ms);
    if layout.is_keyframe_rip() {
        return Err(SnapError::InvalidOptions(
            "keyframe rips cannot be bound into one canvas".to_string(),
        ));
    }
    let planner = SnapPlanner::new(&layout, options, report.duration_ms);
    let (thumbnail_width, thumbnail_height) = first.thumbnail_size();
    let canvas = CanvasSpec {
        label: label.to_string(),
        columns: layout.columns,
        rows: layout.rows,
        shots: planner.shots(),
        thumbnail_width,
        thumbnail_height,
        duration_ms: report.duration_ms,
    };
    info!(
        "Binding {} files, {} ms, {} shots",
        sessions.len(),
        report.duration_ms,
        canvas.shots
    );

    options.listener.on_begin(label, Some(canvas.shots as u64));
    compositor.begin(&canvas)?;

    for (path, offset_ms, mut session) in sessions {
        if report.cancelled || options.is_cancelled() {
            report.cancelled = true;
            break;
        }
        session.rebind(layout);
        let mut plan = session.plan_bound(&planner, offset_ms);
        if plan.is_empty() {
            continue;
        }
        session.connect(thumbnail_width, thumbnail_height)?;
        let acquisition = session.acquire(&mut plan, compositor)?;
        let duration_ms = session.duration().millis;
        session.close();

        report.taken += acquisition.taken;
        report.planned += acquisition.planned;
        report.cancelled |= acquisition.cancelled;
        report.parts.push(BoundPart {
            path,
            offset_ms,
            duration_ms,
            acquisition,
        });
    }

    compositor.end(&RunSummary {
        label: label.to_string(),
        taken: report.taken,
        planned: report.planned,
        cancelled: report.cancelled,
    })?;
    options.listener.on_end(label, report.taken as u64);
    Ok(report)
}

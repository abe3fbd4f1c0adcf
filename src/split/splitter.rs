//! Channel splitter
//!
//! Splits one interleaved source slice into two destination slices using
//! two independent extraction functions. One extraction runs on a single
//! persistent background worker while the calling thread runs the other;
//! the call returns only when both halves are complete, so the operation
//! is synchronous from the caller's point of view.

use crossbeam::channel::{self, Sender};
use once_cell::sync::Lazy;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use thiserror::Error;
use tracing::trace;

use crate::config::SplitConfig;

/// Splitter errors
#[derive(Debug, Error)]
pub enum SplitError {
    /// Destination and source lengths disagree; nothing was written
    #[error("length mismatch: source {src_len}, dest_a {dest_a}, dest_b {dest_b}")]
    LengthMismatch {
        /// Source element count
        src_len: usize,
        /// First destination length
        dest_a: usize,
        /// Second destination length
        dest_b: usize,
    },
    /// The background worker is gone; the output must be discarded
    #[error("split worker unavailable")]
    WorkerUnavailable,
    /// The worker-side extraction panicked; the output must be discarded
    #[error("split task panicked")]
    TaskPanicked,
}

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Job {
    task: Task,
    done: Sender<thread::Result<()>>,
}

/// Channel splitter backed by one persistent worker thread.
///
/// The worker runs one task at a time; concurrent calls queue behind the
/// task in flight. Dropping the splitter closes the queue and the worker
/// exits after finishing its current job.
pub struct Splitter {
    jobs: Sender<Job>,
    parallel_cutoff: usize,
}

static GLOBAL: Lazy<Splitter> = Lazy::new(Splitter::new);

impl Splitter {
    /// Create a splitter with default configuration
    pub fn new() -> Self {
        Self::with_config(&SplitConfig::default())
    }

    /// Create a splitter with explicit configuration
    pub fn with_config(config: &SplitConfig) -> Self {
        let (jobs, queue) = channel::bounded::<Job>(1);
        thread::Builder::new()
            .name("frame-split".into())
            .spawn(move || {
                for job in queue {
                    let result = panic::catch_unwind(AssertUnwindSafe(job.task));
                    let _ = job.done.send(result);
                }
            })
            .expect("failed to spawn frame-split worker");
        Self {
            jobs,
            parallel_cutoff: config.parallel_cutoff,
        }
    }

    /// Process-wide splitter for callers without a session-owned one
    pub fn global() -> &'static Splitter {
        &GLOBAL
    }

    /// Split `source` into `dest_a` (via `split_a`) and `dest_b` (via
    /// `split_b`).
    ///
    /// Both destinations are fully populated when this returns `Ok`; on any
    /// error the output is unspecified and must be discarded. Counts below
    /// the configured cutoff run serially on the calling thread, which is
    /// a performance decision only and never changes the result.
    pub fn split<S, RA, RB, A, B>(
        &self,
        dest_a: &mut [RA],
        dest_b: &mut [RB],
        source: &[S],
        split_a: A,
        split_b: B,
    ) -> Result<(), SplitError>
    where
        S: Sync,
        RA: Copy + Send,
        RB: Copy,
        A: Fn(&S) -> RA + Send,
        B: Fn(&S) -> RB,
    {
        check_lengths(dest_a.len(), dest_b.len(), source.len())?;
        if source.len() < self.parallel_cutoff {
            extract_into(dest_a, source, &split_a);
            extract_into(dest_b, source, &split_b);
            return Ok(());
        }
        self.split_parallel(dest_a, dest_b, source, split_a, split_b)
    }

    fn split_parallel<S, RA, RB, A, B>(
        &self,
        dest_a: &mut [RA],
        dest_b: &mut [RB],
        source: &[S],
        split_a: A,
        split_b: B,
    ) -> Result<(), SplitError>
    where
        S: Sync,
        RA: Copy + Send,
        RB: Copy,
        A: Fn(&S) -> RA + Send,
        B: Fn(&S) -> RB,
    {
        trace!(count = source.len(), "parallel split dispatch");

        let (done_tx, done_rx) = channel::bounded(1);

        let task: Box<dyn FnOnce() + Send + '_> = Box::new(move || {
            extract_into(dest_a, source, &split_a);
        });
        // Safety: the task's borrows stay valid until this frame returns,
        // and this frame does not return until the worker has reported the
        // task finished (or the send below failed, in which case the task
        // was dropped unrun inside the rejected Job).
        let task: Task = unsafe { mem::transmute(task) };

        if self.jobs.send(Job { task, done: done_tx }).is_err() {
            return Err(SplitError::WorkerUnavailable);
        }

        // The other side runs here. A panic must not unwind past the recv
        // below, or the worker could still be writing through borrows the
        // unwound frame gave out.
        let local = panic::catch_unwind(AssertUnwindSafe(|| {
            extract_into(dest_b, source, &split_b);
        }));

        let remote = done_rx.recv();

        if let Err(payload) = local {
            panic::resume_unwind(payload);
        }

        match remote {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SplitError::TaskPanicked),
            Err(_) => Err(SplitError::WorkerUnavailable),
        }
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial fallback: both extractions interleaved on the calling thread.
/// Behaviorally identical to [`Splitter::split`].
pub fn split_serial<S, RA, RB, A, B>(
    dest_a: &mut [RA],
    dest_b: &mut [RB],
    source: &[S],
    split_a: A,
    split_b: B,
) -> Result<(), SplitError>
where
    RA: Copy,
    RB: Copy,
    A: Fn(&S) -> RA,
    B: Fn(&S) -> RB,
{
    check_lengths(dest_a.len(), dest_b.len(), source.len())?;
    for ((a, b), s) in dest_a.iter_mut().zip(dest_b.iter_mut()).zip(source) {
        *a = split_a(s);
        *b = split_b(s);
    }
    Ok(())
}

fn check_lengths(dest_a: usize, dest_b: usize, src_len: usize) -> Result<(), SplitError> {
    if dest_a != src_len || dest_b != src_len {
        return Err(SplitError::LengthMismatch {
            src_len,
            dest_a,
            dest_b,
        });
    }
    Ok(())
}

fn extract_into<S, R, F>(dest: &mut [R], source: &[S], extract: &F)
where
    F: Fn(&S) -> R,
{
    for (d, s) in dest.iter_mut().zip(source) {
        *d = extract(s);
    }
}

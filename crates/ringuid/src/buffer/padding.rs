//! Background refilling of the ring buffer.
//!
//! The [`BufferPaddingExecutor`] owns up to two threads:
//!
//! - the **padding worker**, parked until the ring buffer fires its padding
//!   trigger (fill level under the threshold), then runs one padding pass;
//! - the optional **scheduler**, which runs a pass every
//!   `schedule_interval` as a safety net.
//!
//! Both go through the same single-flight guard, so concurrent requests
//! collapse into at most one active pass. A pass walks seconds forward from
//! the executor's own `last_second`, asking the [`UidProvider`] for every id
//! of each second and putting them into the buffer until it is full.

use core::time::Duration;
use std::{
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
    time::Instant,
};

use portable_atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Result, RingBuffer, UidProvider,
    mutex::{Mutex, lock_unpoisoned},
};

const WORKER_THREAD_NAME: &str = "ringuid-padding";
const SCHEDULER_THREAD_NAME: &str = "ringuid-padding-schedule";

/// State shared between the executor handle and its threads.
struct Shared {
    buffer: Arc<RingBuffer>,
    provider: Box<dyn UidProvider>,
    /// Last second handed to the provider.
    last_second: AtomicU64,
    /// Single-flight guard.
    running: AtomicBool,
    shutdown: AtomicBool,
    /// First fatal clock error; padding never resumes once set.
    fatal: OnceLock<Error>,
}

/// Resets the single-flight flag even if the provider panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn padding_buffer(&self) -> Result<usize> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::trace!("padding already in progress");
            return Ok(0);
        }
        let _running = RunningGuard(&self.running);

        if let Some(err) = self.fatal.get().and_then(Error::fatal_copy) {
            return Err(err);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            tail = self.buffer.tail(),
            cursor = self.buffer.cursor(),
            "ready to pad ring buffer"
        );

        let mut padded = 0;
        while !self.shutdown.load(Ordering::Acquire) && !self.buffer.is_full() {
            let second = self.last_second.fetch_add(1, Ordering::AcqRel) + 1;
            let ids = match self.provider.provide(second) {
                Ok(ids) => ids,
                Err(err) => {
                    if let Some(fatal) = err.fatal_copy() {
                        let _ = self.fatal.set(fatal);
                    }
                    return Err(err);
                }
            };
            let batch = ids.len();
            let stored = self.buffer.put_batch(ids);
            padded += stored;
            if stored < batch {
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            padded,
            tail = self.buffer.tail(),
            cursor = self.buffer.cursor(),
            last_second = self.last_second.load(Ordering::Acquire),
            "end padding ring buffer"
        );

        Ok(padded)
    }

    /// Runs a pass on a background thread, where errors can only be logged.
    fn padding_in_background(&self) {
        if let Err(_e) = self.padding_buffer() {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_e, "background padding failed");
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Keeps a [`RingBuffer`] topped up with ids computed ahead of demand.
///
/// Construct it with the buffer, a batch [`UidProvider`] and the second to
/// start after, run [`Self::padding_buffer`] once to pre-fill, then
/// [`Self::start`] the background threads. Dropping the executor shuts the
/// threads down.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ringuid::{BufferPaddingExecutor, Result, RingBuffer};
///
/// let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
/// // Four ids per "second".
/// let provider = |second: u64| -> Result<Vec<u64>> { Ok((0..4).map(|s| second * 4 + s).collect()) };
///
/// let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), provider, 0);
/// assert_eq!(executor.padding_buffer().unwrap(), 8);
/// assert!(buffer.is_full());
/// assert_eq!(buffer.take().unwrap(), 4);
/// ```
pub struct BufferPaddingExecutor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl BufferPaddingExecutor {
    /// Creates an executor; no threads are started yet.
    ///
    /// The first pass asks `provider` for `start_second + 1`.
    pub fn new(
        buffer: Arc<RingBuffer>,
        provider: impl UidProvider + 'static,
        start_second: u64,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                buffer,
                provider: Box::new(provider),
                last_second: AtomicU64::new(start_second),
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                fatal: OnceLock::new(),
            }),
            worker: Mutex::new(None),
            scheduler: Mutex::new(None),
        }
    }

    /// Runs one padding pass on the calling thread.
    ///
    /// Returns the number of ids stored; `0` if another pass was already in
    /// progress, the buffer was full, or the executor is shut down.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error. A fatal one
    /// ([`Error::TimestampExhausted`], [`Error::ClockBeforeEpoch`]) is kept
    /// and returned by every later pass without asking the provider again.
    /// Ids already stored stay valid.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn padding_buffer(&self) -> Result<usize> {
        self.shared.padding_buffer()
    }

    /// Starts the padding worker and, if `schedule_interval` is set, the
    /// scheduler, and registers the worker as the buffer's padding trigger.
    ///
    /// Calling `start` again, or after shutdown, does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] if a thread could not be created.
    pub fn start(&self, schedule_interval: Option<Duration>) -> Result<()> {
        let mut worker = lock_unpoisoned(&self.worker);
        if worker.is_some() || self.shared.is_shutdown() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let requested = Arc::new(AtomicBool::new(false));
        let pending = Arc::clone(&requested);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || {
                #[cfg(feature = "tracing")]
                tracing::trace!("padding worker started");

                while !shared.is_shutdown() {
                    if pending.swap(false, Ordering::AcqRel) {
                        shared.padding_in_background();
                    } else {
                        thread::park();
                    }
                }

                #[cfg(feature = "tracing")]
                tracing::trace!("padding worker stopped");
            })
            .map_err(Error::Spawn)?;

        let worker_thread = handle.thread().clone();
        self.shared.buffer.set_padding_trigger(move || {
            if !requested.swap(true, Ordering::AcqRel) {
                worker_thread.unpark();
            }
        });
        *worker = Some(handle);
        drop(worker);

        if let Some(interval) = schedule_interval {
            self.start_scheduler(interval)?;
        }
        Ok(())
    }

    fn start_scheduler(&self, interval: Duration) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(SCHEDULER_THREAD_NAME.into())
            .spawn(move || {
                #[cfg(feature = "tracing")]
                tracing::trace!(?interval, "padding scheduler started");

                let mut next_run = Instant::now() + interval;
                while !shared.is_shutdown() {
                    let now = Instant::now();
                    if now < next_run {
                        thread::park_timeout(next_run - now);
                        continue;
                    }
                    shared.padding_in_background();
                    next_run = Instant::now() + interval;
                }

                #[cfg(feature = "tracing")]
                tracing::trace!("padding scheduler stopped");
            })
            .map_err(Error::Spawn)?;

        *lock_unpoisoned(&self.scheduler) = Some(handle);
        Ok(())
    }

    /// Returns `true` while a padding pass is in progress.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// The last second handed to the provider.
    pub fn last_second(&self) -> u64 {
        self.shared.last_second.load(Ordering::Acquire)
    }

    /// The fatal clock error that stopped padding, if any.
    pub fn fatal_error(&self) -> Option<&Error> {
        self.shared.fatal.get()
    }

    /// The buffer this executor fills.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.shared.buffer
    }

    /// Stops the background threads and waits for them to exit.
    ///
    /// An in-flight pass stops after its current batch. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("shutting down padding executor");

        let handles = [
            lock_unpoisoned(&self.worker).take(),
            lock_unpoisoned(&self.scheduler).take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.thread().unpark();
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("padding thread panicked");
            }
        }
    }
}

impl Drop for BufferPaddingExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Asynchronous tile loader.
//!
//! A controller thread owns the loader state and the worker pool. Callers
//! talk to it through an event queue: they hand over a batch of
//! [`TileRequest`]s, cancel the running batch, reset a faulted loader or shut
//! it down. The controller reports every started request exactly once to the
//! registered [`TileLoaderListener`]s, either as complete or as failed.

use crate::core::config::{DebugOptions, TileLoaderConfig};
use crate::tiles::pool::WorkerPool;
use crate::tiles::request::{TileRequest, CANCELLED};
use crate::tiles::tile::{Bitmap, TileId};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("there are running tile requests, cancel them first")]
    BatchInProgress,

    #[error("unable to terminate running tile requests after {attempts} waits ({waited_ms} ms)")]
    TerminationTimeout { attempts: u32, waited_ms: u64 },

    #[error("loader is faulted: {0}")]
    Faulted(String),

    #[error("loader has been shut down")]
    ShutDown,

    #[error("failed to start worker threads: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Loading,
    Cancelling,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Cancelling => "CANCELLING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    Cancelled,
    Error,
}

/// Observer of tile outcomes. All callbacks run on the loader's controller
/// thread, so implementations should return quickly.
///
/// The loader calls the `on_request_*` hooks; their default bodies forward
/// to the tile-id based callbacks. Override them when the outcome must be
/// matched against the exact request that produced it.
pub trait TileLoaderListener: Send + Sync {
    fn on_started(&self, _tile_id: TileId) {}

    fn on_complete(&self, _tile_id: TileId, _image: Bitmap) {}

    fn on_failed(&self, _tile_id: TileId, _reason: FailReason, _cause: &str) {}

    fn on_request_complete(&self, request: &TileRequest, image: Bitmap) {
        self.on_complete(request.tile_id(), image);
    }

    fn on_request_failed(&self, request: &TileRequest, reason: FailReason, cause: &str) {
        self.on_failed(request.tile_id(), reason, cause);
    }
}

/// Handle returned by [`TileLoader::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Reply = Option<Sender<Result<(), LoaderError>>>;

enum Event {
    NewBatch(Reply),
    Cancel(Reply),
    Reset(Reply),
    Shutdown,
}

fn respond(reply: Reply, result: Result<(), LoaderError>) {
    if let Some(tx) = reply {
        let _ = tx.send(result);
    }
}

struct Shared {
    state: Mutex<LoaderState>,
    fault: Mutex<Option<LoaderError>>,
    pending: Mutex<Vec<Arc<TileRequest>>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn TileLoaderListener>)>>,
    shut_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TileLoader {
    events: Sender<Event>,
    shared: Arc<Shared>,
    controller: Mutex<Option<JoinHandle<()>>>,
    controller_id: ThreadId,
    next_listener: AtomicU64,
    worker_count: usize,
}

impl TileLoader {
    /// Starts the controller thread. Worker threads are only created while a
    /// batch is running.
    pub fn new(config: TileLoaderConfig, debug: DebugOptions) -> Result<Self, LoaderError> {
        let (events_tx, events_rx) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(LoaderState::Idle),
            fault: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });

        let worker_count = config.worker_count;
        let controller = Controller {
            events: events_rx,
            backlog: VecDeque::new(),
            shared: shared.clone(),
            config,
            debug,
            pool: None,
            running: Vec::new(),
        };

        let handle = thread::Builder::new()
            .name("tile-loader".into())
            .spawn(move || controller.run())
            .map_err(|e| LoaderError::Spawn(e.to_string()))?;

        log::info!("TileLoader with {} workers started", worker_count);

        Ok(Self {
            events: events_tx,
            shared,
            controller_id: handle.thread().id(),
            controller: Mutex::new(Some(handle)),
            next_listener: AtomicU64::new(0),
            worker_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn state(&self) -> LoaderState {
        *lock(&self.shared.state)
    }

    /// The fatal error that stopped batch processing, if any.
    pub fn fault(&self) -> Option<LoaderError> {
        lock(&self.shared.fault).clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }

    pub fn add_listener(&self, listener: Arc<dyn TileLoaderListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.listeners).push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.shared.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn check_accepting(&self) -> Result<(), LoaderError> {
        if self.is_shut_down() {
            return Err(LoaderError::ShutDown);
        }
        if let Some(fault) = self.fault() {
            return Err(LoaderError::Faulted(fault.to_string()));
        }
        Ok(())
    }

    fn send(&self, event: Event) -> Result<(), LoaderError> {
        self.events.send(event).map_err(|_| LoaderError::ShutDown)
    }

    fn send_and_wait(&self, make: impl FnOnce(Reply) -> Event) -> Result<(), LoaderError> {
        let (tx, rx) = bounded(1);
        self.send(make(Some(tx)))?;
        rx.recv().map_err(|_| LoaderError::ShutDown)?
    }

    /// Replaces the pending batch and asks the controller to start it.
    /// Rejections by the controller (e.g. a batch still running) are only
    /// logged; use [`TileLoader::submit_batch_blocking`] to observe them.
    pub fn submit_batch<I>(&self, requests: I) -> Result<(), LoaderError>
    where
        I: IntoIterator,
        I::Item: Into<Arc<TileRequest>>,
    {
        self.check_accepting()?;
        self.replace_pending(requests);
        self.send(Event::NewBatch(None))
    }

    pub fn submit_batch_blocking<I>(&self, requests: I) -> Result<(), LoaderError>
    where
        I: IntoIterator,
        I::Item: Into<Arc<TileRequest>>,
    {
        self.check_accepting()?;
        self.replace_pending(requests);
        self.send_and_wait(Event::NewBatch)
    }

    fn replace_pending<I>(&self, requests: I)
    where
        I: IntoIterator,
        I::Item: Into<Arc<TileRequest>>,
    {
        let requests = requests.into_iter().map(Into::into).collect();
        *lock(&self.shared.pending) = requests;
    }

    /// Asks the controller to cancel the running batch.
    pub fn cancel_all(&self) -> Result<(), LoaderError> {
        self.check_accepting()?;
        self.send(Event::Cancel(None))
    }

    /// Cancels the running batch and waits until every worker is gone.
    pub fn cancel_all_blocking(&self) -> Result<(), LoaderError> {
        self.check_accepting()?;
        self.send_and_wait(Event::Cancel)
    }

    /// Abandons a stuck worker pool and clears the fault.
    pub fn reset(&self) -> Result<(), LoaderError> {
        if self.is_shut_down() {
            return Err(LoaderError::ShutDown);
        }
        self.send_and_wait(Event::Reset)
    }

    /// Cancels outstanding work and stops the controller thread.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(Event::Shutdown);

        // A listener may shut the loader down from the controller thread.
        if thread::current().id() == self.controller_id {
            return;
        }
        if let Some(handle) = lock(&self.controller).take() {
            if handle.join().is_err() {
                log::error!("TileLoader controller panicked");
            }
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileLoader")
            .field("state", &self.state())
            .field("worker_count", &self.worker_count)
            .field("fault", &self.fault())
            .finish()
    }
}

/// Runs on the controller thread; sole writer of loader state.
struct Controller {
    events: Receiver<Event>,
    backlog: VecDeque<Event>,
    shared: Arc<Shared>,
    config: TileLoaderConfig,
    debug: DebugOptions,
    pool: Option<WorkerPool>,
    running: Vec<Arc<TileRequest>>,
}

impl Controller {
    fn run(mut self) {
        loop {
            let event = self.next_event();
            let keep_running = match event {
                Some(event) => self.dispatch(event),
                None => true,
            };
            if !keep_running {
                break;
            }
            self.check_running();
        }
        log::info!("TileLoader stopped");
    }

    /// Blocks while idle, otherwise waits at most one poll interval.
    fn next_event(&mut self) -> Option<Event> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        if self.state() == LoaderState::Idle {
            // All senders gone means the handle was dropped without shutdown.
            Some(self.events.recv().unwrap_or(Event::Shutdown))
        } else {
            match self.events.recv_timeout(self.config.poll_interval()) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(Event::Shutdown),
            }
        }
    }

    /// Returns `false` once the loop must stop.
    fn dispatch(&mut self, event: Event) -> bool {
        match event {
            Event::NewBatch(reply) => {
                self.trace("NEW_BATCH");
                let result = self.start_batch();
                respond(reply, result);
            }
            Event::Cancel(reply) => {
                self.trace("CANCEL");
                let result = self.cancel_running();
                respond(reply, result);
            }
            Event::Reset(reply) => {
                self.trace("RESET");
                self.reset();
                respond(reply, Ok(()));
            }
            Event::Shutdown => {
                self.trace("SHUTDOWN");
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn start_batch(&mut self) -> Result<(), LoaderError> {
        let batch = std::mem::take(&mut *lock(&self.shared.pending));
        if batch.is_empty() {
            // Superseded by a batch already taken, or an empty submission.
            return Ok(());
        }
        if let Some(fault) = lock(&self.shared.fault).clone() {
            return Err(LoaderError::Faulted(fault.to_string()));
        }
        if self.pool.is_some() || !self.running.is_empty() {
            log::error!(
                "Rejected batch of {} requests: {} requests still running",
                batch.len(),
                self.running.len()
            );
            return Err(LoaderError::BatchInProgress);
        }

        let pool = WorkerPool::new(self.config.worker_count, "tile-worker")
            .map_err(|e| LoaderError::Spawn(e.to_string()))?;
        self.set_state(LoaderState::Loading);

        for request in &batch {
            let task = request.clone();
            pool.execute(Box::new(move |token| task.execute(token)));
        }
        self.pool = Some(pool);
        self.running = batch;
        log::debug!("Started batch of {} tile requests", self.running.len());

        let started: Vec<TileId> = self.running.iter().map(|r| r.tile_id()).collect();
        for tile_id in started {
            self.fire(|l| l.on_started(tile_id));
        }

        self.collapse_queued_events();
        Ok(())
    }

    /// Folds events queued behind a batch start so a burst of submissions
    /// only runs the latest batch. Batch events whose requests were already
    /// taken are answered right away, together with the cancels that only
    /// targeted those superseded batches.
    fn collapse_queued_events(&mut self) {
        let queued: Vec<Event> = self
            .backlog
            .drain(..)
            .chain(self.events.try_iter())
            .collect();
        if queued.is_empty() {
            return;
        }

        if !lock(&self.shared.pending).is_empty() {
            // A newer batch arrived after ours was taken: keep everything.
            self.backlog.extend(queued);
            return;
        }

        let last_batch = queued
            .iter()
            .rposition(|event| matches!(event, Event::NewBatch(_)));
        for (index, event) in queued.into_iter().enumerate() {
            match event {
                Event::NewBatch(reply) => respond(reply, Ok(())),
                Event::Cancel(reply) if last_batch.map_or(false, |last| index < last) => {
                    respond(reply, Ok(()))
                }
                other => self.backlog.push_back(other),
            }
        }
    }

    fn cancel_running(&mut self) -> Result<(), LoaderError> {
        if let Some(fault) = lock(&self.shared.fault).clone() {
            return Err(LoaderError::Faulted(fault.to_string()));
        }
        if self.pool.is_none() {
            return Ok(());
        }

        self.set_state(LoaderState::Cancelling);
        let count = self.running.len();
        log::debug!("Cancelling {} running requests...", count);

        let attempts = self.config.cancel_wait_attempts.max(1);
        let wait = self.config.cancel_wait();
        let mut dropped = 0;
        let mut terminated = false;
        if let Some(pool) = self.pool.as_mut() {
            dropped = pool.shutdown_now();
            terminated = (0..attempts).any(|_| pool.await_termination(wait));
        }

        if !terminated {
            let err = LoaderError::TerminationTimeout {
                attempts,
                waited_ms: attempts as u64 * self.config.cancel_wait_ms,
            };
            log::error!("{}", err);
            *lock(&self.shared.fault) = Some(err.clone());
            return Err(err);
        }

        self.pool = None;
        self.fail_all_running();
        log::debug!(
            "Cancelling {} running requests...done ({} never started)",
            count,
            dropped
        );
        self.set_state(LoaderState::Idle);
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown_now();
            log::warn!("Abandoning worker pool with {} requests", self.running.len());
        }
        self.fail_all_running();
        *lock(&self.shared.fault) = None;
        self.set_state(LoaderState::Idle);
    }

    fn shutdown(&mut self) {
        if self.pool.is_some() {
            if let Err(e) = self.cancel_running() {
                log::error!("Shutdown with stuck workers: {}", e);
                self.reset();
            }
        }
        self.shared.shut_down.store(true, Ordering::SeqCst);

        let leftovers: Vec<Event> = self
            .backlog
            .drain(..)
            .chain(self.events.try_iter())
            .collect();
        for event in leftovers {
            match event {
                Event::NewBatch(reply) | Event::Cancel(reply) | Event::Reset(reply) => {
                    respond(reply, Err(LoaderError::ShutDown))
                }
                Event::Shutdown => {}
            }
        }
        self.set_state(LoaderState::Idle);
    }

    fn fail_all_running(&mut self) {
        let cancelled: Vec<Arc<TileRequest>> = self.running.drain(..).collect();
        for request in &cancelled {
            self.fire(|l| l.on_request_failed(request, FailReason::Cancelled, CANCELLED));
        }
    }

    /// Reports terminated requests in discovery order and releases the pool
    /// once nothing is left.
    fn check_running(&mut self) {
        if self.running.is_empty() {
            return;
        }

        let (done, still_running): (Vec<_>, Vec<_>) = self
            .running
            .drain(..)
            .partition(|request| request.is_terminated());
        self.running = still_running;

        for request in &done {
            match request.outcome() {
                Some(Ok(image)) => self.fire(|l| l.on_request_complete(request, image.clone())),
                Some(Err(cause)) => {
                    let reason = if cause == CANCELLED {
                        FailReason::Cancelled
                    } else {
                        FailReason::Error
                    };
                    self.fire(|l| l.on_request_failed(request, reason, &cause));
                }
                None => {}
            }
        }
        if !done.is_empty() {
            log::debug!(
                "{} requests completed, {} requests pending",
                done.len(),
                self.running.len()
            );
        }

        if self.running.is_empty() {
            if let Some(mut pool) = self.pool.take() {
                pool.shutdown();
            }
            self.set_state(LoaderState::Idle);
        }
    }

    fn fire(&self, mut call: impl FnMut(&dyn TileLoaderListener)) {
        let listeners: Vec<Arc<dyn TileLoaderListener>> = lock(&self.shared.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            call(listener.as_ref());
        }
    }

    fn state(&self) -> LoaderState {
        *lock(&self.shared.state)
    }

    fn set_state(&self, new_state: LoaderState) {
        let mut state = lock(&self.shared.state);
        if *state != new_state {
            if self.debug.log_loader_events {
                log::debug!("StateChange: {} --> {}", *state, new_state);
            }
            *state = new_state;
        }
    }

    fn trace(&self, event: &str) {
        if self.debug.log_loader_events {
            log::debug!("Event: {} received", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::{GeoCoord, TileNumber};
    use crate::tiles::fetch::{DecodeError, FetchError, TileDecoder, TileFetcher};
    use image::RgbaImage;
    use std::time::{Duration, Instant};

    struct OkFetcher;

    impl TileFetcher for OkFetcher {
        fn fetch_tile_image(&self, _: GeoCoord, _: u8, _: u32, _: u32) -> Result<Vec<u8>, FetchError> {
            Ok(vec![7])
        }
    }

    struct StubDecoder;

    impl TileDecoder for StubDecoder {
        fn decode(&self, _: &[u8]) -> Result<Bitmap, DecodeError> {
            Ok(Arc::new(RgbaImage::new(1, 1)))
        }
    }

    #[derive(Default)]
    struct Counter {
        started: Mutex<Vec<TileId>>,
        complete: Mutex<Vec<TileId>>,
        failed: Mutex<Vec<(TileId, FailReason)>>,
    }

    impl TileLoaderListener for Counter {
        fn on_started(&self, tile_id: TileId) {
            self.started.lock().unwrap().push(tile_id);
        }

        fn on_complete(&self, tile_id: TileId, _image: Bitmap) {
            self.complete.lock().unwrap().push(tile_id);
        }

        fn on_failed(&self, tile_id: TileId, reason: FailReason, _cause: &str) {
            self.failed.lock().unwrap().push((tile_id, reason));
        }
    }

    fn request(column: i32) -> TileRequest {
        TileRequest::new(
            TileId::new(column, 0),
            TileNumber::new(0.5, 0.5, 1),
            Arc::new(OkFetcher),
            Arc::new(StubDecoder),
        )
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_batch_completes_and_returns_to_idle() {
        let loader = TileLoader::new(TileLoaderConfig::for_testing(), DebugOptions::default()).unwrap();
        let counter = Arc::new(Counter::default());
        loader.add_listener(counter.clone());

        loader
            .submit_batch_blocking(vec![request(0), request(1), request(2)])
            .unwrap();

        assert!(wait_for(|| counter.complete.lock().unwrap().len() == 3));
        assert!(wait_for(|| loader.state() == LoaderState::Idle));
        assert_eq!(counter.started.lock().unwrap().len(), 3);
        assert!(counter.failed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_on_idle_is_noop() {
        let loader = TileLoader::new(TileLoaderConfig::for_testing(), DebugOptions::default()).unwrap();
        let counter = Arc::new(Counter::default());
        loader.add_listener(counter.clone());

        loader.cancel_all_blocking().unwrap();
        assert_eq!(loader.state(), LoaderState::Idle);
        assert!(counter.failed.lock().unwrap().is_empty());
        assert!(counter.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let loader = TileLoader::new(TileLoaderConfig::for_testing(), DebugOptions::default()).unwrap();
        let counter = Arc::new(Counter::default());
        let id = loader.add_listener(counter.clone());
        assert!(loader.remove_listener(id));
        assert!(!loader.remove_listener(id));

        loader.submit_batch_blocking(vec![request(0)]).unwrap();
        assert!(wait_for(|| loader.state() == LoaderState::Idle));
        assert!(counter.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_shutdown_rejects_further_work() {
        let loader = TileLoader::new(TileLoaderConfig::for_testing(), DebugOptions::default()).unwrap();
        loader.shutdown();
        assert!(loader.is_shut_down());
        assert_eq!(loader.submit_batch(vec![request(0)]), Err(LoaderError::ShutDown));
        assert_eq!(loader.cancel_all(), Err(LoaderError::ShutDown));
    }
}

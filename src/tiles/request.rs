use crate::core::constants::{MAX_RETRIES, MAX_ZOOM_LEVEL, TILE_SIZE};
use crate::core::geo::TileNumber;
use crate::tiles::fetch::{DecodeError, FetchError, TileDecoder, TileFetcher};
use crate::tiles::pool::CancelToken;
use crate::tiles::tile::{Bitmap, TileId};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Terminal cause of a task that was interrupted.
pub const CANCELLED: &str = "Cancelled";

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl AttemptError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(e) => e.kind(),
            Self::Decode(_) => "Decode",
        }
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(FetchError::Cancelled))
    }

    /// `"<Kind>: <message>"`
    fn cause(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[derive(Debug, Default)]
struct RequestState {
    terminated: bool,
    image: Option<Bitmap>,
    error: Option<String>,
    attempts: u32,
}

/// One-shot fetch of a single tile image.
///
/// [`TileRequest::execute`] runs on a pool worker; the getters may be called
/// from any thread at the same time. Once terminated the outcome never
/// changes.
pub struct TileRequest {
    tile_id: TileId,
    tile_number: TileNumber,
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn TileDecoder>,
    max_retries: u32,
    retry_delay: Duration,
    state: Mutex<RequestState>,
}

impl TileRequest {
    pub fn new(
        tile_id: TileId,
        tile_number: TileNumber,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
    ) -> Self {
        Self {
            tile_id,
            tile_number,
            fetcher,
            decoder,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_millis(100),
            state: Mutex::new(RequestState::default()),
        }
    }

    /// `max_retries` additional attempts, `retry_delay` apart.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn tile_id(&self) -> TileId {
        self.tile_id
    }

    pub fn tile_number(&self) -> TileNumber {
        self.tile_number
    }

    pub fn execute(&self, token: &CancelToken) {
        if self.is_terminated() {
            log::warn!("Tile [{}] already executed", self.tile_id);
            return;
        }

        if let Err(e) = self.validate() {
            log::error!("Tile [{}] rejected: {}", self.tile_id, e);
            self.terminate(None, Some(e.cause()));
            return;
        }

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            self.lock_state().attempts = attempts;

            let result = catch_unwind(AssertUnwindSafe(|| self.attempt(token)));
            match result {
                Ok(Ok(bitmap)) => break Ok(bitmap),
                Ok(Err(e)) if e.is_cancelled() => break Err(CANCELLED.to_string()),
                Ok(Err(e)) => {
                    log::warn!(
                        "Tile [{}] attempt {} failed: {}",
                        self.tile_id,
                        attempts,
                        e.cause()
                    );
                    if attempts > self.max_retries {
                        break Err(e.cause());
                    }
                }
                Err(_) => break Err("Panic: fetch or decode panicked".to_string()),
            }

            if !token.sleep(self.retry_delay) {
                break Err(CANCELLED.to_string());
            }
        };

        match outcome {
            Ok(bitmap) => {
                log::debug!("Tile [{}] loaded after {} attempt(s)", self.tile_id, attempts);
                self.terminate(Some(bitmap), None);
            }
            Err(cause) => {
                log::debug!("Tile [{}] gave up: {}", self.tile_id, cause);
                self.terminate(None, Some(cause));
            }
        }
    }

    fn validate(&self) -> Result<(), AttemptError> {
        if !self.tile_number.is_finite() {
            return Err(FetchError::InvalidArgument(format!(
                "tile number {:?} is not finite",
                self.tile_number
            ))
            .into());
        }
        if self.tile_number.zoom > MAX_ZOOM_LEVEL {
            return Err(FetchError::InvalidArgument(format!(
                "zoom {} exceeds {}",
                self.tile_number.zoom, MAX_ZOOM_LEVEL
            ))
            .into());
        }
        Ok(())
    }

    fn attempt(&self, token: &CancelToken) -> Result<Bitmap, AttemptError> {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled.into());
        }

        let center = self.tile_number.center();
        log::debug!(
            "Loading Tile [{}] (center={}, size={}x{}, zoom={})",
            self.tile_id,
            center.formatted(),
            TILE_SIZE,
            TILE_SIZE,
            self.tile_number.zoom
        );

        let bytes = self
            .fetcher
            .fetch_tile_image(center, self.tile_number.zoom, TILE_SIZE, TILE_SIZE)?;
        if token.is_cancelled() {
            return Err(FetchError::Cancelled.into());
        }
        if bytes.is_empty() {
            return Err(FetchError::EmptyResponse.into());
        }

        Ok(self.decoder.decode(&bytes)?)
    }

    fn terminate(&self, image: Option<Bitmap>, error: Option<String>) {
        let mut state = self.lock_state();
        state.image = image;
        state.error = error;
        state.terminated = true;
    }

    fn lock_state(&self) -> MutexGuard<'_, RequestState> {
        // The state is plain data; a poisoned lock still holds a usable value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_terminated(&self) -> bool {
        self.lock_state().terminated
    }

    pub fn is_failed(&self) -> bool {
        self.lock_state().error.is_some()
    }

    /// `true` once terminated without an error.
    pub fn is_success(&self) -> bool {
        let state = self.lock_state();
        state.terminated && state.error.is_none()
    }

    pub fn error(&self) -> Option<String> {
        self.lock_state().error.clone()
    }

    pub fn image(&self) -> Option<Bitmap> {
        self.lock_state().image.clone()
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.lock_state().attempts
    }

    /// `None` while running, then the bitmap or the failure cause.
    pub fn outcome(&self) -> Option<Result<Bitmap, String>> {
        let state = self.lock_state();
        if !state.terminated {
            return None;
        }
        match (&state.error, &state.image) {
            (Some(error), _) => Some(Err(error.clone())),
            (None, Some(image)) => Some(Ok(image.clone())),
            (None, None) => Some(Err("Missing image".to_string())),
        }
    }
}

impl std::fmt::Debug for TileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileRequest")
            .field("tile_id", &self.tile_id)
            .field("tile_number", &self.tile_number)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

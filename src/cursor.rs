use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::traits::{RawConnection, RawCursor, ResultRow};

/// Lifecycle of a [`BatchCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unopened,
    Open,
    /// A fetch returned no rows. The cursor must still be closed.
    Exhausted,
    Closed,
}

/// Rows returned by one fetch. Never empty.
pub struct RowBatch {
    rows: Vec<Box<dyn ResultRow>>,
}

impl RowBatch {
    pub fn rows(&self) -> impl Iterator<Item = &dyn ResultRow> {
        self.rows.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Pull-based cursor over an executed query.
///
/// The fetch size is fixed when the query is executed. Close the cursor with
/// [`BatchCursor::close`] on every path; a cursor dropped while open logs a
/// warning and leaves the cleanup to the driver's own drop.
pub struct BatchCursor {
    raw: Option<Box<dyn RawCursor>>,
    state: CursorState,
    fetch_size: usize,
    batches: u64,
    rows: u64,
}

impl BatchCursor {
    pub(crate) fn new(fetch_size: usize) -> Self {
        Self {
            raw: None,
            state: CursorState::Unopened,
            fetch_size,
            batches: 0,
            rows: 0,
        }
    }

    pub(crate) async fn open(&mut self, conn: &dyn RawConnection, query: &str) -> Result<()> {
        if self.state != CursorState::Unopened {
            return Err(ExtractError::query("cursor was already opened"));
        }
        let raw = conn.open_cursor(query, self.fetch_size).await?;
        self.raw = Some(raw);
        self.state = CursorState::Open;
        debug!(fetch_size = self.fetch_size, "opened cursor");
        Ok(())
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Number of non-empty batches fetched so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Number of rows fetched so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Pull the next batch of rows.
    ///
    /// Returns `Ok(None)` once no row remains; from then on the cursor is
    /// `Exhausted` and every further call returns `Ok(None)` without reaching
    /// the driver.
    pub async fn fetch(&mut self) -> Result<Option<RowBatch>> {
        match self.state {
            CursorState::Unopened => Err(ExtractError::query("cursor is not open")),
            CursorState::Closed => Err(ExtractError::CursorClosed),
            CursorState::Exhausted => Ok(None),
            CursorState::Open => {
                let raw = self.raw.as_mut().ok_or(ExtractError::CursorClosed)?;
                let rows = raw.fetch().await?;
                if rows.is_empty() {
                    self.state = CursorState::Exhausted;
                    debug!(batches = self.batches, rows = self.rows, "cursor exhausted");
                    return Ok(None);
                }
                self.batches += 1;
                self.rows += rows.len() as u64;
                Ok(Some(RowBatch { rows }))
            }
        }
    }

    /// Release the driver-side cursor. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        self.state = CursorState::Closed;
        match self.raw.take() {
            Some(mut raw) => raw.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for BatchCursor {
    fn drop(&mut self) {
        if matches!(self.state, CursorState::Open | CursorState::Exhausted) {
            warn!(rows = self.rows, "cursor dropped without close");
        }
    }
}

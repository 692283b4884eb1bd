//! Fixed-size, paced replay of a series.
//!
//! [`BatchStreamer`] blocks the calling thread between batches; [`paced_batches`]
//! yields a `Stream` that sleeps on the tokio timer instead. Both walk the same
//! [`ChunkCursor`], so ordering and coverage are identical.

use chrono::NaiveDateTime;
use futures_util::stream::{self, Stream};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use crate::data::Series;

/// One contiguous slice of the replayed series.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Absolute position of the first point in the full series.
    pub offset: usize,
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Unpaced chunking over `range` of a shared series.
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    series: Arc<Series>,
    next: usize,
    end: usize,
    batch_size: usize,
}

impl ChunkCursor {
    /// `batch_size` is raised to 1 and `range` clipped to the series.
    pub fn new(series: Arc<Series>, range: Range<usize>, batch_size: usize) -> Self {
        let end = range.end.min(series.len());
        Self {
            next: range.start.min(end),
            end,
            batch_size: batch_size.max(1),
            series,
        }
    }

    pub fn remaining(&self) -> usize {
        self.end - self.next
    }

    /// Number of batches still to come: ceil(remaining / batch_size).
    pub fn batches_remaining(&self) -> usize {
        self.remaining().div_ceil(self.batch_size)
    }
}

impl Iterator for ChunkCursor {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.end {
            return None;
        }
        let stop = (self.next + self.batch_size).min(self.end);
        let range = self.next..stop;
        self.next = stop;

        Some(Batch {
            offset: range.start,
            timestamps: self.series.timestamps_in(range.clone()).to_vec(),
            values: self.series.values_in(range).to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.batches_remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChunkCursor {}

/// Blocking streamer: sleeps `delay` before every batch except the first.
#[derive(Debug)]
pub struct BatchStreamer {
    cursor: ChunkCursor,
    delay: Duration,
    yielded: bool,
}

impl BatchStreamer {
    pub fn new(
        series: Arc<Series>,
        range: Range<usize>,
        batch_size: usize,
        delay: Duration,
    ) -> Self {
        Self {
            cursor: ChunkCursor::new(series, range, batch_size),
            delay,
            yielded: false,
        }
    }
}

impl Iterator for BatchStreamer {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor.remaining() == 0 {
            return None;
        }
        if self.yielded && !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.yielded = true;
        self.cursor.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint()
    }
}

/// Cooperative streamer: same batches as [`BatchStreamer`], paced with `tokio::time::sleep`.
pub fn paced_batches(
    series: Arc<Series>,
    range: Range<usize>,
    batch_size: usize,
    delay: Duration,
) -> impl Stream<Item = Batch> {
    let cursor = ChunkCursor::new(series, range, batch_size);
    stream::unfold((cursor, false), move |(mut cursor, yielded)| async move {
        if cursor.remaining() == 0 {
            return None;
        }
        if yielded && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let batch = cursor.next()?;
        Some((batch, (cursor, true)))
    })
}

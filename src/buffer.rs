//! Single-producer/single-consumer byte ring connecting two stages.
//!
//! The writer copies into the free tail of a fixed allocation; the reader
//! looks at unread bytes in place through a window and releases them once
//! consumed. Nothing is copied into an intermediate owned structure.
//!
//! Unread bytes always form one contiguous run `[read, write)`. When the tail
//! is exhausted the writer slides that run back to offset zero, but only while
//! the reader is parked waiting for data, which is the only time it holds no
//! window into the ring.

use crate::config::PipeConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::PipeMetrics;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io::{self, BufRead, Read, Write};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;

/// Create a connected reader/writer pair sized by `config`.
///
/// # Panics
///
/// Panics if the capacity is zero or the window is not below the capacity.
pub fn pipe(config: &PipeConfig) -> (PipeReader, PipeWriter) {
    assert!(config.capacity > 0, "pipe capacity must be non-zero");
    assert!(
        config.max_window < config.capacity,
        "max window {} must be below capacity {}",
        config.max_window,
        config.capacity
    );

    let storage = vec![0u8; config.capacity].into_boxed_slice();
    let shared = Arc::new(Shared {
        data: NonNull::from(Box::leak(storage)).cast::<u8>(),
        capacity: config.capacity,
        state: Mutex::new(State::default()),
        readable: Condvar::new(),
        writable: Condvar::new(),
        metrics: PipeMetrics::new(),
    });

    let reader = PipeReader {
        shared: Arc::clone(&shared),
        start: 0,
        len: 0,
        max_window: config.max_window,
        read_chunk: config.read_chunk.min(config.max_window).max(1),
    };
    let writer = PipeWriter { shared };
    (reader, writer)
}

#[derive(Debug, Default)]
struct State {
    /// Physical offset of the first unread byte
    read: usize,
    /// Physical offset one past the last published byte
    write: usize,
    closed: bool,
    reader_parked: bool,
    reader_gone: bool,
}

struct Shared {
    data: NonNull<u8>,
    capacity: usize,
    state: Mutex<State>,
    /// Signaled by the writer: bytes published or pipe closed
    readable: Condvar,
    /// Signaled by the reader: bytes released, reader parked or dropped
    writable: Condvar,
    metrics: PipeMetrics,
}

// SAFETY: the raw allocation is only reached through the access protocol
// documented on `PipeReader::window` and `PipeWriter::write`; all offsets are
// exchanged under `state`.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Drop for Shared {
    fn drop(&mut self) {
        let storage = ptr::slice_from_raw_parts_mut(self.data.as_ptr(), self.capacity);
        // SAFETY: `data` came from `Box::leak` of a boxed slice of `capacity`
        // bytes, and this is the last handle to it.
        unsafe { drop(Box::from_raw(storage)) };
    }
}

/// Consuming end of a pipe.
///
/// Bytes are looked at through [`window`](PipeReader::window), grown with
/// [`next`](PipeReader::next) and consumed with
/// [`release`](PipeReader::release). Dropping the reader tells the writer no
/// one is listening anymore.
pub struct PipeReader {
    shared: Arc<Shared>,
    /// Physical offset of the window, equal to `state.read` outside `fill`
    start: usize,
    len: usize,
    max_window: usize,
    read_chunk: usize,
}

impl PipeReader {
    /// Grow the window by `n` bytes, capped at the maximum window.
    ///
    /// Blocks until the bytes are available. If the writer closes first, the
    /// window takes whatever is left and the call still succeeds; the next
    /// call then reports end-of-stream. Returns `false` when nothing can be
    /// added: end-of-stream, or the window already at its maximum.
    ///
    /// # Panics
    ///
    /// Panics if `n` is larger than the pipe can ever hold.
    pub fn next(&mut self, n: usize) -> bool {
        self.fill(n, n)
    }

    /// Unread bytes currently in view
    pub fn window(&self) -> &[u8] {
        // SAFETY: `[start, start + len)` was published by the writer under the
        // state lock and stays untouched until released. The writer only moves
        // bytes while the reader is parked inside `fill`, which requires
        // `&mut self`, so no slice returned here can be alive at that point.
        unsafe { slice::from_raw_parts(self.shared.data.as_ptr().add(self.start), self.len) }
    }

    /// Consume the first `n` bytes of the window, making room for the writer.
    ///
    /// # Panics
    ///
    /// Panics if `n` is larger than the window.
    pub fn release(&mut self, n: usize) {
        assert!(
            n <= self.len,
            "release of {} bytes exceeds window of {}",
            n,
            self.len
        );
        if n == 0 {
            return;
        }

        let mut state = self.shared.state.lock();
        state.read += n;
        self.start = state.read;
        self.len -= n;
        drop(state);

        self.shared.writable.notify_one();
        self.shared.metrics.record_released(n);
    }

    /// Largest window this reader may hold
    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Counters shared with the writer
    pub fn metrics(&self) -> &PipeMetrics {
        &self.shared.metrics
    }

    /// Scan the remaining input line by line
    pub fn scan_lines(&mut self) -> Lines<'_> {
        let chunk = self.read_chunk;
        Lines {
            input: self,
            chunk,
            consumed: 0,
            skip_newline: false,
        }
    }

    /// Wait until the window holds at least `min_grow` more bytes, taking up to
    /// `max_grow` if they are already there.
    fn fill(&mut self, min_grow: usize, max_grow: usize) -> bool {
        assert!(
            min_grow <= self.shared.capacity,
            "look-ahead of {} bytes exceeds pipe capacity of {}",
            min_grow,
            self.shared.capacity
        );
        let want = (self.len + min_grow).min(self.max_window);
        let limit = (self.len + max_grow.max(min_grow)).min(self.max_window);
        if want <= self.len {
            return false;
        }

        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            let available = state.write - state.read;
            if available >= want {
                self.len = available.min(limit);
                return true;
            }
            if state.closed {
                if available > self.len {
                    self.len = available;
                    return true;
                }
                return false;
            }

            self.start = park(shared, &mut state);
        }
    }

    /// Wait for the byte right after the window without growing it.
    /// Returns `None` when the stream ends at the window's edge.
    fn peek_past_window(&mut self) -> Option<u8> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            if state.write - state.read > self.len {
                // SAFETY: the byte is published and not yet released, so it
                // lies inside `[read, write)` which the writer leaves alone.
                return Some(unsafe { *shared.data.as_ptr().add(self.start + self.len) });
            }
            if state.closed {
                return None;
            }
            self.start = park(shared, &mut state);
        }
    }
}

/// Block the reader until the writer signals, letting it compact meanwhile.
/// Returns the read offset, which compaction may have moved.
fn park(shared: &Shared, state: &mut MutexGuard<'_, State>) -> usize {
    state.reader_parked = true;
    shared.writable.notify_one();
    shared.readable.wait(state);
    state.reader_parked = false;
    state.read
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.len == 0 && !self.fill(1, buf.len()) {
            return Ok(0);
        }

        let n = self.len.min(buf.len());
        buf[..n].copy_from_slice(&self.window()[..n]);
        self.release(n);
        Ok(n)
    }
}

impl BufRead for PipeReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.len == 0 {
            self.fill(1, self.max_window);
        }
        Ok(self.window())
    }

    fn consume(&mut self, amt: usize) {
        self.release(amt);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.state.lock().reader_gone = true;
        self.shared.writable.notify_one();
    }
}

/// Producing end of a pipe.
///
/// Dropping the writer closes the pipe, so a stage that bails out early still
/// lets its consumer observe end-of-stream.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Mark the pipe closed; buffered bytes stay readable
    pub fn close(self) {
        drop(self);
    }

    /// Counters shared with the reader
    pub fn metrics(&self) -> &PipeMetrics {
        &self.shared.metrics
    }

    /// Find free room at the tail, compacting or waiting as needed.
    /// Returns the physical offset and the number of free bytes there.
    fn reserve(&mut self) -> io::Result<(usize, usize)> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        let mut blocked = false;
        loop {
            if state.reader_gone {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader has been dropped",
                ));
            }

            let tail = shared.capacity - state.write;
            if tail > 0 {
                return Ok((state.write, tail));
            }

            if state.read > 0 && state.reader_parked {
                let unread = state.write - state.read;
                let base = shared.data.as_ptr();
                // SAFETY: the reader is parked and holds no window; both ranges
                // lie inside the allocation and `ptr::copy` handles overlap.
                unsafe { ptr::copy(base.add(state.read), base, unread) };
                state.read = 0;
                state.write = unread;
                shared.metrics.record_compaction();
                continue;
            }

            if !blocked {
                blocked = true;
                shared.metrics.record_block();
            }
            shared.writable.wait(&mut state);
        }
    }
}

impl Write for PipeWriter {
    /// Copy as much of `buf` as fits, blocking until at least one byte does.
    ///
    /// Writes never need contiguous room for the whole slice, so a large
    /// write makes progress while the reader drains instead of waiting for a
    /// gap the reader may never open.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let (offset, room) = self.reserve()?;
        let n = room.min(buf.len());
        // SAFETY: `[offset, offset + n)` lies past the published write offset,
        // where the reader never looks, and only this writer moves bytes.
        unsafe {
            ptr::copy_nonoverlapping(buf.as_ptr(), self.shared.data.as_ptr().add(offset), n)
        };

        self.shared.state.lock().write = offset + n;
        self.shared.readable.notify_one();
        self.shared.metrics.record_written(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.readable.notify_one();
    }
}

/// Line scanner over a [`PipeReader`].
///
/// Lines are returned without their `\n` (and without a trailing `\r`). A
/// final line missing its terminator is still returned.
pub struct Lines<'a> {
    input: &'a mut PipeReader,
    chunk: usize,
    /// Bytes of the previously returned line still to release
    consumed: usize,
    /// The previous line filled the whole window and its `\n` sits past it
    skip_newline: bool,
}

impl<'a> Lines<'a> {
    /// Advance to the next line; `None` at end-of-stream
    pub fn next_line(&mut self) -> Result<Option<&[u8]>> {
        self.input.release(self.consumed);
        self.consumed = 0;
        if self.skip_newline {
            self.skip_newline = false;
            if self.input.next(1) {
                self.input.release(1);
            }
        }

        let mut scanned = 0;
        let end = loop {
            let window = self.input.window();
            if let Some(i) = window[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + i;
                self.consumed = end + 1;
                break end;
            }
            scanned = window.len();

            if !self.input.next(self.chunk) {
                let len = self.input.window().len();
                if len == 0 {
                    return Ok(None);
                }
                if len >= self.input.max_window() {
                    match self.input.peek_past_window() {
                        None => {}
                        Some(b'\n') => self.skip_newline = true,
                        Some(_) => {
                            return Err(PipelineError::LineTooLong {
                                limit: self.input.max_window(),
                            })
                        }
                    }
                }
                self.consumed = len;
                break len;
            }
        };

        let line = &self.input.window()[..end];
        Ok(Some(line.strip_suffix(b"\r").unwrap_or(line)))
    }
}

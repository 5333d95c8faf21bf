//! Bounded blocking ring buffer.
//!
//! Single producer, single consumer. The producer either calls
//! [`RingBuffer::write`] or reserves the next slot with
//! [`RingBuffer::write_position`], fills it in place and commits it with
//! [`WriteSlot::commit`] / [`RingBuffer::advance_write_position`]. The consumer
//! peeks the head with [`RingBuffer::read`] and releases it with
//! [`RingBuffer::advance_read_position`].
//!
//! All bookkeeping sits behind one mutex. Slots carry their own lock so a
//! reservation can be filled while the buffer lock is released.

use super::interruption::{Interruption, WaitSide, WakeTarget};
use crate::error::{Result, StreamError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

type Slot<T> = Arc<Mutex<T>>;

struct RingState<T> {
    slots: Vec<Slot<T>>,
    read: usize,
    write: usize,
    full: bool,
    empty: bool,
    /// Ticket of the open write reservation, if any
    reservation: Option<u64>,
    next_ticket: u64,
    /// Bumped by clear/resize so stale reads cannot advance
    epoch: u64,
    read_epoch: Option<u64>,
}

impl<T> RingState<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn queue_size(&self) -> usize {
        let capacity = self.capacity();
        if capacity == 0 {
            0
        } else if self.full {
            capacity
        } else {
            (self.write + capacity - self.read) % capacity
        }
    }

    fn reset_cursors(&mut self) {
        self.read = 0;
        self.write = 0;
        // A zero-sized buffer is both full and empty: every wait blocks.
        self.full = self.slots.is_empty();
        self.empty = true;
        self.epoch += 1;
        self.read_epoch = None;
    }
}

struct Shared<T> {
    id: u64,
    state: Mutex<RingState<T>>,
    /// Readers wait here for data
    readable: Condvar,
    /// Writers, resizers and clearers wait here
    writable: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, RingState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Send> WakeTarget for Shared<T> {
    fn wake(&self, side: WaitSide) {
        let _guard = self.lock();
        match side {
            WaitSide::Read => self.readable.notify_all(),
            WaitSide::Write => self.writable.notify_all(),
        }
    }
}

/// Fixed-capacity FIFO with blocking, cancellable reads and writes
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Default + Send + 'static> RingBuffer<T> {
    /// Create a buffer with `capacity` slots (0 = closed, 1 is rejected)
    pub fn new(capacity: usize) -> Result<Self> {
        let buffer = Self {
            shared: Arc::new(Shared {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(RingState {
                    slots: Vec::new(),
                    read: 0,
                    write: 0,
                    full: true,
                    empty: true,
                    reservation: None,
                    next_ticket: 0,
                    epoch: 0,
                    read_epoch: None,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        };
        buffer.resize(capacity)?;
        Ok(buffer)
    }

    /// Reallocate to `capacity` slots, discarding the content.
    ///
    /// Blocks while a write reservation is open.
    pub fn resize(&self, capacity: usize) -> Result<()> {
        if capacity == 1 {
            return Err(StreamError::ConfigurationInvalid(
                "ring buffer capacity must be 0 or at least 2".to_string(),
            ));
        }

        let mut state = self.wait_for_no_reservation();
        state.slots = (0..capacity)
            .map(|_| Arc::new(Mutex::new(T::default())))
            .collect();
        state.reset_cursors();
        drop(state);

        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
        Ok(())
    }

    /// Release the storage; the buffer stays closed until resized
    pub fn free(&self) -> Result<()> {
        self.resize(0)
    }
}

impl<T: Send + 'static> RingBuffer<T> {
    /// Token cancelling a blocked [`read`](Self::read)
    pub fn create_read_interruption(&self) -> Interruption {
        Interruption::new(self.shared.clone(), WaitSide::Read, self.shared.id)
    }

    /// Token cancelling a blocked [`write`](Self::write) or
    /// [`write_position`](Self::write_position)
    pub fn create_write_interruption(&self) -> Interruption {
        Interruption::new(self.shared.clone(), WaitSide::Write, self.shared.id)
    }

    /// Reserve the next writable slot, blocking while the buffer is full.
    pub fn write_position(&self, interruption: Option<&Interruption>) -> Result<WriteSlot<'_, T>> {
        self.check_token(interruption, WaitSide::Write)?;
        let state = self.shared.lock();
        let mut state = self.wait_while(&self.shared.writable, state, interruption, |s| {
            s.full || s.reservation.is_some()
        })?;

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.reservation = Some(ticket);
        let slot = state.slots[state.write].clone();

        Ok(WriteSlot {
            buffer: self,
            slot,
            ticket,
            committed: false,
        })
    }

    /// Commit the open reservation and wake readers.
    pub fn advance_write_position(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.reservation.take().is_none() {
            return Err(StreamError::InvalidState(
                "advance_write_position without an open reservation".to_string(),
            ));
        }

        let capacity = state.capacity();
        state.write = (state.write + 1) % capacity;
        state.full = state.write == state.read;
        state.empty = false;
        drop(state);

        self.shared.readable.notify_all();
        // Resizers and the next writer wait for the reservation to close.
        self.shared.writable.notify_all();
        Ok(())
    }

    /// Peek the head element, blocking while the buffer is empty.
    pub fn read(&self, interruption: Option<&Interruption>) -> Result<ReadSlot<T>> {
        self.check_token(interruption, WaitSide::Read)?;
        let state = self.shared.lock();
        let mut state =
            self.wait_while(&self.shared.readable, state, interruption, |s| s.empty)?;

        state.read_epoch = Some(state.epoch);
        Ok(ReadSlot {
            slot: state.slots[state.read].clone(),
        })
    }

    /// Release the head element returned by the last [`read`](Self::read).
    ///
    /// Does nothing if the buffer was cleared or resized since that read.
    pub fn advance_read_position(&self) {
        let mut state = self.shared.lock();
        if state.empty || state.read_epoch != Some(state.epoch) {
            return;
        }

        let capacity = state.capacity();
        state.read = (state.read + 1) % capacity;
        state.full = false;
        state.empty = state.read == state.write;
        state.read_epoch = None;
        drop(state);

        self.shared.writable.notify_all();
    }

    /// Drop the content, keeping the storage. Blocks while a reservation is open.
    pub fn clear(&self) {
        let mut state = self.wait_for_no_reservation();
        state.reset_cursors();
        drop(state);
        self.shared.writable.notify_all();
    }

    pub fn is_full(&self) -> bool {
        self.shared.lock().full
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().empty
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.shared.lock().capacity()
    }

    /// Number of committed, unread elements
    pub fn queue_size(&self) -> usize {
        self.shared.lock().queue_size()
    }

    /// Number of open write reservations (0 or 1)
    pub fn pending_writes(&self) -> usize {
        usize::from(self.shared.lock().reservation.is_some())
    }

    fn cancel_reservation(&self, ticket: u64) {
        let mut state = self.shared.lock();
        if state.reservation == Some(ticket) {
            state.reservation = None;
            drop(state);
            self.shared.writable.notify_all();
        }
    }

    fn wait_for_no_reservation(&self) -> MutexGuard<'_, RingState<T>> {
        let mut state = self.shared.lock();
        while state.reservation.is_some() {
            state = self
                .shared
                .writable
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        state
    }

    fn wait_while<'a>(
        &self,
        condvar: &Condvar,
        mut state: MutexGuard<'a, RingState<T>>,
        interruption: Option<&Interruption>,
        blocked: impl Fn(&RingState<T>) -> bool,
    ) -> Result<MutexGuard<'a, RingState<T>>> {
        while blocked(&state) {
            if interruption.map(|i| i.consume()).unwrap_or(false) {
                return Err(StreamError::Interrupted);
            }
            state = condvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        Ok(state)
    }

    fn check_token(&self, interruption: Option<&Interruption>, side: WaitSide) -> Result<()> {
        match interruption {
            Some(token) if token.buffer_id() != self.shared.id || token.side() != side => {
                Err(StreamError::InvalidState(format!(
                    "interruption token for {:?} side of buffer {} used on {:?} side of buffer {}",
                    token.side(),
                    token.buffer_id(),
                    side,
                    self.shared.id
                )))
            }
            _ => Ok(()),
        }
    }
}

impl<T: Clone + Send + 'static> RingBuffer<T> {
    /// Append a copy of `value`, blocking while the buffer is full.
    pub fn write(&self, value: T, interruption: Option<&Interruption>) -> Result<()> {
        let slot = self.write_position(interruption)?;
        slot.set(value);
        slot.commit()
    }

    /// Non-blocking pop of the head element
    pub fn try_read_clone(&self) -> Option<T> {
        let value = {
            let mut state = self.shared.lock();
            if state.empty {
                return None;
            }
            state.read_epoch = Some(state.epoch);
            let slot = state.slots[state.read].clone();
            let value = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
            value
        };
        self.advance_read_position();
        Some(value)
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RingBuffer")
            .field("id", &self.shared.id)
            .field("capacity", &state.capacity())
            .field("queued", &state.queue_size())
            .field("full", &state.full)
            .field("empty", &state.empty)
            .finish()
    }
}

/// An open write reservation.
///
/// Dropping it without committing abandons the reservation; the slot content
/// is left as filled but never becomes readable.
pub struct WriteSlot<'a, T: Send + 'static> {
    buffer: &'a RingBuffer<T>,
    slot: Slot<T>,
    ticket: u64,
    committed: bool,
}

impl<'a, T: Send + 'static> WriteSlot<'a, T> {
    /// Overwrite the reserved slot
    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }

    /// Fill the reserved slot in place
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Make the slot visible to the reader
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.buffer.advance_write_position()
    }
}

impl<'a, T: Send + 'static> Drop for WriteSlot<'a, T> {
    fn drop(&mut self) {
        if !self.committed {
            self.buffer.cancel_reservation(self.ticket);
        }
    }
}

/// The head element returned by [`RingBuffer::read`]
pub struct ReadSlot<T> {
    slot: Slot<T>,
}

impl<T> ReadSlot<T> {
    /// Inspect the element in place
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

impl<T: Clone> ReadSlot<T> {
    pub fn cloned(&self) -> T {
        self.with(T::clone)
    }
}

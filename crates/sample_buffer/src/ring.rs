//! Lock-free SPSC frame ring.
//!
//! Every slot value lives in an atomic cell (`f32`/`f64` stored as bits), so
//! the writer may overwrite a slot the reader is copying without undefined
//! behavior. Tearing is detected with a claim/commit sequence pair:
//!
//! - writer: `claim_seq = end` → release fence → slot stores → `write_seq = end` (release)
//! - reader: `write_seq` (acquire) → slot loads → acquire fence → `claim_seq`;
//!   frames older than `claim_seq - capacity` may have been overwritten
//!   during the copy and are discarded.
//!
//! Sequence numbers only grow; `clear` moves the read cursor to the write
//! cursor. The reader commits its cursor with a CAS so a concurrent `clear`
//! wins.

use std::fmt;
use std::sync::atomic::{fence, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use contracts::DropPolicy;
use tracing::warn;

use crate::error::{BufferError, Result};
use crate::frame::FrameBlock;

/// Shared ring storage. Accessed through [`BufferWriter`] and [`BufferReader`].
pub struct SampleBuffer {
    channels: usize,
    capacity: usize,
    policy: DropPolicy,
    /// Channel-major, stride `capacity`, `f32` bits
    samples: Box<[AtomicU32]>,
    sample_numbers: Box<[AtomicI64]>,
    /// `f64` bits
    timestamps: Box<[AtomicU64]>,
    event_codes: Box<[AtomicU64]>,
    write_seq: AtomicU64,
    claim_seq: AtomicU64,
    read_seq: AtomicU64,
    overwritten: AtomicU64,
    refused: AtomicU64,
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channels)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("available", &self.available())
            .finish()
    }
}

/// Point-in-time buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Capacity in frames
    pub capacity: usize,
    /// Unread frames
    pub available: usize,
    /// Frames accepted since construction
    pub frames_written: u64,
    /// Unread frames overwritten under `DropOldest`
    pub frames_overwritten: u64,
    /// Frames refused under `DropNewest`
    pub frames_refused: u64,
}

impl SampleBuffer {
    /// Create a ring of `capacity` frames over `channels` channels.
    ///
    /// Returns the single writer and single reader handle.
    ///
    /// # Errors
    /// Zero channels or zero capacity.
    pub fn new(
        channels: usize,
        capacity: usize,
        policy: DropPolicy,
    ) -> Result<(BufferWriter, BufferReader)> {
        if channels == 0 || capacity == 0 {
            return Err(BufferError::ZeroSized { channels, capacity });
        }

        let shared = Arc::new(Self {
            channels,
            capacity,
            policy,
            samples: atomic_slice(channels * capacity, || AtomicU32::new(0)),
            sample_numbers: atomic_slice(capacity, || AtomicI64::new(0)),
            timestamps: atomic_slice(capacity, || AtomicU64::new(0)),
            event_codes: atomic_slice(capacity, || AtomicU64::new(0)),
            write_seq: AtomicU64::new(0),
            claim_seq: AtomicU64::new(0),
            read_seq: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        });

        Ok((
            BufferWriter {
                shared: shared.clone(),
            },
            BufferReader { shared },
        ))
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Unread frames (may be stale by the time it returns)
    pub fn available(&self) -> usize {
        let w = self.write_seq.load(Ordering::Acquire);
        let r = self.read_seq.load(Ordering::Acquire);
        (w.saturating_sub(r) as usize).min(self.capacity)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.capacity,
            available: self.available(),
            frames_written: self.write_seq.load(Ordering::Relaxed),
            frames_overwritten: self.overwritten.load(Ordering::Relaxed),
            frames_refused: self.refused.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn slot(&self, seq: u64) -> usize {
        (seq % self.capacity as u64) as usize
    }

    fn write_frames(
        &self,
        samples: &[f32],
        stride: usize,
        sample_numbers: &[i64],
        timestamps: &[f64],
        event_codes: &[u64],
        count: usize,
    ) -> usize {
        if count == 0 {
            return 0;
        }

        let cap = self.capacity as u64;
        let w = self.write_seq.load(Ordering::Relaxed);
        let r = self.read_seq.load(Ordering::Acquire);
        let unread = w.saturating_sub(r).min(cap);

        let (first, stored) = match self.policy {
            DropPolicy::DropOldest => {
                // unread frames pushed out plus frames of this batch that never land
                let overflow = (unread + count as u64).saturating_sub(cap);
                if overflow > 0 {
                    self.overwritten.fetch_add(overflow, Ordering::Relaxed);
                }
                let skip = count.saturating_sub(self.capacity);
                (skip, count)
            }
            DropPolicy::DropNewest => {
                let free = (cap - unread) as usize;
                let accepted = count.min(free);
                if accepted < count {
                    self.refused
                        .fetch_add((count - accepted) as u64, Ordering::Relaxed);
                }
                (0, accepted)
            }
        };

        if stored == 0 {
            return 0;
        }

        let end = w + stored as u64;
        self.claim_seq.store(end, Ordering::Relaxed);
        fence(Ordering::Release);

        for channel in 0..self.channels {
            let src = &samples[channel * stride..channel * stride + stored];
            let base = channel * self.capacity;
            for (j, value) in src.iter().enumerate().skip(first) {
                let slot = self.slot(w + j as u64);
                self.samples[base + slot].store(value.to_bits(), Ordering::Relaxed);
            }
        }
        for j in first..stored {
            let slot = self.slot(w + j as u64);
            self.sample_numbers[slot].store(sample_numbers[j], Ordering::Relaxed);
            self.timestamps[slot].store(timestamps[j].to_bits(), Ordering::Relaxed);
            self.event_codes[slot].store(event_codes[j], Ordering::Relaxed);
        }

        self.write_seq.store(end, Ordering::Release);
        stored - first
    }
}

fn atomic_slice<T>(len: usize, init: impl Fn() -> T) -> Box<[T]> {
    (0..len).map(|_| init()).collect()
}

/// Producer side, owned by the acquisition thread
#[derive(Debug)]
pub struct BufferWriter {
    shared: Arc<SampleBuffer>,
}

impl BufferWriter {
    /// Empty the buffer.
    ///
    /// Only called while no acquisition is in flight.
    pub fn clear(&mut self) {
        let w = self.shared.write_seq.load(Ordering::Acquire);
        self.shared.claim_seq.store(w, Ordering::Relaxed);
        self.shared.read_seq.store(w, Ordering::Release);
    }

    /// Append `count` frames.
    ///
    /// `samples` is channel-major with stride `count`. Returns the number of
    /// frames stored, which is below `count` only when frames were refused
    /// (`DropNewest`) or `count` exceeds the capacity (`DropOldest` keeps the
    /// most recent `capacity` frames).
    pub fn add_to_buffer(
        &mut self,
        samples: &[f32],
        sample_numbers: &[i64],
        timestamps: &[f64],
        event_codes: &[u64],
        count: usize,
    ) -> Result<usize> {
        BufferError::check_len("samples", self.shared.channels * count, samples.len())?;
        BufferError::check_len("sample_numbers", count, sample_numbers.len())?;
        BufferError::check_len("timestamps", count, timestamps.len())?;
        BufferError::check_len("event_codes", count, event_codes.len())?;

        Ok(self.shared.write_frames(
            samples,
            count,
            sample_numbers,
            timestamps,
            event_codes,
            count,
        ))
    }

    /// Append every frame of a decoded block
    pub fn add_block(&mut self, block: &FrameBlock) -> Result<usize> {
        if block.channels() != self.shared.channels {
            return Err(BufferError::ChannelMismatch {
                expected: self.shared.channels,
                actual: block.channels(),
            });
        }

        Ok(self.shared.write_frames(
            block.raw_samples(),
            block.stride(),
            block.sample_numbers(),
            block.timestamps(),
            block.event_codes(),
            block.len(),
        ))
    }

    #[inline]
    pub fn buffer(&self) -> &SampleBuffer {
        &self.shared
    }
}

/// Consumer side, owned by the downstream graph
#[derive(Debug)]
pub struct BufferReader {
    shared: Arc<SampleBuffer>,
}

impl BufferReader {
    /// Drain up to `max_frames` frames (bounded by the block's capacity) into
    /// `out`, oldest first. Never blocks; returns the number of frames copied.
    pub fn read_all_from_buffer(&mut self, out: &mut FrameBlock, max_frames: usize) -> usize {
        out.clear();
        let ring = &*self.shared;

        if out.channels() != ring.channels {
            warn!(
                expected = ring.channels,
                actual = out.channels(),
                "frame block channel count does not match sample buffer"
            );
            return 0;
        }

        let cap = ring.capacity as u64;
        let r0 = ring.read_seq.load(Ordering::Acquire);
        let w = ring.write_seq.load(Ordering::Acquire);
        let r = r0.max(w.saturating_sub(cap));
        let n = (w.saturating_sub(r) as usize)
            .min(max_frames)
            .min(out.capacity());
        if n == 0 {
            return 0;
        }

        for channel in 0..ring.channels {
            let base = channel * ring.capacity;
            for i in 0..n {
                let slot = ring.slot(r + i as u64);
                let bits = ring.samples[base + slot].load(Ordering::Relaxed);
                out.set_sample(channel, i, f32::from_bits(bits));
            }
        }
        for i in 0..n {
            let slot = ring.slot(r + i as u64);
            out.set_frame(
                i,
                ring.sample_numbers[slot].load(Ordering::Relaxed),
                f64::from_bits(ring.timestamps[slot].load(Ordering::Relaxed)),
                ring.event_codes[slot].load(Ordering::Relaxed),
            );
        }
        out.set_len(n);

        fence(Ordering::Acquire);
        let oldest_valid = ring.claim_seq.load(Ordering::Relaxed).saturating_sub(cap);
        if r < oldest_valid {
            out.discard_front((oldest_valid - r) as usize);
        }

        let next = r + n as u64;
        if ring
            .read_seq
            .compare_exchange(r0, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // cleared while copying
            out.clear();
            return 0;
        }

        out.len()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.shared.available()
    }

    #[inline]
    pub fn buffer(&self) -> &SampleBuffer {
        &self.shared
    }
}

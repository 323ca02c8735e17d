//! Consumer side of the sample buffers.
//!
//! Each [`StreamDrain`] owns the readers of one stream and pulls every
//! available frame on each call. Sample-number continuity is checked across
//! calls: a gap means the producer overwrote frames the consumer never saw.

use acquisition::StreamReaders;
use contracts::StreamId;
use sample_buffer::{BufferReader, FrameBlock};

/// Frames pulled by one [`StreamDrain::drain`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainCounts {
    pub ap: usize,
    pub lfp: usize,
}

struct Band {
    reader: BufferReader,
    block: FrameBlock,
    frames: u64,
    last_sample_number: Option<i64>,
    gaps: u64,
}

impl Band {
    fn new(reader: BufferReader, block_frames: usize) -> Self {
        let block = FrameBlock::new(reader.buffer().channel_count(), block_frames.max(1));
        Self {
            reader,
            block,
            frames: 0,
            last_sample_number: None,
            gaps: 0,
        }
    }

    fn drain(&mut self) -> usize {
        let mut total = 0;
        loop {
            let capacity = self.block.capacity();
            let read = self.reader.read_all_from_buffer(&mut self.block, capacity);
            if read == 0 {
                break;
            }
            let numbers = self.block.sample_numbers();
            if let Some(last) = self.last_sample_number {
                if numbers[0] != last + 1 {
                    self.gaps += 1;
                }
            }
            self.last_sample_number = numbers.last().copied();
            total += read;
            if read < capacity {
                break;
            }
        }
        self.frames += total as u64;
        total
    }

    /// A new run restarts sample numbers at zero
    fn reset_continuity(&mut self) {
        self.last_sample_number = None;
    }
}

/// Owns and drains the buffers of one stream
pub struct StreamDrain {
    stream: StreamId,
    label: String,
    ap: Band,
    lfp: Option<Band>,
}

impl StreamDrain {
    pub fn new(readers: StreamReaders, block_frames: usize) -> Self {
        Self {
            stream: readers.stream,
            label: readers.stream.to_string(),
            ap: Band::new(readers.ap, block_frames),
            lfp: readers.lfp.map(|r| Band::new(r, block_frames)),
        }
    }

    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Pull everything currently buffered
    pub fn drain(&mut self) -> DrainCounts {
        DrainCounts {
            ap: self.ap.drain(),
            lfp: self.lfp.as_mut().map_or(0, Band::drain),
        }
    }

    pub fn reset_continuity(&mut self) {
        self.ap.reset_continuity();
        if let Some(lfp) = self.lfp.as_mut() {
            lfp.reset_continuity();
        }
    }

    pub fn ap_frames(&self) -> u64 {
        self.ap.frames
    }

    pub fn lfp_frames(&self) -> u64 {
        self.lfp.as_ref().map_or(0, |b| b.frames)
    }

    /// Sample-number discontinuities seen by the consumer
    pub fn sample_gaps(&self) -> u64 {
        self.ap.gaps + self.lfp.as_ref().map_or(0, |b| b.gaps)
    }
}

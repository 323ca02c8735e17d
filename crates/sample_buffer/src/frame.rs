//! Decoded frame blocks
//!
//! Channel-major storage: channel `c` occupies
//! `samples[c * capacity .. c * capacity + len]`.

/// A block of decoded frames with per-frame metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBlock {
    channels: usize,
    capacity: usize,
    len: usize,
    samples: Vec<f32>,
    sample_numbers: Vec<i64>,
    timestamps: Vec<f64>,
    event_codes: Vec<u64>,
}

impl FrameBlock {
    /// Allocate a block of `capacity` frames over `channels` channels
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            channels,
            capacity,
            len: 0,
            samples: vec![0.0; channels * capacity],
            sample_numbers: vec![0; capacity],
            timestamps: vec![0.0; capacity],
            event_codes: vec![0; capacity],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum frames the block can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently held
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distance between consecutive channels in [`FrameBlock::raw_samples`]
    #[inline]
    pub fn stride(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Set the number of valid frames.
    ///
    /// # Panics
    /// Panics when `len` exceeds the capacity.
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity, "frame block overflow: {len} > {}", self.capacity);
        self.len = len;
    }

    /// Samples of one channel, `len()` values
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.capacity;
        &self.samples[start..start + self.len]
    }

    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channel(channel)[frame]
    }

    #[inline]
    pub fn set_sample(&mut self, channel: usize, frame: usize, value: f32) {
        self.samples[channel * self.capacity + frame] = value;
    }

    /// Set the metadata of one frame
    #[inline]
    pub fn set_frame(&mut self, frame: usize, sample_number: i64, timestamp: f64, event_code: u64) {
        self.sample_numbers[frame] = sample_number;
        self.timestamps[frame] = timestamp;
        self.event_codes[frame] = event_code;
    }

    #[inline]
    pub fn sample_numbers(&self) -> &[i64] {
        &self.sample_numbers[..self.len]
    }

    #[inline]
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps[..self.len]
    }

    #[inline]
    pub fn event_codes(&self) -> &[u64] {
        &self.event_codes[..self.len]
    }

    /// Whole channel-major storage with stride [`FrameBlock::stride`]
    #[inline]
    pub fn raw_samples(&self) -> &[f32] {
        &self.samples
    }

    /// Drop the first `count` frames, shifting the rest to the front
    pub fn discard_front(&mut self, count: usize) {
        let count = count.min(self.len);
        if count == 0 {
            return;
        }
        let remaining = self.len - count;
        for channel in 0..self.channels {
            let start = channel * self.capacity;
            self.samples
                .copy_within(start + count..start + self.len, start);
        }
        self.sample_numbers.copy_within(count..self.len, 0);
        self.timestamps.copy_within(count..self.len, 0);
        self.event_codes.copy_within(count..self.len, 0);
        self.len = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(frames: usize) -> FrameBlock {
        let mut block = FrameBlock::new(2, 8);
        for f in 0..frames {
            block.set_sample(0, f, f as f32);
            block.set_sample(1, f, 100.0 + f as f32);
            block.set_frame(f, f as i64, 0.5, f as u64 % 2);
        }
        block.set_len(frames);
        block
    }

    #[test]
    fn test_channel_views() {
        let block = filled(3);
        assert_eq!(block.channel(0), &[0.0, 1.0, 2.0]);
        assert_eq!(block.channel(1), &[100.0, 101.0, 102.0]);
        assert_eq!(block.sample_numbers(), &[0, 1, 2]);
        assert_eq!(block.event_codes(), &[0, 1, 0]);
    }

    #[test]
    fn test_discard_front() {
        let mut block = filled(5);
        block.discard_front(2);
        assert_eq!(block.len(), 3);
        assert_eq!(block.channel(1), &[102.0, 103.0, 104.0]);
        assert_eq!(block.sample_numbers(), &[2, 3, 4]);

        block.discard_front(10);
        assert!(block.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_set_len_beyond_capacity() {
        FrameBlock::new(1, 4).set_len(5);
    }
}

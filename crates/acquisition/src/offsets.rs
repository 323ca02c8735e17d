//! Per-channel DC offset table
//!
//! One baseline per channel is captured from the first non-empty batch of
//! a run and subtracted from every later sample of that run. The table keeps
//! `depth` history slots per channel; only slot 0 is read or written.

use sample_buffer::FrameBlock;

/// Default history slots per channel
pub const OFFSET_HISTORY_DEPTH: usize = 2;

#[derive(Debug, Clone)]
pub struct OffsetTable {
    channels: usize,
    depth: usize,
    values: Vec<f32>,
    captured: bool,
}

impl OffsetTable {
    /// Zeroed table of `channels × depth` values
    pub fn new(channels: usize, depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            channels,
            depth,
            values: vec![0.0; channels * depth],
            captured: false,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Zero every value and forget the capture
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.captured = false;
    }

    /// Baseline of `channel`, 0 before capture
    #[inline]
    pub fn offset(&self, channel: usize) -> f32 {
        self.values[channel * self.depth]
    }

    /// Store the per-channel mean of `block` into slot 0.
    ///
    /// Channels of `block` beyond the table (sync pseudo-channel) are ignored.
    /// Returns `false` and leaves the table untouched for an empty block or
    /// an already captured table.
    pub fn capture(&mut self, block: &FrameBlock) -> bool {
        if self.captured || block.is_empty() {
            return false;
        }
        let frames = block.len() as f64;
        for channel in 0..self.channels.min(block.channels()) {
            let sum: f64 = block.channel(channel).iter().map(|&v| v as f64).sum();
            self.values[channel * self.depth] = (sum / frames) as f32;
        }
        self.captured = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(values: &[[f32; 3]]) -> FrameBlock {
        let mut block = FrameBlock::new(values.len(), 3);
        for (c, row) in values.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                block.set_sample(c, f, *v);
            }
        }
        block.set_len(3);
        block
    }

    #[test]
    fn test_capture_mean() {
        let mut table = OffsetTable::new(2, OFFSET_HISTORY_DEPTH);
        assert_eq!(table.offset(1), 0.0);

        assert!(table.capture(&block(&[[1.0, 2.0, 3.0], [10.0, 10.0, 40.0]])));
        assert!(table.is_captured());
        assert_eq!(table.offset(0), 2.0);
        assert_eq!(table.offset(1), 20.0);
    }

    #[test]
    fn test_capture_is_one_shot() {
        let mut table = OffsetTable::new(1, OFFSET_HISTORY_DEPTH);
        table.capture(&block(&[[6.0, 6.0, 6.0]]));
        assert!(!table.capture(&block(&[[100.0, 100.0, 100.0]])));
        assert_eq!(table.offset(0), 6.0);

        table.reset();
        assert!(!table.is_captured());
        assert_eq!(table.offset(0), 0.0);
    }

    #[test]
    fn test_empty_block_does_not_capture() {
        let mut table = OffsetTable::new(1, OFFSET_HISTORY_DEPTH);
        assert!(!table.capture(&FrameBlock::new(1, 4)));
        assert!(!table.is_captured());
    }

    #[test]
    fn test_extra_block_channels_ignored() {
        let mut table = OffsetTable::new(1, OFFSET_HISTORY_DEPTH);
        table.capture(&block(&[[3.0, 3.0, 3.0], [1e9, 1e9, 1e9]]));
        assert_eq!(table.channels(), 1);
        assert_eq!(table.offset(0), 3.0);
    }
}

//! Packet batch decoding
//!
//! Converts raw vendor packets into channel-major microvolt frame blocks,
//! assigns monotonic sample numbers, extracts event codes from the status
//! word and feeds the timestamp continuity monitor.

use contracts::{PacketBatch, ProbeCapabilities};
use sample_buffer::FrameBlock;

use crate::config::WorkerConfig;
use crate::continuity::{TimestampJump, TimestampMonitor};
use crate::offsets::{OffsetTable, OFFSET_HISTORY_DEPTH};

/// Status word bits below this carry no event information
const EVENT_CODE_SHIFT: u32 = 6;

/// Conversion parameters fixed for one acquisition run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    /// AP band gain (×)
    pub ap_gain: f32,
    /// LFP band gain (×), `None` without an LFP band
    pub lfp_gain: Option<f32>,
    /// The sync line is wired with inverted polarity
    pub invert_sync_line: bool,
}

/// Decoder state of one stream, owned by its worker thread
#[derive(Debug)]
pub struct StreamDecoder {
    capabilities: ProbeCapabilities,
    sync_as_channel: bool,
    invert_sync_line: bool,
    ap_scale: f32,
    lfp_scale: f32,
    ap_offsets: OffsetTable,
    lfp_offsets: OffsetTable,
    monitor: TimestampMonitor,
    ap_sample_number: i64,
    lfp_sample_number: i64,
    ap_block: FrameBlock,
    lfp_block: Option<FrameBlock>,
}

impl StreamDecoder {
    pub fn new(config: &WorkerConfig) -> Self {
        let caps = config.capabilities;
        Self {
            capabilities: caps,
            sync_as_channel: config.sync_as_channel,
            invert_sync_line: false,
            ap_scale: 0.0,
            lfp_scale: 0.0,
            ap_offsets: OffsetTable::new(caps.channel_count, OFFSET_HISTORY_DEPTH),
            lfp_offsets: OffsetTable::new(caps.channel_count, OFFSET_HISTORY_DEPTH),
            monitor: TimestampMonitor::new(config.timing),
            ap_sample_number: 0,
            lfp_sample_number: 0,
            ap_block: FrameBlock::new(config.ap_channels(), config.ap_frames_per_read()),
            lfp_block: config
                .lfp_channels()
                .map(|channels| FrameBlock::new(channels, caps.max_packets)),
        }
    }

    /// Reset counters, offsets and continuity state for a new run
    pub fn begin_run(&mut self, params: RunParams) {
        let caps = &self.capabilities;
        self.ap_scale = caps.microvolts_per_code(params.ap_gain) as f32;
        self.lfp_scale = params
            .lfp_gain
            .map(|gain| caps.microvolts_per_code(gain) as f32)
            .unwrap_or(0.0);
        self.invert_sync_line = params.invert_sync_line;

        self.ap_offsets.reset();
        self.lfp_offsets.reset();
        self.monitor.reset();
        self.ap_sample_number = 0;
        self.lfp_sample_number = 0;
        self.ap_block.clear();
        if let Some(block) = self.lfp_block.as_mut() {
            block.clear();
        }
    }

    /// Decode `batch` into the AP (and LFP) blocks.
    ///
    /// `timestamp` is the host receive time of the batch. Reportable timestamp
    /// jumps are appended to `jumps`. Returns the number of AP frames decoded.
    pub fn decode(
        &mut self,
        batch: &PacketBatch,
        timestamp: f64,
        jumps: &mut Vec<TimestampJump>,
    ) -> usize {
        let channels = self.capabilities.channel_count;
        let sync_channel = self.sync_as_channel.then_some(channels);

        self.ap_block.clear();
        if let Some(block) = self.lfp_block.as_mut() {
            block.clear();
        }

        let mut ap_frame = 0usize;
        for (packet_index, packet) in batch.packets().enumerate() {
            if ap_frame + packet.sub_samples() > self.ap_block.capacity() {
                break;
            }

            let mut event_code = 0u64;
            for sub_sample in 0..packet.sub_samples() {
                event_code = (packet.status(sub_sample) >> EVENT_CODE_SHIFT) as u64;
                if self.invert_sync_line {
                    event_code = !event_code;
                }

                if let Some(jump) = self
                    .monitor
                    .observe(packet.timestamp(sub_sample), self.ap_sample_number)
                {
                    jumps.push(jump);
                }

                for (channel, &raw) in packet.ap(sub_sample).iter().enumerate() {
                    let value = raw as f32 * self.ap_scale - self.ap_offsets.offset(channel);
                    self.ap_block.set_sample(channel, ap_frame, value);
                }
                if let Some(sync) = sync_channel {
                    self.ap_block.set_sample(sync, ap_frame, event_code as f32);
                }
                self.ap_block
                    .set_frame(ap_frame, self.ap_sample_number, timestamp, event_code);

                self.ap_sample_number += 1;
                ap_frame += 1;
            }

            if let Some(lfp) = self.lfp_block.as_mut() {
                for (channel, &raw) in packet.lfp().iter().enumerate() {
                    let value = raw as f32 * self.lfp_scale - self.lfp_offsets.offset(channel);
                    lfp.set_sample(channel, packet_index, value);
                }
                lfp.set_frame(packet_index, self.lfp_sample_number, timestamp, event_code);
                lfp.set_len(packet_index + 1);
                self.lfp_sample_number += 1;
            }
        }

        self.ap_block.set_len(ap_frame);
        ap_frame
    }

    /// Capture DC offsets from the current blocks once per run.
    ///
    /// No-op for generations without offset correction. Returns `true` when
    /// the capture happened on this call.
    pub fn capture_offsets_if_needed(&mut self) -> bool {
        if !self.capabilities.dc_offset_correction || self.ap_offsets.is_captured() {
            return false;
        }
        let captured = self.ap_offsets.capture(&self.ap_block);
        if captured {
            if let Some(lfp) = self.lfp_block.as_ref() {
                self.lfp_offsets.capture(lfp);
            }
        }
        captured
    }

    /// Update the startup grace state (once per polling cycle)
    pub fn end_of_cycle(&mut self) {
        self.monitor.end_of_cycle(self.ap_sample_number);
    }

    /// Last decoded AP frames
    #[inline]
    pub fn ap_block(&self) -> &FrameBlock {
        &self.ap_block
    }

    /// Last decoded LFP frames
    #[inline]
    pub fn lfp_block(&self) -> Option<&FrameBlock> {
        self.lfp_block.as_ref()
    }

    /// Sample number of the next AP frame
    #[inline]
    pub fn ap_sample_number(&self) -> i64 {
        self.ap_sample_number
    }

    #[inline]
    pub fn offsets_captured(&self) -> bool {
        self.ap_offsets.is_captured()
    }

    /// Captured AP baseline of `channel`
    pub fn ap_offset(&self, channel: usize) -> f32 {
        self.ap_offsets.offset(channel)
    }
}

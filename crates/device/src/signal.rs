//! Synthetic packet generation for one stream

use contracts::{PacketBatch, PacketLayout, StreamId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{SignalConfig, TimestampJumpInjection};

/// Produces vendor-shaped packets for one stream
#[derive(Debug)]
pub struct StreamGenerator {
    layout: PacketLayout,
    signal: SignalConfig,
    jumps: Vec<TimestampJumpInjection>,
    rng: StdRng,
    frames: u64,
    hw_timestamp: u32,
}

impl StreamGenerator {
    pub fn new(
        stream: StreamId,
        layout: PacketLayout,
        signal: SignalConfig,
        jumps: &[TimestampJumpInjection],
    ) -> Self {
        let jumps = jumps
            .iter()
            .filter(|j| j.stream.map_or(true, |s| s == stream))
            .copied()
            .collect();
        let seed = signal.seed ^ ((stream.slot() as u64) << 16 | (stream.port() as u64) << 8)
            ^ stream.source_index() as u64;

        Self {
            layout,
            signal,
            jumps,
            rng: StdRng::seed_from_u64(seed),
            frames: 0,
            hw_timestamp: 0,
        }
    }

    /// Restart the stream from frame 0 (software trigger)
    pub fn reset(&mut self) {
        self.frames = 0;
        self.hw_timestamp = 0;
    }

    /// AP frames produced or lost since the last reset
    #[inline]
    pub fn frames_produced(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// Drop `packets` packets without delivering them (FIFO overflow)
    pub fn skip_packets(&mut self, packets: usize) {
        for _ in 0..packets * self.layout.samples_per_packet {
            self.next_timestamp();
        }
    }

    /// Append `packets` packets to `batch`, returns the number written
    pub fn fill(&mut self, batch: &mut PacketBatch, packets: usize) -> usize {
        let spp = self.layout.samples_per_packet;
        let mut written = 0;

        while written < packets {
            let frame_base = self.frames;
            let timestamps: Vec<u32> = (0..spp).map(|_| self.next_timestamp()).collect();
            let Some(mut packet) = batch.push_packet() else {
                break;
            };

            for (s, ts) in timestamps.into_iter().enumerate() {
                let frame = frame_base + s as u64;
                packet.timestamps[s] = ts;
                packet.status[s] = self.sync_level(frame) << 6;
                for (channel, code) in packet.ap_mut(s).iter_mut().enumerate() {
                    *code = self.signal.dc_offset
                        + (channel % 32) as i16
                        + noise(&mut self.rng, self.signal.noise);
                }
            }
            for (channel, code) in packet.lfp.iter_mut().enumerate() {
                *code = self.signal.dc_offset * 2 - (channel % 16) as i16
                    + noise(&mut self.rng, self.signal.noise);
            }
            written += 1;
        }
        written
    }

    fn sync_level(&self, frame: u64) -> u16 {
        if self.signal.sync_half_period == 0 {
            return 0;
        }
        ((frame / self.signal.sync_half_period) % 2) as u16
    }

    /// Nominal 100 kHz clock sampled at 30 kHz: increments of 3, 3, 4
    fn next_timestamp(&mut self) -> u32 {
        let mut step = if self.frames % 3 == 2 { 4 } else { 3 };
        for jump in &self.jumps {
            if jump.at_frame == self.frames {
                step += jump.extra_ticks;
            }
        }
        self.hw_timestamp = self.hw_timestamp.wrapping_add(step);
        self.frames += 1;
        self.hw_timestamp
    }
}

fn noise(rng: &mut StdRng, amplitude: i16) -> i16 {
    if amplitude <= 0 {
        0
    } else {
        rng.random_range(-amplitude..=amplitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ProbeAddress;

    fn layout() -> PacketLayout {
        PacketLayout {
            samples_per_packet: 12,
            channel_count: 8,
            has_lfp: true,
        }
    }

    fn quiet_signal() -> SignalConfig {
        SignalConfig {
            noise: 0,
            sync_half_period: 6,
            ..Default::default()
        }
    }

    #[test]
    fn test_nominal_timestamp_increments() {
        let stream = ProbeAddress::new(2, 1, 1).stream();
        let mut generator = StreamGenerator::new(stream, layout(), quiet_signal(), &[]);
        let mut batch = PacketBatch::new(layout(), 4).unwrap();

        assert_eq!(generator.fill(&mut batch, 4), 4);
        let mut last = 0u32;
        for packet in batch.packets() {
            for s in 0..packet.sub_samples() {
                let step = packet.timestamp(s).wrapping_sub(last);
                assert!(step == 3 || step == 4, "step {step}");
                last = packet.timestamp(s);
            }
        }
        assert_eq!(generator.frames_produced(), 48);
    }

    #[test]
    fn test_injected_jump() {
        let stream = ProbeAddress::new(2, 1, 1).stream();
        let jumps = [TimestampJumpInjection {
            stream: Some(stream),
            at_frame: 13,
            extra_ticks: 50,
        }];
        let mut generator = StreamGenerator::new(stream, layout(), quiet_signal(), &jumps);
        let mut batch = PacketBatch::new(layout(), 2).unwrap();
        generator.fill(&mut batch, 2);

        let second = batch.packet(1);
        let step = second.timestamp(1).wrapping_sub(second.timestamp(0));
        assert!(step > 50, "step {step}");
    }

    #[test]
    fn test_jump_for_other_stream_ignored() {
        let stream = ProbeAddress::new(2, 1, 1).stream();
        let jumps = [TimestampJumpInjection {
            stream: Some(ProbeAddress::new(2, 2, 1).stream()),
            at_frame: 1,
            extra_ticks: 50,
        }];
        let mut generator = StreamGenerator::new(stream, layout(), quiet_signal(), &jumps);
        let mut batch = PacketBatch::new(layout(), 1).unwrap();
        generator.fill(&mut batch, 1);
        assert!(batch.packet(0).timestamp(11) <= 12 * 4);
    }

    #[test]
    fn test_sync_line_toggles() {
        let stream = ProbeAddress::new(2, 1, 1).stream();
        let mut generator = StreamGenerator::new(stream, layout(), quiet_signal(), &[]);
        let mut batch = PacketBatch::new(layout(), 1).unwrap();
        generator.fill(&mut batch, 1);

        let packet = batch.packet(0);
        assert_eq!(packet.status(0) >> 6, 0);
        assert_eq!(packet.status(6) >> 6, 1);
        assert_eq!(packet.ap(0)[3], 12 + 3);
    }
}

//! Packet batches exchanged with the device adapter
//!
//! A [`PacketBatch`] is allocated once per stream and refilled by every
//! `read_electrode_data` call. Storage is packet-major:
//!
//! - `timestamps` / `status`: one entry per sub-sample
//! - `ap`: `channel_count` raw codes per sub-sample
//! - `lfp`: `channel_count` raw codes per packet (LFP probes only)

use crate::error::ContractError;

/// Shape of one vendor packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    /// AP sub-samples per packet
    pub samples_per_packet: usize,
    /// Channels per sub-sample
    pub channel_count: usize,
    /// One LFP sample set per packet
    pub has_lfp: bool,
}

/// Hardware FIFO occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FifoState {
    /// Packets ready to be read
    pub packets_available: usize,
    /// Free packet slots left before the FIFO overflows
    pub headroom: usize,
}

impl FifoState {
    /// `available / (available + headroom)`, 0 when the FIFO reports no size
    pub fn fill_fraction(&self) -> f32 {
        let total = self.packets_available + self.headroom;
        if total == 0 {
            0.0
        } else {
            self.packets_available as f32 / total as f32
        }
    }
}

/// Reusable buffer for one read of up to `capacity` packets
#[derive(Debug, Clone)]
pub struct PacketBatch {
    layout: PacketLayout,
    capacity: usize,
    len: usize,
    timestamps: Vec<u32>,
    status: Vec<u16>,
    ap: Vec<i16>,
    lfp: Vec<i16>,
}

impl PacketBatch {
    /// Allocate storage for `capacity` packets of the given layout
    ///
    /// # Errors
    /// Zero-sized layouts or capacities are rejected.
    pub fn new(layout: PacketLayout, capacity: usize) -> Result<Self, ContractError> {
        if capacity == 0 || layout.samples_per_packet == 0 || layout.channel_count == 0 {
            return Err(ContractError::Other(format!(
                "packet batch needs non-zero sizes, got capacity={capacity} layout={layout:?}"
            )));
        }

        let samples = capacity * layout.samples_per_packet;
        let lfp_len = if layout.has_lfp {
            capacity * layout.channel_count
        } else {
            0
        };

        Ok(Self {
            layout,
            capacity,
            len: 0,
            timestamps: vec![0; samples],
            status: vec![0; samples],
            ap: vec![0; samples * layout.channel_count],
            lfp: vec![0; lfp_len],
        })
    }

    #[inline]
    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// Maximum packets per read
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets currently held
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// AP frames held (packets × sub-samples)
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.len * self.layout.samples_per_packet
    }

    /// Forget all packets, keeping the allocation
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append one packet and return writable slices for it.
    ///
    /// Returns `None` when the batch is full. The slices hold stale data from
    /// earlier reads; writers overwrite every element.
    pub fn push_packet(&mut self) -> Option<PacketWriter<'_>> {
        if self.len == self.capacity {
            return None;
        }
        let index = self.len;
        self.len += 1;

        let spp = self.layout.samples_per_packet;
        let channels = self.layout.channel_count;
        let samples = index * spp..(index + 1) * spp;
        let ap = samples.start * channels..samples.end * channels;
        let lfp = if self.layout.has_lfp {
            index * channels..(index + 1) * channels
        } else {
            0..0
        };

        Some(PacketWriter {
            channel_count: channels,
            timestamps: &mut self.timestamps[samples.clone()],
            status: &mut self.status[samples],
            ap: &mut self.ap[ap],
            lfp: &mut self.lfp[lfp],
        })
    }

    /// View of packet `index`
    ///
    /// # Panics
    /// Panics when `index >= len()`.
    pub fn packet(&self, index: usize) -> PacketView<'_> {
        assert!(index < self.len, "packet {index} out of range ({})", self.len);

        let spp = self.layout.samples_per_packet;
        let channels = self.layout.channel_count;
        let samples = index * spp..(index + 1) * spp;
        let ap = samples.start * channels..samples.end * channels;
        let lfp = if self.layout.has_lfp {
            &self.lfp[index * channels..(index + 1) * channels]
        } else {
            &[][..]
        };

        PacketView {
            channel_count: channels,
            timestamps: &self.timestamps[samples.clone()],
            status: &self.status[samples],
            ap: &self.ap[ap],
            lfp,
        }
    }

    /// Iterate over held packets in arrival order
    pub fn packets(&self) -> impl Iterator<Item = PacketView<'_>> + '_ {
        (0..self.len).map(move |i| self.packet(i))
    }
}

/// Read-only view of one packet
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    channel_count: usize,
    timestamps: &'a [u32],
    status: &'a [u16],
    ap: &'a [i16],
    lfp: &'a [i16],
}

impl<'a> PacketView<'a> {
    #[inline]
    pub fn sub_samples(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn timestamp(&self, sub_sample: usize) -> u32 {
        self.timestamps[sub_sample]
    }

    #[inline]
    pub fn status(&self, sub_sample: usize) -> u16 {
        self.status[sub_sample]
    }

    /// Raw AP codes of one sub-sample, one per channel
    #[inline]
    pub fn ap(&self, sub_sample: usize) -> &'a [i16] {
        let start = sub_sample * self.channel_count;
        &self.ap[start..start + self.channel_count]
    }

    /// Raw LFP codes of the packet, empty without an LFP band
    #[inline]
    pub fn lfp(&self) -> &'a [i16] {
        self.lfp
    }
}

/// Writable slices of one packet being filled by an adapter
#[derive(Debug)]
pub struct PacketWriter<'a> {
    channel_count: usize,
    pub timestamps: &'a mut [u32],
    pub status: &'a mut [u16],
    pub ap: &'a mut [i16],
    pub lfp: &'a mut [i16],
}

impl PacketWriter<'_> {
    /// Raw AP codes of one sub-sample
    #[inline]
    pub fn ap_mut(&mut self, sub_sample: usize) -> &mut [i16] {
        let start = sub_sample * self.channel_count;
        &mut self.ap[start..start + self.channel_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn np1_layout() -> PacketLayout {
        PacketLayout {
            samples_per_packet: 12,
            channel_count: 4,
            has_lfp: true,
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(PacketBatch::new(np1_layout(), 0).is_err());
    }

    #[test]
    fn test_push_until_full() {
        let mut batch = PacketBatch::new(np1_layout(), 2).unwrap();
        assert!(batch.push_packet().is_some());
        assert!(batch.push_packet().is_some());
        assert!(batch.push_packet().is_none());
        assert_eq!(batch.frame_count(), 24);

        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_written_values_visible_in_view() {
        let mut batch = PacketBatch::new(np1_layout(), 3).unwrap();
        for p in 0..3u32 {
            let mut packet = batch.push_packet().unwrap();
            for s in 0..12 {
                packet.timestamps[s] = p * 100 + s as u32;
                packet.status[s] = (s as u16) << 6;
                packet.ap_mut(s).fill(p as i16 * 10 + s as i16);
            }
            packet.lfp.fill(-(p as i16));
        }

        let view = batch.packet(2);
        assert_eq!(view.sub_samples(), 12);
        assert_eq!(view.timestamp(5), 205);
        assert_eq!(view.status(3) >> 6, 3);
        assert_eq!(view.ap(7), &[27, 27, 27, 27]);
        assert_eq!(view.lfp(), &[-2, -2, -2, -2]);
        assert_eq!(batch.packets().count(), 3);
    }

    #[test]
    fn test_fill_fraction() {
        let state = FifoState {
            packets_available: 30,
            headroom: 90,
        };
        assert!((state.fill_fraction() - 0.25).abs() < f32::EPSILON);
        assert_eq!(FifoState::default().fill_fraction(), 0.0);
    }
}

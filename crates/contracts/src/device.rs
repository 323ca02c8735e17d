//! DeviceAdapter trait - vendor hardware API abstraction
//!
//! The acquisition core never talks to the vendor library directly. Real
//! hardware bindings and the simulated basestation both implement this trait
//! and are injected as `Arc<dyn DeviceAdapter>`.

use std::path::Path;

use crate::error::NpResult;
use crate::packet::{FifoState, PacketBatch};
use crate::probe_id::{ProbeAddress, StreamId};
use crate::settings::{Bank, ReferenceSelection};

/// Vendor hardware API
///
/// Calls may block (they are synchronous vendor calls) but must be safe to
/// issue concurrently for different streams: every acquisition worker reads
/// its own stream from its own thread.
pub trait DeviceAdapter: Send + Sync {
    // ===== Probe lifecycle =====

    /// Open the probe at `probe`
    fn open_probe(&self, probe: ProbeAddress) -> NpResult<()>;

    /// Close the probe at `probe`
    fn close_probe(&self, probe: ProbeAddress) -> NpResult<()>;

    /// Reset the probe to its power-on configuration
    fn init(&self, probe: ProbeAddress) -> NpResult<()>;

    /// Hardware serial number, used to locate calibration files
    fn probe_serial_number(&self, probe: ProbeAddress) -> NpResult<u64>;

    // ===== Streaming =====

    /// Read up to `requested` packets of `stream` into `batch`.
    ///
    /// The adapter clears `batch` and fills it through
    /// [`PacketBatch::push_packet`]; the return value equals `batch.len()`.
    /// Returning `Ok(0)` means no data was ready.
    fn read_electrode_data(
        &self,
        stream: StreamId,
        batch: &mut PacketBatch,
        requested: usize,
    ) -> NpResult<usize>;

    /// Current occupancy of the stream's hardware FIFO
    fn electrode_fifo_state(&self, stream: StreamId) -> NpResult<FifoState>;

    // ===== Channel configuration (staged until write_probe_configuration) =====

    fn set_gain(
        &self,
        probe: ProbeAddress,
        channel: usize,
        ap_gain_index: usize,
        lfp_gain_index: usize,
    ) -> NpResult<()>;

    fn set_reference(
        &self,
        probe: ProbeAddress,
        channel: usize,
        shank: u8,
        reference: ReferenceSelection,
    ) -> NpResult<()>;

    /// `disable_highpass == true` bypasses the AP high-pass filter
    fn set_ap_corner_frequency(
        &self,
        probe: ProbeAddress,
        channel: usize,
        disable_highpass: bool,
    ) -> NpResult<()>;

    fn select_electrode(
        &self,
        probe: ProbeAddress,
        channel: usize,
        shank: u8,
        bank: Bank,
    ) -> NpResult<()>;

    /// Push staged channel configuration to the probe
    fn write_probe_configuration(&self, probe: ProbeAddress, read_check: bool) -> NpResult<()>;

    // ===== Calibration =====

    fn set_adc_calibration(&self, probe: ProbeAddress, file: &Path) -> NpResult<()>;

    fn set_gain_calibration(&self, probe: ProbeAddress, file: &Path) -> NpResult<()>;

    // ===== Basestation =====

    /// Prepare every probe on the slot to start on the next trigger
    fn arm(&self, slot: u8) -> NpResult<()>;

    /// Start all armed probes on the slot at once
    fn set_sw_trigger(&self, slot: u8) -> NpResult<()>;
}

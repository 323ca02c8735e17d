//! # Sample Buffer
//!
//! Fixed-capacity single-producer/single-consumer ring of decoded frames.
//!
//! The acquisition thread publishes whole batches with
//! [`BufferWriter::add_to_buffer`]; the downstream graph drains at its own
//! cadence with [`BufferReader::read_all_from_buffer`]. Neither side ever
//! blocks or takes a lock.
//!
//! ## Usage Example
//!
//! ```
//! use sample_buffer::{FrameBlock, SampleBuffer};
//! use contracts::DropPolicy;
//!
//! let (mut writer, mut reader) = SampleBuffer::new(2, 8, DropPolicy::DropOldest).unwrap();
//!
//! // two channels, three frames, channel-major
//! let samples = [1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
//! writer.add_to_buffer(&samples, &[0, 1, 2], &[0.0; 3], &[0; 3], 3).unwrap();
//!
//! let mut block = FrameBlock::new(2, 8);
//! assert_eq!(reader.read_all_from_buffer(&mut block, 8), 3);
//! assert_eq!(block.channel(1), &[10.0, 20.0, 30.0]);
//! ```

mod error;
mod frame;
mod ring;

pub use contracts::DropPolicy;
pub use error::{BufferError, Result};
pub use frame::FrameBlock;
pub use ring::{BufferReader, BufferStats, BufferWriter, SampleBuffer};

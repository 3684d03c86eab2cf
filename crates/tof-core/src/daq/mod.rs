//! DMA Ring Driver (C6) and DAQ Worker (C7): spec.md §4.6, §4.7.

mod dma_ring;
mod error;
mod frame_server;
mod shm;
mod worker;

pub use dma_ring::{DEFAULT_PARTITIONS, DmaDevice, DmaError, PARTITION_BYTES, MockDmaDevice, ReadOutcome};
pub use error::DaqError;
pub use frame_server::{DaqKind, FrameServer, NullFrameServer};
pub use shm::SharedMemoryRegion;
pub use worker::{DaqWorker, DaqWorkerConfig, mock_worker, request_stop, stop_requested};

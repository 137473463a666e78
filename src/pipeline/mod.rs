pub mod acquisition;
pub mod ringbuf;

pub use acquisition::{acquire, run_session, setup_stream, teardown, LoopSettings, RunSummary, StopPolicy};
pub use ringbuf::{BufferPool, FrameGuard};

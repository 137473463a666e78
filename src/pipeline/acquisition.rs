//! Stream setup, the fetch/process/release loop, and teardown.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::ringbuf::{BufferPool, FrameGuard};
use crate::capture::configure::TRIGGER_SOFTWARE;
use crate::capture::{self, ConfiguredCamera, Image};
use crate::display::FrameSink;
use crate::error::{Error, Result};
use crate::input::InputSource;
use crate::process::{convert, Processor};
use crate::sdk::{
    log_error_event, Camera, CameraSdk, FrameSource, StreamParams, StreamStatistics, TransportKind,
};
use crate::{utils, Config, Profile, StreamConfig};

/// When the acquisition loop ends. Checked before every fetch attempt.
#[derive(Debug, Clone, Default)]
pub struct StopPolicy {
    /// Maximum number of fetch attempts, empty polls included
    pub max_frames: Option<u64>,
    pub stop_on_key: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl StopPolicy {
    pub fn for_profile(profile: Profile, stream: &StreamConfig) -> Self {
        match profile {
            Profile::SingleShot => Self {
                max_frames: Some(1),
                stop_on_key: false,
                cancel: None,
            },
            _ => Self {
                max_frames: stream.max_frames,
                stop_on_key: stream.stop_on_key,
                cancel: None,
            },
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn should_stop<I: InputSource>(&self, attempts: u64, input: &mut I) -> Result<bool> {
        if self.max_frames.is_some_and(|max| attempts >= max) {
            debug!("stopping after {} fetch attempts", attempts);
            return Ok(true);
        }
        if self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
            info!("acquisition cancelled");
            return Ok(true);
        }
        if self.stop_on_key && input.key_pressed()? {
            info!("key pressed, stopping");
            return Ok(true);
        }
        Ok(false)
    }
}

/// Everything the loop needs besides the camera, pool and sinks
#[derive(Debug, Clone, Default)]
pub struct LoopSettings {
    pub stop: StopPolicy,
    pub timeout: Duration,
    /// Send `TriggerSoftware` before every fetch
    pub software_trigger: bool,
    /// Where frames with missing packets are written
    pub error_dump: Option<PathBuf>,
}

impl LoopSettings {
    pub fn new(config: &Config, configured: &ConfiguredCamera) -> Self {
        Self {
            stop: StopPolicy::for_profile(config.capture.profile, &config.stream),
            timeout: Duration::from_millis(config.stream.fetch_timeout_ms),
            software_trigger: configured.software_trigger,
            error_dump: config.stream.error_dump.clone(),
        }
    }
}

/// Outcome of one acquisition run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub attempts: u64,
    pub frames_processed: u64,
    /// Frames skipped because packets were missing
    pub frames_incomplete: u64,
    pub statistics: StreamStatistics,
}

/// Open a stream on `transport` and bind a pool of `capacity` slots to it.
#[instrument(skip(camera), fields(camera = %camera.info().label()))]
pub fn setup_stream<C: Camera>(
    camera: &mut C,
    transport: TransportKind,
    capacity: usize,
) -> Result<BufferPool<C::Stream>> {
    let stream = camera
        .open_stream(StreamParams {
            transport,
            buffer_count: capacity,
        })
        .map_err(Error::Stream)?;
    let pool = BufferPool::new(stream, capacity)?;
    info!("{} stream ready with {} buffers", transport, capacity);
    Ok(pool)
}

/// Start grabbing, loop until the stop policy fires, stop grabbing.
///
/// Frames are released as soon as every sink has seen them. A failing step
/// aborts the run; the frame in hand is still released on the way out.
/// Incomplete frames skip processing and are only dumped.
pub fn acquire<C, I>(
    camera: &mut C,
    pool: &BufferPool<C::Stream>,
    processor: &mut Processor,
    sinks: &mut [Box<dyn FrameSink>],
    input: &mut I,
    settings: &LoopSettings,
) -> Result<RunSummary>
where
    C: Camera,
    I: InputSource,
{
    camera.grab().map_err(|source| Error::Acquisition {
        action: "start grab",
        source,
    })?;
    info!("Acquisition started");

    let mut summary = RunSummary::default();
    loop {
        if settings.stop.should_stop(summary.attempts, input)? || sinks.iter_mut().any(|s| s.wants_stop()) {
            break;
        }
        summary.attempts += 1;

        if settings.software_trigger {
            if let Err(e) = camera.feature_command(TRIGGER_SOFTWARE) {
                warn!("software trigger failed: {}", e);
            }
        }

        if let Some(frame) = pool.try_fetch_next(settings.timeout)? {
            if frame.meta().missing_packets > 0 {
                dump_incomplete(&frame, settings.error_dump.as_deref());
                frame.release()?;
                summary.frames_incomplete += 1;
                metrics::counter!("frames_incomplete").increment(1);
            } else {
                let processed = processor.process(frame.meta(), &frame)?;
                for sink in sinks.iter_mut() {
                    sink.frame(frame.meta(), &processed)?;
                }
                frame.release()?;
                summary.frames_processed += 1;
                metrics::counter!("frames_processed").increment(1);
            }
        }

        let stats = pool.statistics();
        for sink in sinks.iter_mut() {
            sink.statistics(&stats)?;
        }
    }

    for sink in sinks.iter_mut() {
        sink.finish()?;
    }
    if let Some(hist) = processor.histogram() {
        for channel in 0..hist.channel_count() {
            let (bin, share) = hist.peak(channel);
            debug!("histogram channel {}: peak bin {} ({:.1}%)", channel, bin, share * 100.0);
        }
    }

    camera.freeze().map_err(|source| Error::Acquisition {
        action: "stop grab",
        source,
    })?;
    summary.statistics = pool.statistics();
    info!("Acquisition stopped: {}", summary.statistics);
    Ok(summary)
}

/// Write the raw frame for inspection. Failing to write is only logged; the
/// frame is damaged anyway.
fn dump_incomplete<S: FrameSource>(frame: &FrameGuard<'_, S>, path: Option<&Path>) {
    let meta = frame.meta();
    warn!(
        "frame {} is missing {} packets, not processed",
        meta.sequence, meta.missing_packets
    );
    let Some(path) = path else {
        return;
    };
    let written = Image::from_raw(meta.width, meta.height, meta.format, frame.data().to_vec())
        .and_then(|image| convert::to_dynamic(&image))
        .and_then(|image| image.save(path).map_err(Error::from));
    match written {
        Ok(()) => info!("incomplete frame {} written to {}", meta.sequence, path.display()),
        Err(e) => warn!("could not write incomplete frame {}: {}", meta.sequence, e),
    }
}

/// Disconnect, consuming the camera.
pub fn teardown<C: Camera>(camera: C) -> Result<()> {
    let label = camera.info().label();
    camera.disconnect().map_err(Error::Disconnect)?;
    info!("Disconnected from {}", label);
    Ok(())
}

/// One full run: discover, select, connect, configure, stream, acquire, tear down.
#[instrument(skip_all, fields(profile = ?config.capture.profile))]
pub fn run_session<K, I>(
    sdk: &mut K,
    input: &mut I,
    config: &Config,
    device_index: Option<usize>,
    mut sinks: Vec<Box<dyn FrameSink>>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<RunSummary>
where
    K: CameraSdk,
    I: InputSource,
{
    sdk.set_error_receiver(Box::new(log_error_event));

    let device = utils::select_device(sdk, input, device_index)?;
    let mut camera = sdk.connect(&device).map_err(Error::Connection)?;
    info!("Connected to {}", device.label());

    let configured: ConfiguredCamera = capture::configure(&mut camera, &config.capture)?;
    let pool = setup_stream(&mut camera, device.transport, config.stream.buffer_count)?;
    let mut processor = Processor::new(
        config.capture.profile,
        &config.processing,
        config.display.width,
        configured.output_width,
        configured.color,
    )?;

    let mut settings = LoopSettings::new(config, &configured);
    if let Some(cancel) = cancel {
        settings.stop = settings.stop.with_cancel(cancel);
    }
    let summary = acquire(&mut camera, &pool, &mut processor, &mut sinks, input, &settings)?;

    let outstanding = pool.outstanding();
    if outstanding != 0 {
        warn!("{} of {} buffers still checked out at teardown", outstanding, pool.capacity());
    }
    drop(pool);
    teardown(camera)?;
    Ok(summary)
}

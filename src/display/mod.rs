//! Where processed frames go: preview window, image files, console line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::capture::FrameMeta;
use crate::error::Result;
use crate::process::{convert, Processed};
use crate::sdk::StreamStatistics;
use crate::{Config, Profile};

pub mod preview;

#[cfg(feature = "sdl-display")]
pub mod display;

#[cfg(feature = "sdl-display")]
pub use display::Sdl2Display;

/// Consumer of processed frames. Sinks see each frame while its buffer is
/// still checked out and must not keep references past the call.
pub trait FrameSink {
    fn frame(&mut self, meta: &FrameMeta, processed: &Processed) -> Result<()>;

    /// Called once per loop iteration, whether or not a frame arrived.
    fn statistics(&mut self, _stats: &StreamStatistics) -> Result<()> {
        Ok(())
    }

    /// The sink asks the loop to stop (e.g. its window was closed).
    fn wants_stop(&mut self) -> bool {
        false
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Saves one of every `every` frames as PNG, named `<prefix>_<unix time>_<sequence>.png`.
pub struct FileSink {
    dir: PathBuf,
    prefix: String,
    every: u64,
    seen: u64,
    saved: Vec<PathBuf>,
}

impl FileSink {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, every: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            every: u64::from(every.max(1)),
            seen: 0,
            saved: Vec::new(),
        })
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    fn file_name(&self, sequence: u64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        format!(
            "{}_{}.{:03}_{}.png",
            self.prefix,
            now.as_secs(),
            now.subsec_millis(),
            sequence
        )
    }
}

impl FrameSink for FileSink {
    fn frame(&mut self, meta: &FrameMeta, processed: &Processed) -> Result<()> {
        let index = self.seen;
        self.seen += 1;
        if index % self.every != 0 {
            return Ok(());
        }
        let path = self.dir.join(self.file_name(meta.sequence));
        convert::to_dynamic(&processed.image)?.save(&path)?;
        info!("saved frame {} to {}", meta.sequence, path.display());
        self.saved.push(path);
        Ok(())
    }
}

/// Rewrites one console line with the stream counters.
#[derive(Default)]
pub struct StatisticsLine {
    printed: bool,
}

impl FrameSink for StatisticsLine {
    fn frame(&mut self, _meta: &FrameMeta, _processed: &Processed) -> Result<()> {
        Ok(())
    }

    fn statistics(&mut self, stats: &StreamStatistics) -> Result<()> {
        let mut out = std::io::stdout().lock();
        write!(out, "\r{}   Press any key to stop capturing", stats)?;
        out.flush()?;
        self.printed = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.printed {
            println!();
        }
        Ok(())
    }
}

/// Sinks for a run as configured. The single-shot profile always saves its
/// frame, to the working directory unless `save_dir` is set.
pub fn build_sinks(config: &Config) -> Result<Vec<Box<dyn FrameSink>>> {
    let display = &config.display;
    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();

    if display.print_statistics && config.capture.profile != Profile::SingleShot {
        sinks.push(Box::new(StatisticsLine::default()));
    }

    match (&display.save_dir, config.capture.profile) {
        (dir, Profile::SingleShot) => {
            let dir = dir.clone().unwrap_or_else(|| PathBuf::from("."));
            sinks.push(Box::new(FileSink::new(dir, display.file_prefix.clone(), 1)?));
        }
        (Some(dir), _) => {
            sinks.push(Box::new(FileSink::new(dir, display.file_prefix.clone(), display.save_every)?));
        }
        (None, _) => {}
    }

    if display.window {
        #[cfg(feature = "sdl-display")]
        sinks.push(Box::new(Sdl2Display::new("camgrab", display.width)?));
        #[cfg(not(feature = "sdl-display"))]
        tracing::warn!("built without the sdl-display feature, no preview window");
    }

    Ok(sinks)
}

//! SDL2 preview window
//! Shows the frame laid out by [`preview::compose`]. Closing the window
//! stops acquisition.

use sdl2::event::Event;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use tracing::info;

use super::{preview, FrameSink};
use crate::capture::FrameMeta;
use crate::error::{Error, Result};
use crate::process::Processed;

fn sdl_error(e: impl ToString) -> Error {
    Error::Display(e.to_string())
}

pub struct Sdl2Display {
    _context: sdl2::Sdl,
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    width: u32,
    sized: bool,
    quit: bool,
}

impl Sdl2Display {
    /// The window starts square and is resized to the first preview's aspect.
    pub fn new(title: &str, width: u32) -> Result<Self> {
        let context = sdl2::init().map_err(sdl_error)?;
        let video_subsystem = context.video().map_err(sdl_error)?;

        let window = video_subsystem
            .window(title, width, width)
            .position_centered()
            .resizable()
            .build()
            .map_err(sdl_error)?;

        let canvas = window.into_canvas().present_vsync().build().map_err(sdl_error)?;
        let texture_creator = canvas.texture_creator();
        let event_pump = context.event_pump().map_err(sdl_error)?;

        Ok(Self {
            _context: context,
            canvas,
            texture_creator,
            event_pump,
            width,
            sized: false,
            quit: false,
        })
    }
}

impl FrameSink for Sdl2Display {
    fn frame(&mut self, _meta: &FrameMeta, processed: &Processed) -> Result<()> {
        let image = preview::compose(processed)?;
        let pitch = image.width as usize * 3;

        if !self.sized && image.width > 0 {
            let height = (self.width as u64 * image.height as u64 / image.width as u64).max(1) as u32;
            self.canvas
                .window_mut()
                .set_size(self.width, height)
                .map_err(sdl_error)?;
            self.sized = true;
        }

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, image.width, image.height)
            .map_err(sdl_error)?;
        texture.update(None, &image.data, pitch).map_err(sdl_error)?;

        self.canvas.clear();
        self.canvas.copy(&texture, None, None).map_err(sdl_error)?;
        self.canvas.present();
        Ok(())
    }

    fn wants_stop(&mut self) -> bool {
        for event in self.event_pump.poll_iter() {
            if let Event::Quit { .. } = event {
                info!("Quit event received");
                self.quit = true;
            }
        }
        self.quit
    }
}

//! SDL2 Window Display Module
//! Shows preview frames with the pointer marker and run state, and turns
//! window events into tracker input.
//! Uses the sdl2 crate for window management and rendering.

use color_eyre::{eyre::eyre, Result};
use sdl2::event::{Event, WindowEvent};
use sdl2::pixels::{Color, PixelFormatEnum};
use sdl2::rect::Rect;
use sdl2::render::{BlendMode, Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::{debug, info};

use crate::capture::{Frame, Size};
use crate::output::format_timestamp;
use crate::pipeline::{Hud, Input, PreviewPoint, RunState, Surface};

const MARKER_RADIUS: i32 = 6;
const BANNER_HEIGHT: u32 = 36;

/// SDL2 Window Display
/// The canvas logical size is the preview size, so pointer events arrive in
/// preview pixels however the window is resized.
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    size: Size,
    title: String,
    shown_title: String,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, title: &str, size: Size) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window(title, size.width, size.height)
            .position_centered()
            .resizable()
            .build()?;

        let mut canvas = window.into_canvas().accelerated().build()?;
        canvas.set_logical_size(size.width, size.height)?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        info!("Display window {} ready", size);

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            size,
            title: title.to_string(),
            shown_title: title.to_string(),
        })
    }

    fn draw_marker(&mut self, point: PreviewPoint) -> Result<()> {
        let length = (MARKER_RADIUS * 2 + 1) as u32;
        self.canvas.set_draw_color(Color::RGB(0, 255, 0));
        self.canvas
            .fill_rect(Rect::new(point.x - MARKER_RADIUS, point.y - 1, length, 2))
            .map_err(|e| eyre!(e))?;
        self.canvas
            .fill_rect(Rect::new(point.x - 1, point.y - MARKER_RADIUS, 2, length))
            .map_err(|e| eyre!(e))?;
        Ok(())
    }

    fn draw_paused_banner(&mut self) -> Result<()> {
        self.canvas.set_blend_mode(BlendMode::Blend);
        self.canvas.set_draw_color(Color::RGBA(0, 0, 0, 160));
        self.canvas
            .fill_rect(Rect::new(0, 0, self.size.width, BANNER_HEIGHT))
            .map_err(|e| eyre!(e))?;
        self.canvas.set_draw_color(Color::RGB(0, 255, 255));
        self.canvas
            .fill_rect(Rect::new(0, BANNER_HEIGHT as i32 - 3, self.size.width, 3))
            .map_err(|e| eyre!(e))?;
        self.canvas.set_blend_mode(BlendMode::None);
        Ok(())
    }

    fn update_title(&mut self, hud: &Hud) -> Result<()> {
        let title = hud_text(&self.title, hud);
        if title != self.shown_title {
            self.canvas.window_mut().set_title(&title)?;
            self.shown_title = title;
        }
        Ok(())
    }
}

impl Surface for Sdl2Display {
    fn poll_input(&mut self) -> Vec<Input> {
        self.event_pump
            .poll_iter()
            .filter_map(|event| translate(&event))
            .collect()
    }

    fn present(&mut self, frame: &Frame, hud: &Hud) -> Result<()> {
        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::BGR24, frame.meta.width, frame.meta.height)
            .map_err(|e| eyre!(e))?;

        texture
            .update(None, &frame.data, frame.meta.stride())
            .map_err(|e| eyre!(e))?;

        self.canvas.set_draw_color(Color::RGB(0, 0, 0));
        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;
        drop(texture);

        if let Some(point) = hud.pointer {
            self.draw_marker(point)?;
        }
        if hud.state == RunState::Paused {
            self.draw_paused_banner()?;
        }

        self.canvas.present();
        self.update_title(hud)
    }
}

/// Map an SDL event to tracker input
fn translate(event: &Event) -> Option<Input> {
    match event {
        Event::Quit { .. }
        | Event::Window {
            win_event: WindowEvent::Close,
            ..
        } => {
            debug!("window closed");
            Some(Input::Quit)
        }
        Event::KeyDown {
            keycode: Some(key),
            repeat: false,
            ..
        } => match key.name().as_str() {
            "Space" => Some(Input::Toggle),
            "Q" | "Escape" => Some(Input::Quit),
            _ => None,
        },
        Event::MouseMotion { x, y, .. } | Event::MouseButtonDown { x, y, .. } => {
            Some(Input::Pointer(PreviewPoint::new(*x, *y)))
        }
        _ => None,
    }
}

/// Window title carrying the status line
fn hud_text(title: &str, hud: &Hud) -> String {
    match hud.state {
        RunState::Running => format!(
            "{} | RUNNING | t={} | n={} | {}x | prev_fps~{:.1}",
            title,
            format_timestamp(hud.preview_ms),
            hud.samples,
            hud.speed,
            hud.live_fps
        ),
        RunState::Paused if hud.started => format!(
            "{} | PAUSED at {} | n={} | SPACE to resume, Q/ESC to save & quit",
            title,
            format_timestamp(hud.preview_ms),
            hud.samples
        ),
        RunState::Paused => format!(
            "{} | PAUSED | SPACE to start, Q/ESC to quit",
            title
        ),
    }
}

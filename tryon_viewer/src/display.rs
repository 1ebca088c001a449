use jewel_tryon::{Command, Error, Frame, FrameSink, Result};
use log::debug;
use opencv::{
    core::{Point, Scalar},
    highgui::{self, WINDOW_NORMAL, WND_PROP_VISIBLE},
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_AA},
};

use crate::mat;

fn display_err(err: opencv::Error) -> Error {
    Error::Display(err.to_string())
}

/// HighGUI preview window. Draws the key hint on every frame and turns key
/// presses into session commands.
pub struct HighGuiWindow {
    title: String,
    hint: String,
    capture_key: char,
    quit_key: char,
}

impl HighGuiWindow {
    pub fn open(product_name: &str, capture_key: char, quit_key: char) -> Result<Self> {
        let title = format!("Try-On: {product_name}");
        highgui::named_window(&title, WINDOW_NORMAL).map_err(display_err)?;
        Ok(Self {
            title,
            hint: format!("Press '{capture_key}' to capture, '{quit_key}' to quit"),
            capture_key,
            quit_key,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Maps a `wait_key` code to a command. Escape always quits.
fn command_for_key(key: i32, capture_key: char, quit_key: char) -> Option<Command> {
    let key = u32::try_from(key & 0xFF).ok().and_then(char::from_u32)?;
    if key.eq_ignore_ascii_case(&quit_key) || key == '\u{1b}' {
        Some(Command::Quit)
    } else if key.eq_ignore_ascii_case(&capture_key) {
        Some(Command::Capture)
    } else {
        None
    }
}

impl FrameSink for HighGuiWindow {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let mut bgr = mat::frame_to_bgr(frame).map_err(display_err)?;
        imgproc::put_text(
            &mut bgr,
            &self.hint,
            Point::new(10, 30),
            FONT_HERSHEY_SIMPLEX,
            0.7,
            Scalar::new(255.0, 255.0, 255.0, 0.0),
            2,
            LINE_AA,
            false,
        )
        .map_err(display_err)?;
        highgui::imshow(&self.title, &bgr).map_err(display_err)
    }

    fn poll_command(&mut self) -> Result<Option<Command>> {
        let key = highgui::wait_key(1).map_err(display_err)?;
        if key >= 0 {
            return Ok(command_for_key(key, self.capture_key, self.quit_key));
        }
        // Closing the window with the mouse counts as quitting.
        let visible = highgui::get_window_property(&self.title, WND_PROP_VISIBLE).map_err(display_err)?;
        Ok((visible < 1.0).then_some(Command::Quit))
    }
}

impl Drop for HighGuiWindow {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_window(&self.title) {
            debug!("destroying window `{}`: {err}", self.title);
        }
    }
}

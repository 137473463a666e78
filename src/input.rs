//! Console input: the device-selection prompt and the "any key stops
//! capturing" check.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};
use std::os::fd::AsFd;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, Termios};
use tracing::debug;

pub trait InputSource {
    /// Read one line, without the trailing newline.
    fn read_line(&mut self) -> io::Result<String>;

    /// Non-blocking: has a key been pressed since the last call?
    fn key_pressed(&mut self) -> io::Result<bool>;
}

/// Standard input. The terminal is switched to non-canonical mode on the
/// first key poll so single key presses are seen without Enter; the previous
/// mode is restored on drop.
#[derive(Default)]
pub struct StdinInput {
    saved: Option<Termios>,
    raw: bool,
    eof: bool,
}

impl StdinInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter_raw_mode(&mut self) {
        self.raw = true;
        let stdin = io::stdin();
        // Not a terminal (pipe, file): keep reading it as is.
        let Ok(original) = tcgetattr(stdin.as_fd()) else {
            return;
        };
        let mut raw = original.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        match tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &raw) {
            Ok(()) => self.saved = Some(original),
            Err(e) => debug!("could not switch terminal mode: {}", e),
        }
    }
}

impl InputSource for StdinInput {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn key_pressed(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if !self.raw {
            self.enter_raw_mode();
        }
        let stdin = io::stdin();
        let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];
        if poll(&mut fds, PollTimeout::ZERO)? == 0 {
            return Ok(false);
        }
        let mut buf = [0u8; 64];
        match stdin.lock().read(&mut buf)? {
            0 => {
                self.eof = true;
                Ok(false)
            }
            _ => Ok(true),
        }
    }
}

impl Drop for StdinInput {
    fn drop(&mut self) {
        if let Some(original) = self.saved.take() {
            let _ = tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &original);
        }
    }
}

/// Canned input for tests and unattended runs.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
    /// Report a key press on this poll (1-based)
    key_on_poll: Option<u64>,
    polls: u64,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_key_on_poll(mut self, poll: u64) -> Self {
        self.key_on_poll = Some(poll);
        self
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self) -> io::Result<String> {
        self.lines
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more input"))
    }

    fn key_pressed(&mut self) -> io::Result<bool> {
        self.polls += 1;
        Ok(self.key_on_poll.is_some_and(|n| self.polls >= n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_lines_run_out() {
        let mut input = ScriptedInput::new(["1"]);
        assert_eq!(input.read_line().unwrap(), "1");
        assert_eq!(
            input.read_line().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn scripted_key_press() {
        let mut input = ScriptedInput::default().with_key_on_poll(3);
        assert!(!input.key_pressed().unwrap());
        assert!(!input.key_pressed().unwrap());
        assert!(input.key_pressed().unwrap());
        assert_eq!(input.polls(), 3);
    }
}

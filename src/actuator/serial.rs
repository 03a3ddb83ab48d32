//! Serial link to the peer controller.
//!
//! The tty is opened non-blocking and put in raw mode. Each action is written
//! as one line. A write that would block is dropped rather than stalling the
//! loop; the peer is expected to cope with a missed line the same way it copes
//! with a lost byte. A line the tty only partly accepted is finished before
//! anything else is written, so two codes never run together.

use anyhow::{Context, Result};
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use termios::Termios;

use super::{ActuatorSink, PeerMessage};
use crate::common::constants::PEER_LINE_LIMIT;
use crate::scheduler::ActionCode;

/// Map a numeric baud rate to its termios constant.
pub fn baud_constant(baud: u32) -> Option<termios::speed_t> {
    match baud {
        1200 => Some(termios::B1200),
        2400 => Some(termios::B2400),
        4800 => Some(termios::B4800),
        9600 => Some(termios::B9600),
        19200 => Some(termios::B19200),
        38400 => Some(termios::B38400),
        _ => None,
    }
}

/// Accumulates inbound bytes and yields complete lines. An unterminated line
/// longer than `PEER_LINE_LIMIT` is discarded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let tail = self
            .pending
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);
        if self.pending.len() - tail > PEER_LINE_LIMIT {
            self.pending.truncate(tail);
        }
    }

    /// Remove and return every complete, non-empty line. A trailing partial
    /// line stays buffered.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Part of the line went out; the rest is queued
    Queued,
    /// Nothing could be written; the line was dropped
    Busy,
}

/// Outbound side of the link. Holds the unwritten rest of a partly sent line.
#[derive(Debug, Default)]
pub struct LineWriter {
    unsent: Vec<u8>,
}

impl LineWriter {
    /// Write `line` after any queued remainder, without blocking.
    pub fn send<W: Write>(&mut self, port: &mut W, line: &[u8]) -> io::Result<SendOutcome> {
        if !self.flush(port)? {
            return Ok(SendOutcome::Busy);
        }

        let mut rest = line.to_vec();
        write_available(port, &mut rest)?;
        Ok(if rest.is_empty() {
            SendOutcome::Sent
        } else if rest.len() == line.len() {
            SendOutcome::Busy
        } else {
            self.unsent = rest;
            SendOutcome::Queued
        })
    }

    /// Push out the queued remainder. True once nothing is left.
    pub fn flush<W: Write>(&mut self, port: &mut W) -> io::Result<bool> {
        write_available(port, &mut self.unsent)
    }
}

/// Write as much of `bytes` as the port takes and remove what was written.
fn write_available<W: Write>(port: &mut W, bytes: &mut Vec<u8>) -> io::Result<bool> {
    while !bytes.is_empty() {
        match port.write(bytes) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                bytes.drain(..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

pub struct SerialSink {
    port: File,
    device: String,
    inbound: LineBuffer,
    outbound: LineWriter,
    debug_enabled: bool,
}

impl SerialSink {
    pub fn open(device: &str, baud: u32, debug_enabled: bool) -> Result<Self> {
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NONBLOCK | OFlag::O_NOCTTY).bits())
            .open(device)
            .with_context(|| format!("Failed to open serial device {device}"))?;

        let speed = baud_constant(baud)
            .with_context(|| format!("Unsupported baud rate {baud}"))?;

        let fd = port.as_raw_fd();
        let mut settings = Termios::from_fd(fd)
            .with_context(|| format!("{device} is not a terminal device"))?;
        termios::cfmakeraw(&mut settings);
        settings.c_cflag |= termios::CLOCAL | termios::CREAD;
        termios::cfsetspeed(&mut settings, speed)
            .with_context(|| format!("Failed to set {device} to {baud} baud"))?;
        termios::tcsetattr(fd, termios::TCSANOW, &settings)
            .with_context(|| format!("Failed to configure {device}"))?;
        // Discard anything left over from before we opened the line
        let _ = termios::tcflush(fd, termios::TCIOFLUSH);

        log_decorated!("Opened {device} at {baud} baud");

        Ok(Self {
            port,
            device: device.to_string(),
            inbound: LineBuffer::default(),
            outbound: LineWriter::default(),
            debug_enabled,
        })
    }
}

impl ActuatorSink for SerialSink {
    fn dispatch(&mut self, action: &ActionCode) -> Result<()> {
        let line = format!("{action}\n");
        let outcome = self
            .outbound
            .send(&mut self.port, line.as_bytes())
            .with_context(|| format!("Failed to write to {}", self.device))?;

        match outcome {
            SendOutcome::Sent => {}
            SendOutcome::Queued => {
                log_warning!("{} took part of \"{action}\", finishing it later", self.device);
            }
            SendOutcome::Busy => {
                log_warning!("{} is busy, dropped action \"{action}\"", self.device);
            }
        }
        Ok(())
    }

    fn poll_inbound(&mut self) -> Vec<PeerMessage> {
        if let Err(e) = self.outbound.flush(&mut self.port)
            && self.debug_enabled
        {
            log_debug!("Write to {} failed: {e}", self.device);
        }

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.inbound.push(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.debug_enabled {
                        log_debug!("Read from {} failed: {e}", self.device);
                    }
                    break;
                }
            }
        }

        self.inbound
            .drain_lines()
            .iter()
            .map(|line| PeerMessage::parse(line))
            .collect()
    }

    fn sink_name(&self) -> &'static str {
        "serial"
    }

    fn cleanup(self: Box<Self>, debug_enabled: bool) {
        let _ = termios::tcdrain(self.port.as_raw_fd());
        if debug_enabled {
            log_debug!("Closed {}", self.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_keeps_partial_lines() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"Auto_Sunset_Tog");
        assert!(buffer.drain_lines().is_empty());

        buffer.push(b"gle\r\n\nACK\nBTN");
        assert_eq!(buffer.drain_lines(), vec!["Auto_Sunset_Toggle", "ACK"]);

        buffer.push(b"-Next\n");
        assert_eq!(buffer.drain_lines(), vec!["BTN-Next"]);
    }

    #[test]
    fn test_unterminated_flood_is_discarded() {
        let mut buffer = LineBuffer::default();
        buffer.push(&[b'x'; 200]);
        buffer.push(&[b'x'; 200]);
        assert!(buffer.pending.is_empty());

        buffer.push(b"ACK\n");
        assert_eq!(buffer.drain_lines(), vec!["ACK"]);
    }

    /// Accepts at most the given number of bytes per call, then would block.
    struct ChokedTty {
        budgets: Vec<usize>,
        written: Vec<u8>,
    }

    impl Write for ChokedTty {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budgets.is_empty() {
                return Err(ErrorKind::WouldBlock.into());
            }
            let n = self.budgets.remove(0).min(buf.len());
            if n == 0 {
                return Err(ErrorKind::WouldBlock.into());
            }
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_partial_line_is_finished_before_next_code() {
        let mut tty = ChokedTty {
            budgets: vec![1, 0, 8, 8],
            written: Vec::new(),
        };
        let mut writer = LineWriter::default();

        assert_eq!(writer.send(&mut tty, b"2\n").unwrap(), SendOutcome::Queued);
        assert_eq!(writer.send(&mut tty, b"0\n").unwrap(), SendOutcome::Sent);
        assert_eq!(tty.written, b"2\n0\n");
    }

    #[test]
    fn test_busy_port_drops_whole_line() {
        let mut tty = ChokedTty {
            budgets: vec![0],
            written: Vec::new(),
        };
        let mut writer = LineWriter::default();

        assert_eq!(writer.send(&mut tty, b"3\n").unwrap(), SendOutcome::Busy);
        assert!(tty.written.is_empty());
        assert!(writer.flush(&mut tty).unwrap());
    }

    #[test]
    fn test_baud_constants() {
        assert_eq!(baud_constant(9600), Some(termios::B9600));
        assert_eq!(baud_constant(115_200), None);
    }

    #[test]
    fn test_open_rejects_missing_and_non_tty() {
        assert!(SerialSink::open("/nonexistent/ttyS9", 9600, false).is_err());

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let err = SerialSink::open(&path, 9600, false).err().unwrap();
        assert!(err.to_string().contains("not a terminal"));
    }
}

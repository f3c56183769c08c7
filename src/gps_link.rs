//! Receiver link
//!
//! A reader thread pulls bytes from the receiver (serial device, file or
//! stdin) and hands them to the polling loop over a channel, so the loop only
//! ever waits for one poll interval.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Write},
    path::Path,
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use nmea_gps::ubx;
use snafu::ResultExt;

use crate::error::{GpsConfigureSnafu, GpsInputSnafu, Result, ThreadSpawnSnafu};

/// How the reader thread slices the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Live receiver: forward whatever arrives, up to `chunk` bytes per read
    Stream { chunk: usize },
    /// Recorded log: one line at a time with a pause between lines
    Replay { delay: Duration },
}

pub struct GpsLink {
    rx: Receiver<Vec<u8>>,
    closed: bool,
}

impl GpsLink {
    pub fn spawn<R>(reader: R, mode: LinkMode) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("gps-link".into())
            .spawn(move || {
                let sink = |bytes: Vec<u8>| tx.send(bytes).is_ok();
                let result = match mode {
                    LinkMode::Stream { chunk } => stream(reader, chunk.max(1), sink),
                    LinkMode::Replay { delay } => replay(BufReader::new(reader), delay, sink),
                };
                match result {
                    Ok(()) => debug!("GPS input closed"),
                    Err(e) => warn!("GPS input failed: {e}"),
                }
            })
            .context(ThreadSpawnSnafu { name: "gps-link" })?;

        Ok(Self { rx, closed: false })
    }

    /// Open `path` (or stdin for `None` / `-`). Serial devices get the UBX
    /// rate command before reading starts.
    pub fn open(path: Option<&Path>, mode: LinkMode, rate_hz: u8) -> Result<Self> {
        match path {
            None => Self::spawn(io::stdin(), mode),
            Some(path) if path.as_os_str() == "-" => Self::spawn(io::stdin(), mode),
            Some(path) if path.starts_with("/dev") => {
                let display = path.display().to_string();
                let mut device = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .context(GpsInputSnafu { path: display })?;
                if let Err(e) = configure_rate(&mut device, rate_hz) {
                    warn!("{e}, keeping receiver default rate");
                }
                Self::spawn(device, mode)
            }
            Some(path) => {
                let file = File::open(path).context(GpsInputSnafu {
                    path: path.display().to_string(),
                })?;
                Self::spawn(file, mode)
            }
        }
    }

    /// Wait up to `timeout` for bytes. Returns an empty buffer on timeout.
    pub fn poll(&mut self, timeout: Duration) -> Vec<u8> {
        if self.closed {
            thread::sleep(timeout);
            return Vec::new();
        }
        let mut bytes = match self.rx.recv_timeout(timeout) {
            Ok(bytes) => bytes,
            Err(RecvTimeoutError::Timeout) => return Vec::new(),
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                return Vec::new();
            }
        };
        // Coalesce anything else already queued
        for more in self.rx.try_iter() {
            bytes.extend_from_slice(&more);
        }
        bytes
    }

    /// The input reached end of file or failed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Send the UBX-CFG-RATE command for `rate_hz`
pub fn configure_rate<W: Write>(port: &mut W, rate_hz: u8) -> Result<()> {
    let command = ubx::rate_command(rate_hz);
    port.write_all(&command).context(GpsConfigureSnafu)?;
    port.flush().context(GpsConfigureSnafu)?;
    info!("Receiver rate set to {} Hz ({} bytes)", rate_hz, command.len());
    Ok(())
}

fn stream<R: Read>(
    mut reader: R,
    chunk: usize,
    mut sink: impl FnMut(Vec<u8>) -> bool,
) -> io::Result<()> {
    let mut buf = vec![0u8; chunk];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if !sink(buf[..n].to_vec()) {
            return Ok(());
        }
    }
}

fn replay<R: BufRead>(
    mut reader: R,
    delay: Duration,
    mut sink: impl FnMut(Vec<u8>) -> bool,
) -> io::Result<()> {
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if !sink(line) {
            return Ok(());
        }
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

//! Line transport to the controller.
//!
//! The link is split into two halves so the listener can sit in a blocking
//! read while the worker writes:
//!
//! - a [`LineReader`], owned exclusively by the listener thread;
//! - a writer (`Box<dyn Write + Send>`), guarded by the device manager.
//!
//! Every read is bounded by the transport's own timeout, which is what keeps
//! [`DeviceManager::stop`][crate::device::DeviceManager::stop] from blocking
//! indefinitely.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use tracing::info;
use vexmind_types::VexError;

/// Source of newline-delimited frames.
pub trait LineReader: Send {
    /// Read one line, without its terminator.
    ///
    /// Blocks for at most the transport's read timeout and returns
    /// `Ok(None)` when no complete line arrived in that window.
    ///
    /// # Errors
    ///
    /// Any I/O failure of the underlying link, including end-of-stream.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// A split, ready-to-use link.
pub struct Transport {
    /// Human-readable link name used in logs, e.g. the port path.
    pub label: String,
    pub reader: Box<dyn LineReader>,
    pub writer: Box<dyn Write + Send>,
}

/// Adapts any timeout-aware [`Read`] into a [`LineReader`].
///
/// Bytes of a line that is still arriving when a read times out are kept and
/// completed by the next call.
pub struct BufferedLineReader<R: Read + Send> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read + Send> BufferedLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }
}

impl<R: Read + Send> LineReader for BufferedLineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.inner.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial link closed",
            )),
            Ok(_) => {
                let mut line = std::mem::take(&mut self.pending);
                while matches!(line.last(), Some(b'\n' | b'\r')) {
                    line.pop();
                }
                Ok(Some(line))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Serial port parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM1".to_string(),
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens real serial ports.
pub struct SerialTransport;

impl SerialTransport {
    /// Open `config.port` and split it into a reader and a writer half.
    ///
    /// # Errors
    ///
    /// Returns [`VexError::Transport`] when the port cannot be opened or its
    /// handle cannot be duplicated.
    pub fn open(config: &SerialConfig) -> Result<Transport, VexError> {
        let transport_err = |e: serialport::Error| VexError::Transport {
            port: config.port.clone(),
            details: e.to_string(),
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(transport_err)?;
        let read_half = port.try_clone().map_err(transport_err)?;

        info!(
            port = %config.port,
            baud_rate = config.baud_rate,
            "serial port opened"
        );

        Ok(Transport {
            label: config.port.clone(),
            reader: Box::new(BufferedLineReader::new(read_half)),
            writer: Box::new(port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted read results.
    struct ScriptedRead {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for ScriptedRead {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
            }
        }
    }

    fn reader(steps: Vec<io::Result<Vec<u8>>>) -> BufferedLineReader<ScriptedRead> {
        BufferedLineReader::new(ScriptedRead {
            steps: steps.into(),
        })
    }

    #[test]
    fn complete_line_is_returned_without_terminator() {
        let mut r = reader(vec![Ok(b"<#>ok<#>\r\n".to_vec())]);
        assert_eq!(r.read_line().unwrap(), Some(b"<#>ok<#>".to_vec()));
    }

    #[test]
    fn timeout_yields_none_and_keeps_partial_line() {
        let mut r = reader(vec![
            Ok(b"<#>par".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            Ok(b"tial<#>\n".to_vec()),
        ]);
        assert_eq!(r.read_line().unwrap(), None);
        assert_eq!(r.read_line().unwrap(), Some(b"<#>partial<#>".to_vec()));
    }

    #[test]
    fn end_of_stream_is_an_error() {
        let mut r = reader(vec![]);
        let err = r.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn default_serial_config() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.port, "/dev/ttyACM1");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn opening_missing_port_is_transport_error() {
        let cfg = SerialConfig {
            port: "/dev/vexmind-does-not-exist".to_string(),
            ..SerialConfig::default()
        };
        assert!(matches!(
            SerialTransport::open(&cfg),
            Err(VexError::Transport { .. })
        ));
    }
}

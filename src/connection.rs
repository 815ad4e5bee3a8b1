//! Byte-level transport to the device
//!
//! The bootloader protocol only needs two primitives: an all-or-nothing write
//! and a deadline-bounded exact read. Everything above this module is written
//! against the [`Transport`] trait so that the protocol and the programming
//! algorithms can be exercised against an in-memory channel.

use std::{
    io::{ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use serialport::SerialPort;

use crate::error::ConnectionError;

/// Default deadline for a single `read_exact` call. The deadline restarts for
/// every call, it is not cumulative across the reads of one logical operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A blocking byte channel with deadline-bounded reads.
pub trait Transport {
    /// Block until `buf` is filled or `timeout` elapses.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), ConnectionError>;

    /// Write every byte of `data`. A short write is fatal; there is no
    /// partial-write retry loop.
    fn write_all(&mut self, data: &[u8]) -> Result<(), ConnectionError>;
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn new(serial: Box<dyn SerialPort>) -> Self {
        SerialTransport { serial }
    }

    pub fn into_serial(self) -> Box<dyn SerialPort> {
        self.serial
    }
}

impl Transport for SerialTransport {
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + timeout;
        let mut received = 0;

        while received < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ConnectionError::ReadTimeout {
                    expected: buf.len(),
                    received,
                    timeout,
                });
            }
            self.serial.set_timeout(remaining)?;

            match self.serial.read(&mut buf[received..]) {
                Ok(0) => {
                    return Err(ConnectionError::ReadTimeout {
                        expected: buf.len(),
                        received,
                        timeout,
                    })
                }
                Ok(count) => received += count,
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    return Err(ConnectionError::ReadTimeout {
                        expected: buf.len(),
                        received,
                        timeout,
                    })
                }
                Err(err) => return Err(ConnectionError::Io(err)),
            }
        }

        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        write_frame(&mut self.serial, data)
    }
}

/// Write `data` in one call and flush. The protocol frames are a handful of
/// bytes each, so a short write means the port is in a bad state and the
/// operation is abandoned rather than resumed.
fn write_frame<W: Write + ?Sized>(writer: &mut W, data: &[u8]) -> Result<(), ConnectionError> {
    let written = writer.write(data)?;
    if written != data.len() {
        return Err(ConnectionError::IncompleteWrite {
            written,
            expected: data.len(),
        });
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport for protocol tests.

    use std::{cell::RefCell, rc::Rc};

    use super::*;

    /// Log of every frame a [`MockTransport`] was asked to write, shared so
    /// tests can inspect it after the transport is boxed into a session.
    pub(crate) type WriteLog = Rc<RefCell<Vec<Vec<u8>>>>;

    /// Replays a queue of canned responses and records every write.
    ///
    /// When the response queue runs dry, reads fail with `ReadTimeout`
    /// immediately instead of blocking.
    pub(crate) struct MockTransport {
        responses: Vec<Vec<u8>>,
        written: WriteLog,
        cursor: usize,
    }

    impl MockTransport {
        pub(crate) fn new(responses: &[&[u8]]) -> Self {
            MockTransport {
                responses: responses.iter().rev().map(|r| r.to_vec()).collect(),
                written: Rc::new(RefCell::new(Vec::new())),
                cursor: 0,
            }
        }

        pub(crate) fn log(&self) -> WriteLog {
            Rc::clone(&self.written)
        }

        pub(crate) fn drained(&self) -> bool {
            self.responses.is_empty()
        }
    }

    impl Transport for MockTransport {
        fn read_exact(
            &mut self,
            buf: &mut [u8],
            timeout: Duration,
        ) -> Result<(), ConnectionError> {
            let mut received = 0;
            while received < buf.len() {
                let Some(chunk) = self.responses.last() else {
                    return Err(ConnectionError::ReadTimeout {
                        expected: buf.len(),
                        received,
                        timeout,
                    });
                };
                let take = (buf.len() - received).min(chunk.len() - self.cursor);
                buf[received..received + take]
                    .copy_from_slice(&chunk[self.cursor..self.cursor + take]);
                received += take;
                self.cursor += take;
                if self.cursor == chunk.len() {
                    self.responses.pop();
                    self.cursor = 0;
                }
            }
            Ok(())
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
            self.written.borrow_mut().push(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn mock_replays_responses_across_reads() {
        let mut mock = MockTransport::new(&[b"VuX", b"f"]);

        let mut sig = [0; 3];
        mock.read_exact(&mut sig, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(&sig, b"VuX");

        let mut ty = [0; 1];
        mock.read_exact(&mut ty, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(&ty, b"f");
        assert!(mock.drained());
    }

    #[test]
    fn mock_times_out_when_drained() {
        let mut mock = MockTransport::new(&[]);
        let mut buf = [0; 2];

        let err = mock.read_exact(&mut buf, DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::ReadTimeout {
                expected: 2,
                received: 0,
                ..
            }
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    /// Accepts at most `capacity` bytes per write, like a port whose buffer
    /// is nearly full.
    struct ShortWriter {
        capacity: usize,
        data: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let take = buf.len().min(self.capacity);
            self.data.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_frame_sends_whole_frames() {
        let mut writer = ShortWriter {
            capacity: 16,
            data: Vec::new(),
        };

        write_frame(&mut writer, b"w\x01\x00").unwrap();
        assert_eq!(writer.data, b"w\x01\x00");
    }

    #[test]
    fn write_frame_reports_short_writes() {
        let mut writer = ShortWriter {
            capacity: 2,
            data: Vec::new(),
        };

        let err = write_frame(&mut writer, b"w\x01\x00\x04").unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::IncompleteWrite {
                written: 2,
                expected: 4,
            }
        ));
    }
}

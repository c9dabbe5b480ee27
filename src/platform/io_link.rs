//! Adapts any blocking `embedded_io` serial port into a [`SerialLink`].
//!
//! Grounded on the teacher's own `impl embedded_io::Write for Uart<'_, M>`
//! (`src/uart/mod.rs`): a target's concrete UART driver is expected to
//! already implement `embedded_io::Read`/`Write`/`ReadReady`, the way the
//! teacher's does. `embedded_io` has no notion of a receive timeout, so this
//! adapter layers the boot protocol's timeout semantics (spec.md §4.10) on
//! top by polling [`embedded_io::ReadReady`] at a fixed interval via
//! [`DelayMs`], rather than inventing a timeout-aware serial trait from
//! scratch.

use embedded_io::{Read, ReadReady, Write, WriteAllError};

use super::{DelayMs, SerialError, SerialLink};

/// Wraps an `embedded_io` port plus a delay source, polling for readiness
/// instead of blocking indefinitely in `read`.
pub struct EmbeddedIoSerial<'a, T, D> {
    port: T,
    delay: &'a mut D,
    poll_interval_ms: u32,
}

/// Transmit failure from the wrapped port, distinguishing a short write
/// (`WriteZero`, which `embedded_io::Write::write_all` reports when the
/// port accepts fewer bytes than given without erroring) from the port's
/// own [`embedded_io::Error`].
#[derive(Debug)]
pub enum EmbeddedIoSerialError<E> {
    WriteZero,
    Io(E),
}

impl<'a, T, D> EmbeddedIoSerial<'a, T, D>
where
    T: Read + Write,
    D: DelayMs,
{
    /// `poll_interval_ms` bounds how coarsely `read_exact_timeout` can
    /// observe its deadline: each poll that finds nothing ready sleeps this
    /// long before checking again.
    pub fn new(port: T, delay: &'a mut D, poll_interval_ms: u32) -> Self {
        Self { port, delay, poll_interval_ms: poll_interval_ms.max(1) }
    }

    pub fn into_inner(self) -> T {
        self.port
    }
}

impl<'a, T, D> SerialLink for EmbeddedIoSerial<'a, T, D>
where
    T: Read + Write + ReadReady,
    D: DelayMs,
{
    type Error = EmbeddedIoSerialError<T::Error>;

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        Write::write_all(&mut self.port, buf).map_err(|e| match e {
            WriteAllError::WriteZero => EmbeddedIoSerialError::WriteZero,
            WriteAllError::Other(err) => EmbeddedIoSerialError::Io(err),
        })
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), SerialError> {
        let mut filled = 0;
        let mut waited_ms = 0u32;

        while filled < buf.len() {
            match self.port.read_ready() {
                Ok(true) => {}
                Ok(false) => {
                    if timeout_ms != 0 && waited_ms >= timeout_ms {
                        return Err(SerialError::Timeout);
                    }
                    self.delay.delay_ms(self.poll_interval_ms);
                    waited_ms += self.poll_interval_ms;
                    continue;
                }
                Err(_) => return Err(SerialError::Receive),
            }

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => return Err(SerialError::Receive),
                Ok(n) => filled += n,
                Err(_) => return Err(SerialError::Receive),
            }
        }

        Ok(())
    }
}

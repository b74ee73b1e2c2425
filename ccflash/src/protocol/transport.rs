//! ACK-based packet exchange over a [`Port`].
//!
//! One request is outstanding at a time. A packet is considered delivered once
//! the peer answers with [`ACK`]; a received packet is acknowledged only after
//! its checksum has been verified.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::{
            command::Command,
            packet::{self, ACK, HEADER_LEN, Header, hex_preview},
        },
    },
    log::{debug, trace},
    std::{
        io::{ErrorKind as IoErrorKind, Read, Write},
        time::Duration,
    },
};

/// Bytes shown in wire-level trace logs.
const TRACE_LIMIT: usize = 64;

/// Packet transport over a byte channel.
pub struct Transport<P: Port> {
    port: P,
}

impl<P: Port> Transport<P> {
    /// Wrap a port.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Borrow the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Release the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }

    /// Set the read timeout for subsequent reads.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        trace!("Read timeout -> {timeout:?}");
        self.port
            .set_timeout(timeout)
    }

    /// Assert or release the break condition.
    pub fn set_break(&mut self, level: bool) -> Result<()> {
        self.port
            .set_break(level)
    }

    /// Discard pending input and output.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.port
            .clear_buffers()
    }

    /// Close the channel; every later operation fails.
    pub fn close(&mut self) -> Result<()> {
        self.port
            .close()
    }

    /// Send `opcode ++ args` as one packet and wait for the ACK.
    pub fn send_command(&mut self, command: Command, args: &[u8]) -> Result<()> {
        debug!(
            "=> {command} args({}): {}",
            args.len(),
            hex_preview(args, 32)
        );
        let mut payload = Vec::with_capacity(1 + args.len());
        payload.push(command.opcode());
        payload.extend_from_slice(args);
        self.send_packet(&payload)
    }

    /// Send a raw payload as one packet and wait for the ACK.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        let packet = packet::encode(payload)?;
        trace!(
            "=> ({}) {}",
            packet.len(),
            hex_preview(&packet, TRACE_LIMIT)
        );
        self.write_once(&packet)?;
        self.recv_ack()
    }

    /// Receive one packet, verify it and acknowledge it.
    pub fn recv_packet(&mut self) -> Result<Vec<u8>> {
        let raw = self.read_exact_n(HEADER_LEN)?;
        let header = Header::parse([raw[0], raw[1], raw[2]])?;
        let payload = self.read_exact_n(header.payload_len())?;
        let actual = packet::checksum(&payload);
        if actual != header.checksum {
            return Err(Error::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }
        self.send_ack()?;
        Ok(payload)
    }

    /// Send an ACK.
    pub fn send_ack(&mut self) -> Result<()> {
        trace!("=> ({}) {}", ACK.len(), hex_preview(&ACK, 2));
        self.write_once(&ACK)
    }

    /// Read exactly two bytes and check that they are an ACK.
    pub fn recv_ack(&mut self) -> Result<()> {
        let bytes = self.read_exact_n(2)?;
        if bytes != ACK {
            return Err(Error::InvalidAck([bytes[0], bytes[1]]));
        }
        Ok(())
    }

    /// Read exactly `n` bytes.
    ///
    /// A read returning no data is inbound EOF and yields [`Error::ShortRead`];
    /// a read timing out yields [`Error::Timeout`].
    pub fn read_exact_n(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            match self
                .port
                .read(&mut buf[got..])
            {
                Ok(0) => return Err(Error::ShortRead { wanted: n, got }),
                Ok(count) => got += count,
                Err(e) if e.kind() == IoErrorKind::Interrupted => {},
                Err(e) if matches!(e.kind(), IoErrorKind::TimedOut | IoErrorKind::WouldBlock) => {
                    return Err(Error::Timeout(format!("read({n}) got {got} bytes")));
                },
                Err(e) => return Err(e.into()),
            }
        }
        trace!("<= ({n}) {}", hex_preview(&buf, TRACE_LIMIT));
        Ok(buf)
    }

    /// Write `bytes` as one logical write; a channel accepting fewer bytes is
    /// a short write.
    fn write_once(&mut self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            match self
                .port
                .write(&bytes[written..])
            {
                Ok(0) => {
                    return Err(Error::ShortWrite {
                        wanted: bytes.len(),
                        written,
                    });
                },
                Ok(count) => written += count,
                Err(e) if e.kind() == IoErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }
        self.port
            .flush()?;
        Ok(())
    }
}

//! Scripted in-memory port for unit tests.

use {
    crate::{
        error::Result,
        port::Port,
        protocol::packet::{self, ACK},
    },
    std::{
        collections::VecDeque,
        io::{self, Read, Write},
        time::Duration,
    },
};

/// Scripted port.
///
/// Reads are served from `read_queue`; an empty queue times out (or reports
/// EOF when `eof_when_empty` is set). Every `write` call is logged as its own
/// entry so packets and ACKs stay distinguishable. Each `set_break(true)` pops
/// one entry from `on_break` into the read queue, which lets tests script how
/// the boot ROM answers each synchronization attempt. `clear_buffers` keeps
/// queued input so responses can be scripted up front.
#[derive(Debug, Default)]
pub(crate) struct MockPort {
    pub read_queue: VecDeque<u8>,
    pub writes: Vec<Vec<u8>>,
    pub on_break: VecDeque<Vec<u8>>,
    pub breaks: Vec<bool>,
    pub timeouts: Vec<Duration>,
    pub eof_when_empty: bool,
    pub refuse_writes: bool,
    pub max_read: usize,
    timeout: Duration,
    closed: bool,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to the read queue.
    pub fn queue(&mut self, bytes: &[u8]) {
        self.read_queue
            .extend(bytes);
    }

    /// Append a framed packet to the read queue.
    pub fn queue_packet(&mut self, payload: &[u8]) {
        let bytes = packet::encode(payload).unwrap();
        self.queue(&bytes);
    }

    /// Queue the ROM side of a command answered with an ACK and a status packet.
    pub fn queue_status(&mut self, status: u8) {
        self.queue(&ACK);
        self.queue(&ACK);
        self.queue_packet(&[status]);
    }

    /// Bytes to inject on the next break assertion.
    pub fn on_next_break(&mut self, bytes: &[u8]) {
        self.on_break
            .push_back(bytes.to_vec());
    }

    /// Whether all scripted input was consumed.
    pub fn is_drained(&self) -> bool {
        self.read_queue
            .is_empty()
    }

    /// Payloads of every packet written, ACKs excluded.
    pub fn sent_packets(&self) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|w| w.as_slice() != ACK)
            .map(|w| packet::decode(w).unwrap())
            .collect()
    }

    /// Opcodes of every packet written, in order.
    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.sent_packets()
            .iter()
            .map(|p| p[0])
            .collect()
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        Ok(())
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if self
            .read_queue
            .is_empty()
        {
            if self.eof_when_empty {
                return Ok(0);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
        }
        let mut limit = buf.len();
        if self.max_read > 0 {
            limit = limit.min(self.max_read);
        }
        let mut n = 0;
        while n < limit {
            match self
                .read_queue
                .pop_front()
            {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                },
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        if self.refuse_writes {
            return Ok(0);
        }
        self.writes
            .push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeouts
            .push(timeout);
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_break(&mut self, level: bool) -> Result<()> {
        self.check_open()?;
        self.breaks
            .push(level);
        if level {
            if let Some(bytes) = self
                .on_break
                .pop_front()
            {
                self.read_queue
                    .extend(bytes);
            }
        }
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

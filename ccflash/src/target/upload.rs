//! SLFS file upload.
//!
//! ## Upload Sequence
//!
//! ```text
//! Host                                   ROM
//!  |  StartUpload [flags][0][name][0]     |
//!  |------------------------------------->|
//!  |<------------------------ ACK + token |
//!  |  UploadChunk [offset][4096 bytes]    |  repeated, offsets ascending
//!  |------------------------------------->|
//!  |<------------------- ACK + GetStatus  |
//!  |  FinishUpload [63 x 0][signature]    |  signature part only if signed
//!  |------------------------------------->|
//!  |<------------------- ACK + GetStatus  |
//! ```
//!
//! The open command encodes the allocation as a block size ladder index and
//! a one-byte block count, so a file can hold at most 255 blocks of the
//! largest size.

use {
    crate::{
        error::{Error, Result, ResultExt},
        image::part::{FilePart, SIGNATURE_LEN},
        port::Port,
        protocol::Command,
        target::rom::RomClient,
    },
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
    log::{debug, info},
    std::fmt,
};

/// Block sizes the ROM can allocate, indexed by the ladder index in the flags.
pub const BLOCK_SIZE_LADDER: [usize; 5] = [0x100, 0x400, 0x1000, 0x4000, 0x10000];

/// Largest block count the open flags can carry.
pub const MAX_BLOCK_COUNT: usize = 255;

/// Data bytes per `UploadChunk`.
pub const CHUNK_SIZE: usize = 0x1000;

/// Zero bytes preceding the signature in `FinishUpload`.
pub const SIGNATURE_PADDING: usize = 63;

/// Block size and count chosen for a file allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadEncoding {
    /// Index into [`BLOCK_SIZE_LADDER`].
    pub ladder_index: u8,
    /// Block size in bytes.
    pub block_size: usize,
    /// Number of blocks.
    pub block_count: u8,
}

/// Pick the smallest block size whose block count fits in one byte.
pub fn choose_block_encoding(size: usize) -> Result<UploadEncoding> {
    BLOCK_SIZE_LADDER
        .iter()
        .enumerate()
        .find_map(|(i, &block_size)| {
            let count = size.div_ceil(block_size);
            (count <= MAX_BLOCK_COUNT).then(|| UploadEncoding {
                ladder_index: u8::try_from(i).unwrap_or(u8::MAX),
                block_size,
                block_count: u8::try_from(count).unwrap_or(u8::MAX),
            })
        })
        .ok_or_else(|| Error::FileTooLarge {
            name: String::new(),
            size,
        })
}

/// `StartUpload` open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    /// Create the file if it does not exist.
    pub const CREATE_IF_NOT_EXIST: u32 = 0x3000;
    /// Keep the previous copy until the new one is committed.
    pub const FAIL_SAFE: u32 = 0x10000;
    /// Signed file.
    pub const SECURE: u32 = 0x20000;

    /// Raw value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether all bits of `mask` are set.
    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

fn check_signature(part: &FilePart) -> Result<()> {
    match &part.signature {
        Some(sig) if sig.len() != SIGNATURE_LEN => Err(Error::InvalidSignatureLength {
            name: part
                .name
                .clone(),
            len: sig.len(),
        }),
        _ => Ok(()),
    }
}

/// Compose the open flags for `part` allocated with `encoding`.
pub fn open_flags(part: &FilePart, encoding: &UploadEncoding) -> Result<OpenFlags> {
    check_signature(part)?;
    let mut flags = OpenFlags::CREATE_IF_NOT_EXIST;
    if part
        .signature
        .is_some()
    {
        flags |= OpenFlags::SECURE;
    }
    if part.fail_safe {
        flags |= OpenFlags::FAIL_SAFE;
    }
    flags |= u32::from(encoding.ladder_index) << 8;
    flags |= u32::from(encoding.block_count);
    Ok(OpenFlags(flags))
}

impl<P: Port> RomClient<P> {
    /// Write one file to SLFS.
    ///
    /// Nothing is sent unless the signature length and allocation size are
    /// valid. Chunks go out strictly in offset order; any failure aborts the
    /// whole file.
    ///
    /// # Arguments
    ///
    /// * `part` - The file to write
    /// * `progress` - Progress callback (current_bytes, total_bytes)
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn upload_file(
        &mut self,
        part: &FilePart,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        let name = part
            .name
            .as_str();
        check_signature(part)?;
        let size = part.target_size();
        let encoding = choose_block_encoding(size).map_err(|_| Error::FileTooLarge {
            name: name.to_string(),
            size,
        })?;
        let flags = open_flags(part, &encoding)?;
        debug!(
            "{name}: {} blocks * {}; flags: {flags}",
            encoding.block_count, encoding.block_size
        );

        let timeouts = *self.timeouts();
        let open_failed = |source: Error| Error::OpenFailed {
            name: name.to_string(),
            source: Box::new(source),
        };

        let mut args = Vec::with_capacity(10 + name.len());
        args.write_u32::<BigEndian>(flags.bits())
            .unwrap();
        args.write_u32::<BigEndian>(0)
            .unwrap();
        args.extend_from_slice(name.as_bytes());
        args.write_u16::<BigEndian>(0)
            .unwrap();
        self.transport_mut()
            .set_read_timeout(timeouts.open)?;
        self.send(Command::StartUpload, &args)
            .map_err(open_failed)?;
        let token = self
            .transport_mut()
            .read_exact_n(4)
            .context("failed to read token")
            .map_err(open_failed)?;
        debug!("{name}: token {:#010x}", BigEndian::read_u32(&token));

        self.transport_mut()
            .set_read_timeout(timeouts.chunk)?;
        let total = part
            .data
            .len();
        let mut offset = 0;
        for chunk in part
            .data
            .chunks(CHUNK_SIZE)
        {
            let mut args = Vec::with_capacity(4 + chunk.len());
            args.write_u32::<BigEndian>(u32::try_from(offset).unwrap_or(u32::MAX))
                .unwrap();
            args.extend_from_slice(chunk);
            self.command_with_status(Command::UploadChunk, &args)
                .map_err(|source| Error::ChunkFailed {
                    name: name.to_string(),
                    offset,
                    source: Box::new(source),
                })?;
            offset += chunk.len();
            progress(offset, total);
        }

        let mut fin = Vec::new();
        if let Some(sig) = &part.signature {
            fin.resize(SIGNATURE_PADDING, 0);
            fin.extend_from_slice(sig);
        }
        self.command_with_status(Command::FinishUpload, &fin)
            .map_err(|source| Error::FinalizeFailed {
                name: name.to_string(),
                source: Box::new(source),
            })?;

        info!("{name}: {total} bytes written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::ErrorKind,
            port::mock::MockPort,
            protocol::{ACK, Status},
            target::ChipFamily,
        },
    };

    fn enc(size: usize) -> (usize, usize) {
        let e = choose_block_encoding(size).unwrap();
        (e.block_size, usize::from(e.block_count))
    }

    #[test]
    fn test_choose_block_encoding() {
        assert_eq!(enc(0), (0x100, 0));
        assert_eq!(enc(1), (0x100, 1));
        assert_eq!(enc(256), (0x100, 1));
        assert_eq!(enc(257), (0x100, 2));
        assert_eq!(enc(4096), (0x100, 16));
        assert_eq!(enc(255 * 0x100), (0x100, 255));
        assert_eq!(enc(255 * 0x100 + 1), (0x400, 64));
        assert_eq!(enc(1 << 20), (0x4000, 64));
        assert_eq!(enc(255 * 0x10000), (0x10000, 255));
        assert_eq!(
            choose_block_encoding(255 * 0x10000)
                .unwrap()
                .ladder_index,
            4
        );
    }

    #[test]
    fn test_choose_block_encoding_too_large() {
        // 16 MiB needs 256 blocks of the largest size.
        for size in [16_777_216, 300 * 65536] {
            assert!(matches!(
                choose_block_encoding(size),
                Err(Error::FileTooLarge { size: s, .. }) if s == size
            ));
        }
    }

    #[test]
    fn test_open_flags() {
        let part = FilePart::new("/a", vec![0; 10000]);
        let e = choose_block_encoding(part.target_size()).unwrap();
        assert_eq!(open_flags(&part, &e).unwrap(), OpenFlags(0x3028));

        let part = FilePart::new("/b", vec![0; 0x20000])
            .with_signature(vec![0; SIGNATURE_LEN])
            .with_fail_safe(true);
        let e = choose_block_encoding(part.target_size()).unwrap();
        let flags = open_flags(&part, &e).unwrap();
        assert!(flags.contains(OpenFlags::SECURE | OpenFlags::FAIL_SAFE));
        assert_eq!(flags.bits() & 0xfff, 0x180);
    }

    #[test]
    fn test_open_flags_at_ladder_boundaries() {
        // (size, low 12 bits): last size that fits a rung, then one past it.
        for (size, low) in [
            (255 * 0x100, 0x0ff),
            (255 * 0x100 + 1, 0x140),
            (0x10000, 0x140),
            (255 * 0x400, 0x1ff),
            (255 * 0x400 + 1, 0x240),
        ] {
            let part = FilePart::new("/edge", vec![0; size]);
            let e = choose_block_encoding(part.target_size()).unwrap();
            let flags = open_flags(&part, &e).unwrap();
            assert_eq!(flags.bits(), OpenFlags::CREATE_IF_NOT_EXIST | low, "size {size:#x}");
        }
    }

    fn script_upload(port: &mut MockPort, chunks: usize) {
        port.queue(&ACK);
        port.queue(&[0x12, 0x34, 0x56, 0x78]);
        for _ in 0..=chunks {
            port.queue_status(Status::Ok.code());
        }
    }

    #[test]
    fn test_upload_chunks_and_offsets() {
        let mut port = MockPort::new();
        script_upload(&mut port, 3);
        let mut rc = RomClient::new(port, ChipFamily::Cc32xx);

        let data: Vec<u8> = (0..10_000u32)
            .map(|i| (i % 251) as u8)
            .collect();
        let part = FilePart::new("/sys/mcuimg.bin", data.clone());
        let mut seen = Vec::new();
        rc.upload_file(&part, &mut |done, total| seen.push((done, total)))
            .unwrap();

        let sent = rc.port().sent_packets();
        assert_eq!(sent[0][0], Command::StartUpload.opcode());
        let mut open = vec![0x21, 0x00, 0x00, 0x30, 0x28, 0, 0, 0, 0];
        open.extend_from_slice(b"/sys/mcuimg.bin");
        open.extend_from_slice(&[0, 0]);
        assert_eq!(sent[0], open);

        let chunks: Vec<&Vec<u8>> = sent
            .iter()
            .filter(|p| p[0] == Command::UploadChunk.opcode())
            .collect();
        assert_eq!(chunks.len(), 3);
        let offsets: Vec<u32> = chunks
            .iter()
            .map(|c| BigEndian::read_u32(&c[1..5]))
            .collect();
        assert_eq!(offsets, vec![0, 4096, 8192]);
        assert_eq!(chunks[2].len() - 5, 1808);
        assert_eq!(&chunks[1][5..], &data[4096..8192]);

        let fin = sent
            .last()
            .unwrap();
        assert_eq!(fin, &vec![Command::GetStatus.opcode()]);
        assert_eq!(sent[sent.len() - 2], vec![Command::FinishUpload.opcode()]);

        assert_eq!(seen, vec![(4096, 10_000), (8192, 10_000), (10_000, 10_000)]);
        assert_eq!(
            rc.port().timeouts,
            vec![
                std::time::Duration::from_secs(10),
                std::time::Duration::from_secs(1)
            ]
        );
        assert!(rc.port().is_drained());
    }

    #[test]
    fn test_upload_signed_finalize() {
        let mut port = MockPort::new();
        script_upload(&mut port, 1);
        let mut rc = RomClient::new(port, ChipFamily::Cc32xx);

        let sig = vec![0xA5; SIGNATURE_LEN];
        let part = FilePart::new("/cert", vec![1; 100]).with_signature(sig.clone());
        rc.upload_file(&part, &mut |_, _| {})
            .unwrap();

        let sent = rc.port().sent_packets();
        let flags = BigEndian::read_u32(&sent[0][1..5]);
        assert!(OpenFlags(flags).contains(OpenFlags::SECURE));
        let fin = &sent[sent.len() - 2];
        assert_eq!(fin[0], Command::FinishUpload.opcode());
        assert_eq!(fin.len(), 1 + SIGNATURE_PADDING + SIGNATURE_LEN);
        assert!(fin[1..=SIGNATURE_PADDING]
            .iter()
            .all(|&b| b == 0));
        assert_eq!(&fin[1 + SIGNATURE_PADDING..], sig.as_slice());
    }

    #[test]
    fn test_short_signature_rejected_before_sending() {
        let mut rc = RomClient::new(MockPort::new(), ChipFamily::Cc32xx);
        let part = FilePart::new("/cert", vec![1; 100]).with_signature(vec![0; 128]);

        let err = rc
            .upload_file(&part, &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSignatureLength { len: 128, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Upload);
        assert!(
            rc.port()
                .writes
                .is_empty()
        );
    }

    #[test]
    fn test_too_large_rejected_before_sending() {
        let mut rc = RomClient::new(MockPort::new(), ChipFamily::Cc32xx);
        let part = FilePart::new("/huge", vec![]).with_alloc_size(300 * 65536);

        let err = rc
            .upload_file(&part, &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { ref name, .. } if name == "/huge"));
        assert!(
            rc.port()
                .writes
                .is_empty()
        );
    }

    #[test]
    fn test_chunk_failure_reports_offset() {
        let mut port = MockPort::new();
        port.queue(&ACK);
        port.queue(&[0, 0, 0, 1]);
        port.queue_status(Status::Ok.code());
        port.queue_status(Status::FlashFail.code());
        let mut rc = RomClient::new(port, ChipFamily::Cc32xx);

        let part = FilePart::new("/data", vec![0; 3 * CHUNK_SIZE]);
        let err = rc
            .upload_file(&part, &mut |_, _| {})
            .unwrap_err();
        match &err {
            Error::ChunkFailed { name, offset, source } => {
                assert_eq!(name, "/data");
                assert_eq!(*offset, 4096);
                assert!(matches!(
                    **source,
                    Error::CommandFailed {
                        command: Command::UploadChunk,
                        status: Status::FlashFail
                    }
                ));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "/data: write failed @ 4096");
        assert!(std::error::Error::source(&err).is_some());
        // No third chunk and no finalize.
        assert_eq!(
            rc.port()
                .sent_opcodes()
                .iter()
                .filter(|&&op| op == 0x24 || op == 0x22)
                .count(),
            2
        );
    }

    #[test]
    fn test_open_failure() {
        let mut port = MockPort::new();
        port.queue(&ACK);
        port.eof_when_empty = true;
        let mut rc = RomClient::new(port, ChipFamily::Cc32xx);

        let err = rc
            .upload_file(&FilePart::new("/x", vec![1]), &mut |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::OpenFailed { .. }));
        assert!(err.is_eof());
    }
}

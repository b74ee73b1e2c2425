//! Boot ROM command/status client.
//!
//! Query commands answer with a packet. Mutating commands answer with nothing
//! but an ACK, and their outcome is fetched with a follow-up `GetStatus`;
//! [`RomClient::command_with_status`] is the only path they take.

use {
    crate::{
        error::{Error, Result, ResultExt},
        port::Port,
        protocol::{
            Command, DeviceInfo, MacAddress, Status, StorageBitmap, StorageId, StorageInfo,
            Transport, VersionInfo,
        },
        target::chip::ChipFamily,
    },
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
    log::{debug, info, warn},
    std::time::Duration,
};

/// SLFS format granularity.
pub const FS_BLOCK_SIZE: u32 = 0x1000;

/// Largest data slice in one `RawStorageWrite`.
pub const RAW_WRITE_SIZE: usize = 0x1000 - 0x10;

/// Largest data slice in one `UploadImage`.
pub const IMAGE_WRITE_SIZE: usize = 0x1000;

/// Read timeouts per protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Opening a file (the ROM may erase blocks first).
    pub open: Duration,
    /// Steady-state chunk transfer.
    pub chunk: Duration,
    /// Formatting SLFS.
    pub format: Duration,
    /// Deleting a file.
    pub erase: Duration,
    /// Programming a boot image slice.
    pub image: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(10),
            chunk: Duration::from_secs(1),
            format: Duration::from_secs(10),
            erase: Duration::from_secs(1),
            image: Duration::from_secs(25),
        }
    }
}

/// Typed request/response client for one boot ROM.
pub struct RomClient<P: Port> {
    transport: Transport<P>,
    family: ChipFamily,
    timeouts: Timeouts,
}

impl<P: Port> RomClient<P> {
    /// Create a client over an open port.
    pub fn new(port: P, family: ChipFamily) -> Self {
        Self {
            transport: Transport::new(port),
            family,
            timeouts: Timeouts::default(),
        }
    }

    /// Override the phase timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Chip family profile in use.
    pub fn family(&self) -> ChipFamily {
        self.family
    }

    /// Phase timeouts in use.
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Packet transport.
    pub fn transport_mut(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }

    /// Borrow the underlying port.
    pub fn port(&self) -> &P {
        self.transport
            .port()
    }

    /// Release the underlying port.
    pub fn into_port(self) -> P {
        self.transport
            .into_inner()
    }

    /// Close the channel.
    pub fn close(&mut self) -> Result<()> {
        self.transport
            .close()
    }

    fn ensure_supported(&self, command: Command) -> Result<()> {
        if !self
            .family
            .supports(command)
        {
            return Err(Error::Unsupported(format!(
                "{command} is not implemented by the {} boot loader",
                self.family
            )));
        }
        Ok(())
    }

    /// Send a command and wait for its ACK.
    pub fn send(&mut self, command: Command, args: &[u8]) -> Result<()> {
        self.ensure_supported(command)?;
        self.transport
            .send_command(command, args)
    }

    /// Send a command and receive its response packet.
    fn query(&mut self, command: Command, args: &[u8]) -> Result<Vec<u8>> {
        self.send(command, args)
            .with_context(|| command.to_string())?;
        self.transport
            .recv_packet()
            .with_context(|| command.to_string())
    }

    /// Fetch the status of the previous command.
    pub fn get_status(&mut self) -> Result<Status> {
        let payload = self.query(Command::GetStatus, &[])?;
        let byte = *payload
            .first()
            .ok_or_else(|| Error::MalformedResponse {
                command: Command::GetStatus,
                reason: "empty status packet".into(),
            })?;
        Status::from_byte(byte).ok_or(Error::UnrecognizedStatus(byte))
    }

    /// Send a mutating command and check its status.
    ///
    /// The status is polled even when the ACK was missing or garbled, since
    /// the ROM may still have executed the command; only inbound EOF skips
    /// the poll.
    pub fn command_with_status(&mut self, command: Command, args: &[u8]) -> Result<()> {
        self.ensure_supported(command)?;
        if let Err(e) = self
            .transport
            .send_command(command, args)
        {
            if e.is_eof() {
                return Err(e.context(format!("{command}: failed to send")));
            }
            warn!("{command}: {e}, checking status anyway");
        }
        let status = self
            .get_status()
            .with_context(|| format!("{command}: failed to get status"))?;
        if !status.is_ok() {
            return Err(Error::CommandFailed { command, status });
        }
        Ok(())
    }

    /// Fetch version information.
    pub fn get_version_info(&mut self) -> Result<VersionInfo> {
        let payload = self.query(Command::GetVersionInfo, &[])?;
        let vi = VersionInfo::decode(&payload, self.family.version_byte_order())?;
        debug!("VersionInfo: {vi:x?}");
        Ok(vi)
    }

    /// Fetch the storage bitmap.
    ///
    /// The ROM answers with one raw byte rather than a packet.
    pub fn get_storage_list(&mut self) -> Result<StorageBitmap> {
        self.send(Command::GetStorageList, &[])
            .context("GetStorageList")?;
        let byte = self
            .transport
            .read_exact_n(1)
            .context("failed to read GetStorageList response")?;
        let sb = StorageBitmap(byte[0]);
        debug!("Storage: {sb}");
        Ok(sb)
    }

    /// Fetch the geometry of one storage device.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn get_storage_info(&mut self, id: StorageId) -> Result<StorageInfo> {
        let mut args = Vec::with_capacity(4);
        args.write_u32::<BigEndian>(id.id())
            .unwrap();
        let payload = self.query(Command::GetStorageInfo, &args)?;
        let si = StorageInfo::decode(&payload)?;
        debug!("StorageInfo {id}: {si:?}");
        Ok(si)
    }

    /// Fetch filesystem geometry and free space.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let payload = self.query(Command::GetDeviceInfo, &[])?;
        let di = DeviceInfo::decode(&payload)?;
        debug!("DeviceInfo: {di:?}");
        Ok(di)
    }

    /// Fetch the factory MAC address.
    pub fn get_mac_address(&mut self) -> Result<MacAddress> {
        // The ROM expects a zero word here.
        let payload = self.query(Command::GetMacAddress, &[0, 0, 0, 0])?;
        MacAddress::decode(&payload)
    }

    /// Ask the primary loader to hand the UART over to the NWP loader.
    ///
    /// `delay_ticks` is the switch delay in ROM ticks (26_666_667 is about one
    /// second). The ROM only ACKs this command.
    pub fn switch_uart_to_apps_mcu(&mut self, delay_ticks: u32) -> Result<()> {
        self.send(Command::SwitchUartToAppsMcu, &delay_ticks.to_be_bytes())
            .context("failed to switch UART to apps CPU")
    }

    /// Format SLFS to hold `size` bytes.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn format_slfs(&mut self, size: u32) -> Result<()> {
        info!("Formatting SLFS ({size} bytes)");
        let mut args = Vec::with_capacity(20);
        for word in [2, size / FS_BLOCK_SIZE, 0, 0, 2] {
            args.write_u32::<BigEndian>(word)
                .unwrap();
        }
        self.transport
            .set_read_timeout(self.timeouts.format)?;
        self.command_with_status(Command::FormatSlfs, &args)
    }

    /// Delete a file from SLFS.
    pub fn erase_file(&mut self, name: &str) -> Result<()> {
        debug!("Erasing {name}");
        let mut args = Vec::with_capacity(5 + name.len());
        args.extend_from_slice(&[0, 0, 0, 0]);
        args.extend_from_slice(name.as_bytes());
        args.push(0);
        self.transport
            .set_read_timeout(self.timeouts.erase)?;
        self.command_with_status(Command::EraseFile, &args)
            .with_context(|| format!("{name}: erase failed"))
    }

    /// Write raw bytes to a storage device at `offset`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn raw_storage_write(&mut self, id: StorageId, offset: u32, data: &[u8]) -> Result<()> {
        let mut pos = offset;
        for slice in data.chunks(RAW_WRITE_SIZE) {
            #[allow(clippy::cast_possible_truncation)] // At most RAW_WRITE_SIZE
            let len = slice.len() as u32;
            let mut args = Vec::with_capacity(12 + slice.len());
            args.write_u32::<BigEndian>(id.id())
                .unwrap();
            args.write_u32::<BigEndian>(pos)
                .unwrap();
            args.write_u32::<BigEndian>(len)
                .unwrap();
            args.extend_from_slice(slice);
            debug!("Raw write to {id}: {len} @ {pos}");
            self.command_with_status(Command::RawStorageWrite, &args)
                .with_context(|| format!("{id} write failed: {len} @ {pos}"))?;
            pos += len;
        }
        Ok(())
    }

    /// Erase `count` blocks of a storage device starting at block `start`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn raw_storage_erase_blocks(
        &mut self,
        id: StorageId,
        start: u32,
        count: u32,
    ) -> Result<()> {
        let mut args = Vec::with_capacity(12);
        for word in [id.id(), start, count] {
            args.write_u32::<BigEndian>(word)
                .unwrap();
        }
        debug!("Raw erase {id}: {count} @ {start}");
        self.command_with_status(Command::RawStorageErase, &args)
            .with_context(|| format!("{id} erase failed ({count} @ {start})"))
    }

    /// Erase every block touched by `len` bytes at `offset`.
    pub fn raw_storage_erase_bytes(&mut self, id: StorageId, offset: u32, len: u32) -> Result<()> {
        let stop = offset
            .checked_add(len)
            .ok_or_else(|| Error::Config(format!("{len} bytes @ {offset} overflows {id}")))?;
        let si = self
            .get_storage_info(id)
            .context("failed to get storage info")?;
        let bs = u32::from(si.block_size);
        if bs == 0 {
            return Err(Error::MalformedResponse {
                command: Command::GetStorageInfo,
                reason: format!("{id} reports a zero block size"),
            });
        }
        let start = offset / bs;
        let end = stop.div_ceil(bs);
        debug!("Erase {id} blocks {start}-{end}");
        self.raw_storage_erase_blocks(id, start, end - start)
    }

    /// Erase the affected blocks, then write.
    pub fn raw_erase_and_write(&mut self, id: StorageId, offset: u32, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len())
            .map_err(|_| Error::Config(format!("{} bytes is too much for {id}", data.len())))?;
        self.raw_storage_erase_bytes(id, offset, len)?;
        self.raw_storage_write(id, offset, data)
    }

    /// Jump to code previously written to RAM.
    pub fn execute_from_ram(&mut self) -> Result<()> {
        self.send(Command::ExecuteFromRam, &[])
            .context("ExecuteFromRAM")?;
        // Newer loaders send a second ACK once the jump is done.
        self.transport
            .recv_ack()
            .context("ExecuteFromRAM")
    }

    /// Program a raw boot image.
    ///
    /// The last slice triggers extraction, which can outlast the longest read
    /// timeout the ROM tolerates, so a missing ACK there is waited for once more.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn upload_image(
        &mut self,
        data: &[u8],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        self.ensure_supported(Command::UploadImage)?;
        self.transport
            .set_read_timeout(self.timeouts.image)?;
        let total = data.len();
        let mut offset = 0;
        for slice in data.chunks(IMAGE_WRITE_SIZE) {
            let last = offset + slice.len() == total;
            let mut args = Vec::with_capacity(8 + slice.len());
            // Key size.
            args.write_u16::<BigEndian>(0)
                .unwrap();
            #[allow(clippy::cast_possible_truncation)] // At most IMAGE_WRITE_SIZE
            let len = slice.len() as u16;
            args.write_u16::<BigEndian>(len)
                .unwrap();
            // Flags.
            args.write_u32::<BigEndian>(0)
                .unwrap();
            args.extend_from_slice(slice);
            debug!("Image write: {} @ {offset}", slice.len());
            if last {
                info!("Upload finished, image is being extracted...");
            }

            let sent = match self
                .transport
                .send_command(Command::UploadImage, &args)
            {
                Err(_) if last => self
                    .transport
                    .recv_ack(),
                other => other,
            };
            sent.with_context(|| format!("image write failed: {} @ {offset}", slice.len()))?;

            let status = self
                .transport
                .read_exact_n(4)
                .context("failed to read image status")?;
            let e0 = BigEndian::read_i16(&status[0..2]);
            let e1 = BigEndian::read_u16(&status[2..4]);
            if e0 < 0 {
                return Err(Error::ImageFailed { offset, e0, e1 });
            }
            offset += slice.len();
            progress(offset, total);
        }
        Ok(())
    }
}

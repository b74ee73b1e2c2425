//! [`Flasher`] implementation over a boot ROM session.

use {
    crate::{
        device::{ControlGuard, DeviceControl},
        error::{Error, Result},
        image::part::{FilePart, PartCatalog},
        port::Port,
        protocol::Command,
        target::{
            chip::{ChipFamily, DeviceReport, Flasher},
            negotiate::{ConnectConfig, LinkState, Negotiator, Session},
            rom::{RomClient, Timeouts},
        },
    },
    log::{info, warn},
    std::{io, mem},
};

enum Link<P: Port> {
    Disconnected(RomClient<P>),
    Connected(Session<P>),
    Closed,
}

/// Flasher for CC3200 and CC32xx boot ROMs.
pub struct RomFlasher<P: Port> {
    link: Link<P>,
    control: Option<ControlGuard<Box<dyn DeviceControl>>>,
    connect: ConnectConfig,
    last_state: LinkState,
}

impl<P: Port> RomFlasher<P> {
    /// Create a flasher over an open port.
    pub fn new(port: P, family: ChipFamily) -> Self {
        Self {
            link: Link::Disconnected(RomClient::new(port, family)),
            control: None,
            connect: ConnectConfig::default(),
            last_state: LinkState::Idle,
        }
    }

    /// Use `control` to reset the board into its boot ROM and back.
    #[must_use]
    pub fn with_control(mut self, control: Box<dyn DeviceControl>) -> Self {
        self.control = Some(ControlGuard::new(control));
        self
    }

    /// Override synchronization retries and delays.
    #[must_use]
    pub fn with_connect_config(mut self, config: ConnectConfig) -> Self {
        self.connect = config;
        self
    }

    /// Override the phase timeouts. Only effective before connecting.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.link = match self.link {
            Link::Disconnected(client) => Link::Disconnected(client.with_timeouts(timeouts)),
            other => other,
        };
        self
    }

    /// The negotiated session, if connected.
    pub fn session(&self) -> Option<&Session<P>> {
        match &self.link {
            Link::Connected(session) => Some(session),
            _ => None,
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session<P>> {
        match &mut self.link {
            Link::Connected(session) => Ok(session),
            Link::Disconnected(_) => Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected to a boot loader",
            ))),
            Link::Closed => Err(closed()),
        }
    }
}

fn closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "flasher is closed",
    ))
}

impl<P: Port> Flasher for RomFlasher<P> {
    fn connect(&mut self) -> Result<()> {
        let mut client = match mem::replace(&mut self.link, Link::Closed) {
            Link::Disconnected(client) => client,
            connected @ Link::Connected(_) => {
                self.link = connected;
                return Ok(());
            },
            Link::Closed => return Err(closed()),
        };

        info!("Connecting to {} boot loader...", client.family());
        let mut negotiator = Negotiator::new(self.connect);
        let dc = self
            .control
            .as_mut()
            .map(|guard| guard.control() as &mut dyn DeviceControl);
        let outcome = negotiator.negotiate(&mut client, dc);
        self.last_state = negotiator.state();
        match outcome {
            Ok(link) => {
                self.link = Link::Connected(Session::new(client, negotiator, link));
                Ok(())
            },
            Err(e) => {
                self.link = Link::Disconnected(client);
                Err(e)
            },
        }
    }

    fn state(&self) -> LinkState {
        match &self.link {
            Link::Connected(session) => session.state(),
            _ => self.last_state,
        }
    }

    fn info(&mut self) -> Result<DeviceReport> {
        let session = self.session_mut()?;
        let chip = session.chip();
        let version = *session.version();
        let primary_version = session
            .primary_version()
            .copied();
        let storage = session.storage();

        let client = session.client_mut();
        let family = client.family();
        let mac = if family.supports(Command::GetMacAddress) {
            Some(client.get_mac_address()?)
        } else {
            None
        };
        let device_info = if family.supports(Command::GetDeviceInfo) {
            Some(client.get_device_info()?)
        } else {
            None
        };

        Ok(DeviceReport {
            chip,
            version,
            primary_version,
            storage,
            mac,
            device_info,
        })
    }

    fn flash_catalog(
        &mut self,
        catalog: &dyn PartCatalog,
        progress: &mut dyn FnMut(&str, usize, usize),
    ) -> Result<()> {
        let client = self
            .session_mut()?
            .client_mut();

        // Every part is loaded before the first byte goes out.
        let files = catalog
            .sorted_parts()
            .iter()
            .map(|info| FilePart::load(catalog, info))
            .collect::<Result<Vec<_>>>()?;

        for (i, file) in files
            .iter()
            .enumerate()
        {
            info!(
                "Writing {} ({} bytes) [{}/{}]",
                file.name,
                file.data
                    .len(),
                i + 1,
                files.len()
            );
            client.upload_file(file, &mut |done, total| progress(&file.name, done, total))?;
        }

        info!("Flashing completed successfully!");
        Ok(())
    }

    fn format(&mut self, size: u32) -> Result<()> {
        self.session_mut()?
            .client_mut()
            .format_slfs(size)
    }

    fn erase_file(&mut self, name: &str) -> Result<()> {
        self.session_mut()?
            .client_mut()
            .erase_file(name)
    }

    fn boot_firmware(&mut self) -> Result<()> {
        if matches!(self.link, Link::Closed) {
            return Err(closed());
        }
        match self.control.as_mut() {
            Some(guard) => guard
                .control()
                .boot_firmware(),
            None => {
                warn!("No device control; reset the board to start the firmware");
                Ok(())
            },
        }
    }

    fn close(&mut self) {
        let mut client = match mem::replace(&mut self.link, Link::Closed) {
            Link::Disconnected(client) => client,
            Link::Connected(session) => session.into_client(),
            Link::Closed => return,
        };
        if let Err(e) = client.close() {
            warn!("Failed to close port: {e}");
        }
        if let Some(mut guard) = self
            .control
            .take()
        {
            if let Err(e) = guard.close() {
                warn!("Failed to release device control: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            device::fake::CountingControl,
            image::part::{MemoryCatalog, PartInfo, PartType},
            port::mock::MockPort,
            protocol::{ACK, Endianness, Status},
            target::{
                chip::ChipType,
                negotiate::script::{identify, version_payload},
            },
        },
    };

    fn connected_port() -> MockPort {
        let mut port = MockPort::new();
        let version = version_payload(Endianness::Big, 0x0400_0000, 0x18);
        port.on_next_break(&identify(&version, 0x86));
        port
    }

    fn flasher(port: MockPort) -> RomFlasher<MockPort> {
        RomFlasher::new(port, ChipFamily::Cc32xx).with_connect_config(ConnectConfig::instant())
    }

    fn port_mut(f: &mut RomFlasher<MockPort>) -> &mut MockPort {
        match &mut f.link {
            Link::Disconnected(client) => client
                .transport_mut()
                .port_mut(),
            Link::Connected(session) => session
                .client_mut()
                .transport_mut()
                .port_mut(),
            Link::Closed => panic!("flasher is closed"),
        }
    }

    fn start_upload_names(port: &MockPort) -> Vec<String> {
        port.sent_packets()
            .iter()
            .filter(|p| p[0] == Command::StartUpload.opcode())
            .map(|p| String::from_utf8_lossy(&p[9..p.len() - 2]).into_owned())
            .collect()
    }

    #[test]
    fn test_operations_require_connect() {
        let mut f = flasher(MockPort::new());
        assert!(f
            .format(0x10000)
            .is_err());
        assert_eq!(f.state(), LinkState::Idle);
    }

    #[test]
    fn test_connect_failure_keeps_port() {
        let mut f = flasher(connected_port()).with_connect_config(
            ConnectConfig::instant().with_attempts(1),
        );
        // Drop the scripted reply so the only attempt times out.
        port_mut(&mut f)
            .on_break
            .clear();
        assert!(matches!(f.connect(), Err(Error::Unreachable { attempts: 1 })));
        assert_eq!(f.state(), LinkState::Unreachable);
        assert!(matches!(f.link, Link::Disconnected(_)));
    }

    #[test]
    fn test_flash_catalog_in_order() {
        let mut f = flasher(connected_port());
        f.connect()
            .unwrap();
        assert_eq!(f.state(), LinkState::Ready);
        let port = port_mut(&mut f);
        for _ in 0..2 {
            port.queue(&ACK);
            port.queue(&[0, 0, 0, 0]);
            port.queue_status(Status::Ok.code()); // chunk
            port.queue_status(Status::Ok.code()); // finish
        }

        let mut catalog = MemoryCatalog::new();
        catalog
            .add(PartInfo::new("/sys/app.bin", PartType::App), vec![1; 10])
            .add(
                PartInfo::new("/sys/servicepack.ucf", PartType::ServicePack),
                vec![2; 20],
            );
        let mut seen = Vec::new();
        f.flash_catalog(&catalog, &mut |name, done, total| {
            seen.push((name.to_string(), done, total));
        })
        .unwrap();

        let session = f
            .session()
            .unwrap();
        assert_eq!(
            start_upload_names(
                session
                    .client()
                    .port()
            ),
            vec!["/sys/servicepack.ucf", "/sys/app.bin"]
        );
        assert_eq!(
            seen,
            vec![
                ("/sys/servicepack.ucf".to_string(), 20, 20),
                ("/sys/app.bin".to_string(), 10, 10)
            ]
        );
    }

    #[test]
    fn test_bad_part_sends_nothing() {
        struct Broken;
        impl PartCatalog for Broken {
            fn parts(&self) -> Vec<PartInfo> {
                vec![
                    PartInfo::new("/good", PartType::App),
                    PartInfo::new("/bad", PartType::SlFile),
                ]
            }
            fn payload(&self, part: &PartInfo) -> Result<Vec<u8>> {
                match part
                    .name
                    .as_str()
                {
                    "/good" => Ok(vec![0; 4]),
                    _ => Err(Error::Io(io::Error::from(io::ErrorKind::NotFound))),
                }
            }
            fn signature(&self, _: &PartInfo) -> Result<Option<Vec<u8>>> {
                Ok(None)
            }
        }

        let mut f = flasher(connected_port());
        f.connect()
            .unwrap();
        let err = f
            .flash_catalog(&Broken, &mut |_, _, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPart { ref name, .. } if name == "/bad"));
        let port = f
            .session()
            .unwrap()
            .client()
            .port();
        assert!(start_upload_names(port).is_empty());
    }

    #[test]
    fn test_info_cc32xx() {
        let mut f = flasher(connected_port());
        f.connect()
            .unwrap();
        let port = port_mut(&mut f);
        port.queue(&ACK);
        port.queue_packet(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        port.queue(&ACK);
        port.queue_packet(&[0, 0x10, 0, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x20]);

        let report = f
            .info()
            .unwrap();
        assert_eq!(report.chip, ChipType::Cc3220S);
        assert_eq!(
            report
                .mac
                .unwrap()
                .to_string(),
            "00:11:22:33:44:55"
        );
        assert_eq!(
            report
                .device_info
                .unwrap()
                .fs_free_blocks,
            0x20
        );
        assert!(report
            .primary_version
            .is_none());
    }

    #[test]
    fn test_close_releases_control_once() {
        let dc = CountingControl::new();
        let mut f = flasher(connected_port()).with_control(Box::new(dc.clone()));
        f.connect()
            .unwrap();
        assert_eq!(dc.counts().enter, 1);
        f.boot_firmware()
            .unwrap();
        f.close();
        f.close();
        drop(f);
        assert_eq!(dc.counts().boot, 1);
        assert_eq!(dc.counts().close, 1);
    }

    #[test]
    fn test_closed_flasher_fails() {
        let mut f = flasher(MockPort::new());
        f.close();
        assert!(f
            .connect()
            .is_err());
        assert!(f
            .erase_file("/x")
            .is_err());
        assert!(f
            .boot_firmware()
            .is_err());
    }
}

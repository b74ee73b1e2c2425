//! Boot loader session negotiation.
//!
//! ## Link States
//!
//! ```text
//!  Idle ──► Synchronizing ──► Identified ──► Ready
//!                │                 │           ▲
//!                ▼                 ▼           │
//!           Unreachable      HandoffInFlight ──┘
//!                                  │
//!                                  ▼
//!                            Synchronizing (no device control)
//! ```
//!
//! Synchronization holds a break condition on the line while the device is
//! reset; the ROM answers a break seen at reset with a bare ACK. On a CC3200
//! the primary loader is then asked to pass the UART to the network
//! processor's loader, which is synchronized the same way.

use {
    crate::{
        device::DeviceControl,
        error::{Error, Result},
        port::Port,
        protocol::{StorageBitmap, VersionInfo},
        target::{chip::ChipType, rom::RomClient},
    },
    log::{debug, info, warn},
    std::{fmt, thread, time::Duration},
};

/// Default number of synchronization attempts.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// UART switch delay in ROM ticks (about one second).
pub const HANDOVER_DELAY_TICKS: u32 = 26_666_667;

/// Where a [`Negotiator`] is in bringing up a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Nothing attempted yet.
    #[default]
    Idle,
    /// Asserting break and waiting for the ROM's ACK.
    Synchronizing,
    /// Version fetched and chip classified.
    Identified,
    /// UART handover to the NWP loader in progress.
    HandoffInFlight,
    /// Storage checked; commands may be issued.
    Ready,
    /// Every synchronization attempt failed.
    Unreachable,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Synchronizing => "synchronizing",
            Self::Identified => "identified",
            Self::HandoffInFlight => "handoff in flight",
            Self::Ready => "ready",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// Retry counts and delays for synchronization and handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectConfig {
    /// Synchronization attempts before giving up.
    pub attempts: u32,
    /// Delay between reset and reading the ACK.
    pub settle_delay: Duration,
    /// ACK read timeout; the family default when `None`.
    pub read_timeout: Option<Duration>,
    /// Delay passed to `SwitchUartToAppsMcu`, in ROM ticks.
    pub handover_delay_ticks: u32,
    /// Wait after the UART switch before synchronizing again.
    pub handover_settle: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            settle_delay: Duration::from_millis(200),
            read_timeout: None,
            handover_delay_ticks: HANDOVER_DELAY_TICKS,
            handover_settle: Duration::from_millis(1200),
        }
    }
}

impl ConnectConfig {
    /// Default counts with every delay set to zero.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            handover_settle: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Set the number of synchronization attempts.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the post-reset settle delay.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Override the family's ACK read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the wait after the UART switch.
    #[must_use]
    pub fn with_handover_settle(mut self, delay: Duration) -> Self {
        self.handover_settle = delay;
        self
    }
}

/// What negotiation learned about the boot loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    /// Classified chip.
    pub chip: ChipType,
    /// Version of the loader commands go to.
    pub version: VersionInfo,
    /// Version of the primary loader, once a handover happened.
    pub primary_version: Option<VersionInfo>,
    /// Storage bitmap of the loader commands go to.
    pub storage: StorageBitmap,
    /// Whether the UART was handed over to the NWP loader.
    pub handed_over: bool,
}

/// Drives a [`RomClient`] from reset to a usable boot loader.
#[derive(Debug, Clone, Default)]
pub struct Negotiator {
    config: ConnectConfig,
    state: LinkState,
}

impl Negotiator {
    /// Create a negotiator.
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            config,
            state: LinkState::Idle,
        }
    }

    /// Retry and delay settings.
    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Break-synchronize with the boot ROM.
    ///
    /// Returns the 1-based attempt that got an ACK. The break is released
    /// after every attempt, successful or not.
    pub fn synchronize<P: Port>(
        &mut self,
        client: &mut RomClient<P>,
        mut dc: Option<&mut dyn DeviceControl>,
    ) -> Result<u32> {
        let timeout = self
            .config
            .read_timeout
            .unwrap_or_else(|| {
                client
                    .family()
                    .connect_read_timeout()
            });
        let attempts = self
            .config
            .attempts;
        self.state = LinkState::Synchronizing;

        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!("Synchronization attempt {attempt}/{attempts}");
            }
            let dc = dc
                .as_mut()
                .map(|d| &mut **d as &mut dyn DeviceControl);
            let outcome = self.try_synchronize(client, dc, timeout);
            let released = client
                .transport_mut()
                .set_break(false);
            match (outcome, released) {
                (Ok(()), Ok(())) => {
                    info!("Boot loader answered (attempt {attempt}/{attempts})");
                    return Ok(attempt);
                },
                (Err(e), _) | (Ok(()), Err(e)) => {
                    warn!("No ACK (attempt {attempt}/{attempts})");
                    debug!("Attempt {attempt} failed: {e}");
                },
            }
        }

        self.state = LinkState::Unreachable;
        Err(Error::Unreachable { attempts })
    }

    fn try_synchronize<P: Port>(
        &self,
        client: &mut RomClient<P>,
        dc: Option<&mut (dyn DeviceControl + '_)>,
        timeout: Duration,
    ) -> Result<()> {
        let transport = client.transport_mut();
        transport.set_read_timeout(timeout)?;
        transport.set_break(true)?;
        transport.clear_buffers()?;
        if let Some(dc) = dc {
            dc.enter_bootloader()?;
        }
        thread::sleep(
            self.config
                .settle_delay,
        );
        client
            .transport_mut()
            .recv_ack()
    }

    /// Synchronize, identify the chip, hand over to the NWP loader if the
    /// family requires it, and check the storage bitmap.
    pub fn negotiate<P: Port>(
        &mut self,
        client: &mut RomClient<P>,
        dc: Option<&mut dyn DeviceControl>,
    ) -> Result<LinkInfo> {
        self.synchronize(client, dc)?;

        let family = client.family();
        let version = client.get_version_info()?;
        let chip = family.classify(&version)?;
        self.state = LinkState::Identified;
        info!(
            "Found {chip}, boot loader {}",
            version.bootloader_version_string()
        );

        let mut link = LinkInfo {
            chip,
            version,
            primary_version: None,
            storage: StorageBitmap::default(),
            handed_over: false,
        };

        if family.needs_handover(&version) {
            if let Some(min) = family.min_bootloader() {
                if version.bootloader < min {
                    return Err(Error::UnsupportedBootloader(
                        version.bootloader_version_string(),
                    ));
                }
            }
            self.handover(client, &mut link)?;
        } else {
            link.storage = self.check_storage(client)?;
        }

        self.state = LinkState::Ready;
        Ok(link)
    }

    /// Negotiate and wrap the client in a [`Session`].
    pub fn establish<P: Port>(
        mut self,
        mut client: RomClient<P>,
        dc: Option<&mut dyn DeviceControl>,
    ) -> Result<Session<P>> {
        let link = self.negotiate(&mut client, dc)?;
        Ok(Session::new(client, self, link))
    }

    /// Pass the UART from the primary loader to the NWP loader.
    pub fn handover<P: Port>(
        &mut self,
        client: &mut RomClient<P>,
        link: &mut LinkInfo,
    ) -> Result<()> {
        if link.handed_over {
            return Err(Error::HandoverAlreadyPerformed);
        }
        self.state = LinkState::HandoffInFlight;
        info!("Switching UART to the NWP boot loader");
        client.switch_uart_to_apps_mcu(
            self.config
                .handover_delay_ticks,
        )?;
        thread::sleep(
            self.config
                .handover_settle,
        );

        self.synchronize(client, None)?;
        let version = client.get_version_info()?;
        info!(
            "NWP boot loader {}",
            version.bootloader_version_string()
        );
        link.primary_version = Some(link.version);
        link.version = version;
        link.handed_over = true;
        link.storage = self.check_storage(client)?;
        self.state = LinkState::Ready;
        Ok(())
    }

    fn check_storage<P: Port>(&self, client: &mut RomClient<P>) -> Result<StorageBitmap> {
        let storage = client.get_storage_list()?;
        if !storage.is_usable() {
            return Err(Error::InvalidStorageConfiguration(storage));
        }
        Ok(storage)
    }
}

/// A negotiated boot loader session. Owns the client and with it the port.
pub struct Session<P: Port> {
    client: RomClient<P>,
    negotiator: Negotiator,
    link: LinkInfo,
}

impl<P: Port> Session<P> {
    /// Assemble a session from an already negotiated client.
    pub fn new(client: RomClient<P>, negotiator: Negotiator, link: LinkInfo) -> Self {
        Self {
            client,
            negotiator,
            link,
        }
    }

    /// Everything learned during negotiation.
    pub fn link(&self) -> &LinkInfo {
        &self.link
    }

    /// Classified chip.
    pub fn chip(&self) -> ChipType {
        self.link
            .chip
    }

    /// Version of the loader in use.
    pub fn version(&self) -> &VersionInfo {
        &self
            .link
            .version
    }

    /// Version of the primary loader, if a handover took place.
    pub fn primary_version(&self) -> Option<&VersionInfo> {
        self.link
            .primary_version
            .as_ref()
    }

    /// Storage bitmap of the loader in use.
    pub fn storage(&self) -> StorageBitmap {
        self.link
            .storage
    }

    /// Whether the NWP handover happened.
    pub fn handed_over(&self) -> bool {
        self.link
            .handed_over
    }

    /// Link state.
    pub fn state(&self) -> LinkState {
        self.negotiator
            .state()
    }

    /// Hand the UART over to the NWP loader. Allowed once per session.
    pub fn switch_to_nwp(&mut self) -> Result<()> {
        self.negotiator
            .handover(&mut self.client, &mut self.link)
    }

    /// Borrow the client.
    pub fn client(&self) -> &RomClient<P> {
        &self.client
    }

    /// Borrow the client mutably.
    pub fn client_mut(&mut self) -> &mut RomClient<P> {
        &mut self.client
    }

    /// End the session, keeping the client.
    pub fn into_client(self) -> RomClient<P> {
        self.client
    }
}


#[cfg(test)]
mod tests {
    use {
        super::{script::*, *},
        crate::{
            device::fake::CountingControl,
            error::ErrorKind,
            port::mock::MockPort,
            protocol::{ACK, Command, Endianness, packet},
            target::{
                ChipFamily,
                chip::{CC3200_MIN_BOOTLOADER, CC3200_NWP_BOOTLOADER},
            },
        },
    };

    fn client(port: MockPort, family: ChipFamily) -> RomClient<MockPort> {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
        RomClient::new(port, family)
    }

    #[test]
    fn test_synchronize_fourth_attempt() {
        let mut port = MockPort::new();
        for _ in 0..3 {
            port.on_next_break(&[]);
        }
        port.on_next_break(&ACK);
        let mut rc = client(port, ChipFamily::Cc32xx);
        let mut dc = CountingControl::new();
        let mut neg = Negotiator::new(ConnectConfig::instant());

        let attempt = neg
            .synchronize(&mut rc, Some(&mut dc))
            .unwrap();
        assert_eq!(attempt, 4);
        assert_eq!(dc.counts().enter, 4);
        assert_eq!(rc.port().breaks, [true, false].repeat(4));
        assert_eq!(rc.port().timeouts, vec![Duration::from_millis(1000); 4]);
        assert_eq!(neg.state(), LinkState::Synchronizing);
    }

    #[test]
    fn test_synchronize_unreachable() {
        let mut rc = client(MockPort::new(), ChipFamily::Cc3200);
        let mut dc = CountingControl::new();
        let mut neg = Negotiator::new(ConnectConfig::instant());

        let err = neg
            .synchronize(&mut rc, Some(&mut dc))
            .unwrap_err();
        assert!(matches!(err, Error::Unreachable { attempts: 5 }));
        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert!(err
            .to_string()
            .contains("SOP2"));
        assert_eq!(dc.counts().enter, 5);
        assert_eq!(
            rc.port()
                .breaks
                .last(),
            Some(&false)
        );
        assert_eq!(rc.port().timeouts[0], Duration::from_millis(200));
        assert_eq!(neg.state(), LinkState::Unreachable);
    }

    #[test]
    fn test_synchronize_eof_counts_as_failed_attempt() {
        let mut port = MockPort::new();
        port.eof_when_empty = true;
        let mut rc = client(port, ChipFamily::Cc3200);
        let mut dc = CountingControl::new();
        let mut neg = Negotiator::new(ConnectConfig::instant());

        let err = neg
            .synchronize(&mut rc, Some(&mut dc))
            .unwrap_err();
        assert!(matches!(err, Error::Unreachable { attempts: 5 }));
        assert!(err
            .to_string()
            .contains("SOP2"));
        assert_eq!(dc.counts().enter, 5);
        assert_eq!(rc.port().breaks, [true, false].repeat(5));
        assert_eq!(neg.state(), LinkState::Unreachable);
    }

    #[test]
    fn test_establish_cc32xx() {
        let mut port = MockPort::new();
        let version = version_payload(Endianness::Big, 0x0400_0000, 0x19);
        port.on_next_break(&identify(&version, 0x86));
        let rc = client(port, ChipFamily::Cc32xx);

        let session = Negotiator::new(ConnectConfig::instant())
            .establish(rc, None)
            .unwrap();
        assert_eq!(session.chip(), ChipType::Cc3220SF);
        assert_eq!(session.storage(), StorageBitmap(0x86));
        assert!(!session.handed_over());
        assert_eq!(session.state(), LinkState::Ready);
        assert_eq!(
            session
                .client()
                .port()
                .sent_opcodes(),
            vec![0x2F, 0x27]
        );
    }

    fn cc3200_handover_port() -> MockPort {
        let mut port = MockPort::new();
        let primary = version_payload(Endianness::Little, CC3200_MIN_BOOTLOADER, 0x10);
        let mut first = ACK.to_vec();
        first.extend_from_slice(&ACK);
        first.extend_from_slice(&packet::encode(&primary).unwrap());
        first.extend_from_slice(&ACK);
        port.on_next_break(&first);
        let nwp = version_payload(Endianness::Little, CC3200_NWP_BOOTLOADER, 0x10);
        port.on_next_break(&identify(&nwp, 0x84));
        port
    }

    #[test]
    fn test_establish_cc3200_handover() {
        let rc = client(cc3200_handover_port(), ChipFamily::Cc3200);
        let mut dc = CountingControl::new();

        let session = Negotiator::new(ConnectConfig::instant())
            .establish(rc, Some(&mut dc))
            .unwrap();
        assert!(session.handed_over());
        assert_eq!(session.chip(), ChipType::Cc3200);
        assert_eq!(session.version().bootloader, CC3200_NWP_BOOTLOADER);
        assert_eq!(
            session
                .primary_version()
                .map(|v| v.bootloader),
            Some(CC3200_MIN_BOOTLOADER)
        );
        // The second synchronization runs without device control.
        assert_eq!(dc.counts().enter, 1);

        let port = session
            .client()
            .port();
        let sent = port.sent_packets();
        let opcodes: Vec<u8> = sent
            .iter()
            .map(|p| p[0])
            .collect();
        assert_eq!(
            opcodes,
            vec![
                Command::GetVersionInfo.opcode(),
                Command::SwitchUartToAppsMcu.opcode(),
                Command::GetVersionInfo.opcode(),
                Command::GetStorageList.opcode(),
            ]
        );
        assert_eq!(sent[1][1..], [0x01, 0x96, 0xE6, 0xAB]);
        assert_eq!(port.breaks, vec![true, false, true, false]);
        assert!(port.is_drained());
    }

    #[test]
    fn test_second_handover_rejected() {
        let rc = client(cc3200_handover_port(), ChipFamily::Cc3200);
        let mut session = Negotiator::new(ConnectConfig::instant())
            .establish(rc, None)
            .unwrap();
        let writes = session
            .client()
            .port()
            .writes
            .len();

        assert!(matches!(
            session.switch_to_nwp(),
            Err(Error::HandoverAlreadyPerformed)
        ));
        assert_eq!(
            session
                .client()
                .port()
                .writes
                .len(),
            writes
        );
    }

    #[test]
    fn test_old_bootloader_rejected() {
        let mut port = MockPort::new();
        let mut script = ACK.to_vec();
        script.extend_from_slice(&ACK);
        let old = version_payload(Endianness::Little, 0x0200_0300, 0x10);
        script.extend_from_slice(&packet::encode(&old).unwrap());
        port.on_next_break(&script);
        let mut rc = client(port, ChipFamily::Cc3200);
        let mut neg = Negotiator::new(ConnectConfig::instant());

        let err = neg
            .negotiate(&mut rc, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedBootloader(ref v) if v == "2.0.3.0"));
        assert!(
            !rc.port()
                .sent_opcodes()
                .contains(&Command::SwitchUartToAppsMcu.opcode())
        );
        assert_eq!(neg.state(), LinkState::Identified);
    }

    #[test]
    fn test_invalid_storage_rejected() {
        let mut port = MockPort::new();
        let version = version_payload(Endianness::Big, 0x0400_0000, 0x18);
        port.on_next_break(&identify(&version, 0x82));
        let mut rc = client(port, ChipFamily::Cc32xx);

        let err = Negotiator::new(ConnectConfig::instant())
            .negotiate(&mut rc, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidStorageConfiguration(StorageBitmap(0x82))
        ));
    }

    #[test]
    fn test_unknown_chip_rejected() {
        let mut port = MockPort::new();
        let version = version_payload(Endianness::Big, 0x0400_0000, 0x20);
        port.on_next_break(&identify(&version, 0x86));
        let mut rc = client(port, ChipFamily::Cc32xx);

        let err = Negotiator::new(ConnectConfig::instant())
            .negotiate(&mut rc, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChip(0x20)));
    }
}

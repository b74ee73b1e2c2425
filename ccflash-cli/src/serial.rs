//! Interactive serial port selection.
//!
//! - Auto-detection of TI boards and common USB bridges
//! - Interactive selection via dialoguer
//! - Remembering selected boards in configuration
//! - Non-interactive mode for CI

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    ccflash::{DetectedPort, DeviceKind, detect_ports},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Offer every port, not just recognised ones.
    pub list_all_ports: bool,
    /// Never prompt.
    pub non_interactive: bool,
    /// Confirm even a single recognised port.
    pub confirm_port: bool,
}

/// Result of port selection.
pub struct SelectedPort {
    /// The selected port.
    pub port: DetectedPort,
    /// Whether it matched a built-in or remembered device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Whether a port is a built-in or remembered board.
pub fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    if port
        .device
        .is_known()
    {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.is_remembered(vid, pid),
        _ => false,
    }
}

/// Choose between candidates without prompting.
///
/// Exactly one candidate is selected; none or several is a usage error.
pub fn select_non_interactive(
    candidates: Vec<DetectedPort>,
    config: &Config,
) -> Result<SelectedPort> {
    let mut iter = candidates.into_iter();
    match (iter.next(), iter.next()) {
        (Some(port), None) => Ok(SelectedPort {
            is_known: is_known_device(&port, config),
            port,
        }),
        (Some(_), Some(_)) => Err(usage_err(
            "multiple serial ports found; pass --port to choose one",
        )),
        (None, _) => Err(usage_err("no serial ports available")),
    }
}

/// Select a serial port from flags, config, or detection.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(name) = &options.port {
        return Ok(find_port_by_name(name));
    }
    if let Some(name) = &config
        .port
        .serial
    {
        debug!("Using port from config: {name}");
        return Ok(find_port_by_name(name));
    }

    let ports = detect_ports();
    if ports.is_empty() {
        return Err(usage_err("no serial ports found"));
    }

    let known: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();
    let candidates = if options.list_all_ports || known.is_empty() {
        ports
    } else {
        known
    };

    if options.non_interactive {
        return select_non_interactive(candidates, config);
    }

    if candidates.len() > 1 {
        ensure_interactive_terminal()?;
        return select_port_interactive(candidates, config);
    }

    let Some(port) = candidates
        .into_iter()
        .next()
    else {
        return Err(usage_err("no serial ports available"));
    };
    let is_known = is_known_device(&port, config);
    if is_known && !options.confirm_port {
        info!(
            "Auto-selected port: {} [{}]",
            port.name,
            port.device
                .name()
        );
        Ok(SelectedPort { port, is_known })
    } else {
        ensure_interactive_terminal()?;
        confirm_single_port(port)
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "port selection needs a terminal; pass --port or --non-interactive",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            CliError::Cancelled("port selection cancelled".to_string()).into()
        },
        DialoguerError::IO(_) => usage_err("port selection prompt failed"),
    }
}

/// Find a detected port by name, or describe an unlisted one.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports();
    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| {
            ports
                .iter()
                .find(|p| {
                    p.name
                        .eq_ignore_ascii_case(name)
                })
        });

    match found {
        Some(port) => SelectedPort {
            port: port.clone(),
            is_known: port
                .device
                .is_known(),
        },
        None => SelectedPort {
            port: DetectedPort {
                name: name.to_string(),
                device: DeviceKind::Unknown,
                vid: None,
                pid: None,
                product: None,
            },
            is_known: false,
        },
    }
}

/// Menu label for a port.
fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name)
            .bold()
            .to_string()
    } else {
        port.name
            .clone()
    };
    let kind = if port
        .device
        .is_known()
    {
        format!(
            " [{}]",
            style(
                port.device
                    .name()
            )
            .yellow()
        )
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!("{name}{kind}{product}")
}

fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );
    ports.sort_by_key(|p| !is_known_device(p, config));

    let max_width = usize::from(
        console::Term::stderr()
            .size()
            .1,
    )
    .saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p, config), max_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    let Some(index) = selection else {
        return Err(CliError::Cancelled("port selection cancelled".to_string()).into());
    };
    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
    let is_known = is_known_device(&port, config);
    Ok(SelectedPort { port, is_known })
}

fn confirm_single_port(port: DetectedPort) -> Result<SelectedPort> {
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use serial port {}{product}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(CliError::Cancelled("port selection cancelled".to_string()).into())
    }
}

/// Offer to remember an unrecognised USB device.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.is_remembered(vid, pid) {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this device for next time?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }
    Ok(())
}

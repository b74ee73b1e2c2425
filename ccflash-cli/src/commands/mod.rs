//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod flash;
pub(crate) mod info;
pub(crate) mod ports;

use {
    crate::{Cli, config::Config, connect_config, get_port, resolve_family, serial_config},
    anyhow::{Context, Result},
    ccflash::Flasher,
    console::style,
};

/// Open the selected port, negotiate a session, run `f`, and close.
///
/// The flasher is closed on every path, including failures inside `f`.
pub(crate) fn with_flasher<T>(
    cli: &Cli,
    config: &mut Config,
    f: impl FnOnce(&mut dyn Flasher) -> Result<T>,
) -> Result<T> {
    let family = resolve_family(cli, config)?;
    let port = get_port(cli, config)?;
    let serial = serial_config(cli, config, port);
    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud ({family})",
            style("🔌").cyan(),
            serial.port_name,
            serial.baud_rate
        );
    }

    let mut flasher = family
        .create_flasher(&serial, connect_config(config))
        .with_context(|| format!("Failed to open {}", serial.port_name))?;

    if !cli.quiet {
        eprintln!("{} Waiting for the boot loader...", style("⏳").yellow());
    }
    if let Err(err) = flasher.connect() {
        flasher.close();
        return Err(err.into());
    }
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }

    let result = f(flasher.as_mut());
    flasher.close();
    result
}

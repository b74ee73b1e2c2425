//! Port listing command implementation.

use {
    anyhow::Result,
    ccflash::{DeviceKind, auto_detect_port, detect_ports, device::format_port_list},
    console::style,
};

/// List ports, as text on stderr or JSON on stdout.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = detect_ports();

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for (port, line) in detected
        .iter()
        .zip(format_port_list(&detected))
    {
        let bullet = match port.device {
            DeviceKind::Unknown => style("•").dim(),
            _ => style("•").green(),
        };
        eprintln!("  {bullet} {line}");
    }

    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
    Ok(())
}

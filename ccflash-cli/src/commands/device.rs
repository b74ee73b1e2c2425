//! Commands that talk to the boot loader without a bundle.

use {
    super::with_flasher,
    crate::{Cli, config::Config},
    anyhow::{Context, Result},
    ccflash::{DeviceReport, protocol::response::format_version},
    console::style,
};

/// Human-readable report lines.
fn report_lines(report: &DeviceReport) -> Vec<(&'static str, String)> {
    let mut lines = vec![
        ("Chip", report.chip.to_string()),
        ("Boot loader", report.version.bootloader_version_string()),
        ("NWP", format_version(report.version.nwp)),
        ("MAC version", format_version(report.version.mac)),
        ("PHY", format_version(report.version.phy)),
    ];
    if let Some(primary) = &report.primary_version {
        lines.push(("Primary loader", primary.bootloader_version_string()));
    }
    lines.push(("Storage", report.storage.to_string()));
    if let Some(mac) = &report.mac {
        lines.push(("MAC address", mac.to_string()));
    }
    if let Some(info) = &report.device_info {
        lines.push((
            "SLFS",
            format!(
                "{} blocks of {} bytes, {} bytes free",
                info.fs_num_blocks,
                info.fs_block_size,
                info.free_bytes()
            ),
        ));
    }
    lines
}

/// Probe command implementation.
pub(crate) fn cmd_probe(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let report = with_flasher(cli, config, |flasher| {
        flasher
            .info()
            .context("Failed to query the boot loader")
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    eprintln!("\n{}", style("Device").bold().underlined());
    for (label, value) in report_lines(&report) {
        eprintln!("  {label:<15} {}", style(value).cyan());
    }
    Ok(())
}

/// Format command implementation.
pub(crate) fn cmd_format(cli: &Cli, config: &mut Config, size: u32) -> Result<()> {
    with_flasher(cli, config, |flasher| {
        flasher
            .format(size)
            .context("Format failed")
    })?;
    if !cli.quiet {
        eprintln!("{} SLFS formatted to {size} bytes", style("✓").green());
    }
    Ok(())
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &mut Config, file: &str) -> Result<()> {
    with_flasher(cli, config, |flasher| {
        flasher
            .erase_file(file)
            .with_context(|| format!("Failed to delete {file}"))
    })?;
    if !cli.quiet {
        eprintln!("{} Deleted {file}", style("✓").green());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ccflash::{ChipType, StorageBitmap, VersionInfo},
    };

    #[test]
    fn test_report_lines() {
        let version = VersionInfo {
            bootloader: 0x0004_0001,
            nwp: 0,
            mac: 0,
            phy: 0,
            chip_type: 0x1000_0000,
            discriminant: 0x10,
        };
        let report = DeviceReport {
            chip: ChipType::Cc3200,
            version,
            primary_version: Some(version),
            storage: StorageBitmap(0x02),
            mac: None,
            device_info: None,
        };
        let lines = report_lines(&report);
        assert_eq!(lines[0], ("Chip", "CC3200".to_string()));
        assert!(lines
            .iter()
            .any(|(label, _)| *label == "Primary loader"));
        assert!(!lines
            .iter()
            .any(|(label, _)| *label == "MAC address"));
    }
}

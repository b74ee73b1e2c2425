//! Flash command implementation.

use {
    super::with_flasher,
    crate::{Cli, bundle::BundleCatalog, config::Config, use_fancy_output},
    anyhow::{Context, Result},
    ccflash::PartCatalog,
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    std::path::Path,
};

fn part_bar(name: &str, total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(name.to_string());
    pb
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &mut Config,
    bundle: &Path,
    format: Option<u32>,
    no_boot: bool,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading bundle {}",
            style("📦").cyan(),
            bundle.display()
        );
    }

    // Bundle problems surface before the port is touched.
    let catalog = BundleCatalog::load(bundle)?;
    let parts = catalog.sorted_parts();
    if !cli.quiet {
        eprintln!("{} {} parts to flash", style("ℹ").blue(), parts.len());
        for part in &parts {
            eprintln!(
                "    {} {} {}",
                style("•").dim(),
                part.name,
                style(part.part_type.tag()).yellow()
            );
        }
    }

    with_flasher(cli, config, |flasher| {
        if let Some(size) = format {
            if !cli.quiet {
                eprintln!("{} Formatting SLFS to {size} bytes", style("🧹").cyan());
            }
            flasher
                .format(size)
                .context("Format failed")?;
        }

        let fancy = !cli.quiet && use_fancy_output();
        let mut current: Option<(String, ProgressBar)> = None;
        let result = flasher.flash_catalog(&catalog, &mut |name: &str, done: usize, total: usize| {
            let switch = current
                .as_ref()
                .is_none_or(|(n, _)| n != name);
            if switch {
                if let Some((_, pb)) = current.take() {
                    pb.finish();
                }
                let pb = if fancy {
                    part_bar(name, total)
                } else {
                    if !cli.quiet {
                        eprintln!("{} Writing {name} ({total} bytes)", style("→").green());
                    }
                    ProgressBar::hidden()
                };
                current = Some((name.to_string(), pb));
            }
            if let Some((_, pb)) = &current {
                pb.set_position(done as u64);
            }
        });
        if let Some((_, pb)) = current.take() {
            if result.is_ok() {
                pb.finish();
            } else {
                pb.abandon();
            }
        }
        result.context("Flashing failed")?;

        if !no_boot {
            if !cli.quiet {
                eprintln!("{} Booting firmware", style("🔄").cyan());
            }
            flasher.boot_firmware()?;
        }
        Ok(())
    })?;

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }
    Ok(())
}

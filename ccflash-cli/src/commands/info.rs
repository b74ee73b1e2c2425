//! Bundle info command implementation.

use {
    crate::bundle::BundleCatalog,
    anyhow::Result,
    ccflash::{PartCatalog, PartInfo},
    console::style,
    serde::Serialize,
    std::path::Path,
};

#[derive(Serialize)]
struct PartSummary<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    part_type: &'a str,
    src: Option<&'a str>,
    size: Option<u64>,
    alloc_size: Option<u32>,
    signed: bool,
    fail_safe: bool,
}

fn summarize<'a>(catalog: &'a BundleCatalog, part: &'a PartInfo) -> PartSummary<'a> {
    let entry = catalog.entry(&part.name);
    PartSummary {
        name: &part.name,
        part_type: part
            .part_type
            .tag(),
        src: entry.and_then(|e| e.src.as_deref()),
        size: catalog
            .payload_size(part)
            .ok(),
        alloc_size: part.alloc_size,
        signed: entry.is_some_and(|e| e.signature.is_some()),
        fail_safe: part.fail_safe,
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(bundle: &Path, json: bool) -> Result<()> {
    let catalog = BundleCatalog::load(bundle)?;
    let parts = catalog.sorted_parts();
    let summaries: Vec<PartSummary<'_>> = parts
        .iter()
        .map(|p| summarize(&catalog, p))
        .collect();

    if json {
        let doc = serde_json::json!({
            "name": catalog.name,
            "version": catalog.version,
            "parts": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{}", style("Bundle").bold().underlined());
    if let Some(name) = &catalog.name {
        println!("  Name:    {name}");
    }
    if let Some(version) = &catalog.version {
        println!("  Version: {version}");
    }
    println!("  Parts:   {}", summaries.len());

    println!("\n{}", style("Flashing order").bold().underlined());
    for (i, part) in summaries
        .iter()
        .enumerate()
    {
        let size = part
            .size
            .map_or_else(|| "missing".to_string(), |s| format!("{s} bytes"));
        let mut flags = Vec::new();
        if part.signed {
            flags.push("signed");
        }
        if part.fail_safe {
            flags.push("fail-safe");
        }
        println!(
            "  [{i:2}] {} {} ({size}){}{}",
            style(part.name).cyan().bold(),
            style(part.part_type).yellow(),
            part.alloc_size
                .map(|a| format!(" alloc {a}"))
                .unwrap_or_default(),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }
    Ok(())
}

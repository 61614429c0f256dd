//! CLI command for package header summaries

use std::path::Path;

use console::style;

use crate::package::Package;

/// Format byte size for human-readable output
fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Print the header summary of a package.
pub fn execute(path: &Path, json: bool) -> anyhow::Result<()> {
    let package = Package::open(path, true)?;
    let summary = package.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Package Information: {}", style(path.display()).bold());
    println!();
    println!(
        "Game: {} (version {}/{})",
        summary.game, summary.version, summary.licensee_version
    );
    println!("Flags: 0x{:08X}", summary.flags.0);
    println!("  Cooked: {}", summary.cooked);
    println!("  Compressed: {}", summary.compressed);
    println!("GUID: {}", summary.guid);
    println!("Folder: {}", summary.folder_name);
    println!("Package source: 0x{:08X}", summary.package_source);
    println!();
    println!("Names: {}", summary.name_count);
    println!("Imports: {}", summary.import_count);
    println!("Exports: {}", summary.export_count);
    println!(
        "Full header size: {} ({} bytes)",
        format_size(u64::from(summary.full_header_size)),
        summary.full_header_size
    );

    if summary.compressed {
        let packed: u64 = summary.chunks.iter().map(|c| u64::from(c.compressed_size)).sum();
        let unpacked: u64 = summary.chunks.iter().map(|c| u64::from(c.uncompressed_size)).sum();
        println!();
        println!("Compression: {}", summary.compression);
        println!(
            "Chunks: {} ({} -> {})",
            summary.chunks.len(),
            format_size(packed),
            format_size(unpacked)
        );
        for (index, chunk) in summary.chunks.iter().enumerate() {
            println!(
                "  [{index}] 0x{:08X} {:>10} -> 0x{:08X} {:>10}",
                chunk.compressed_offset,
                chunk.compressed_size,
                chunk.uncompressed_offset,
                chunk.uncompressed_size
            );
        }
    }

    if !summary.additional_packages_to_cook.is_empty() {
        println!();
        println!("Additional packages to cook:");
        for name in &summary.additional_packages_to_cook {
            println!("  {name}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1_048_576), "3.0 MB");
    }
}

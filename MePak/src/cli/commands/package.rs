//! CLI commands that re-save packages or dump export payloads

use std::path::Path;
use std::time::Instant;

use crate::cli::progress::{DISK, LOOKING_GLASS, PACKAGE, print_done, print_step, simple_spinner};
use crate::compression::CompressionType;
use crate::package::{Package, SaveOptions};

/// Save `source` to `destination` uncompressed.
pub fn decompress(source: &Path, destination: &Path) -> anyhow::Result<()> {
    resave(source, destination, &SaveOptions::new())
}

/// Save `source` to `destination` chunk-compressed.
pub fn compress(source: &Path, destination: &Path, codec: Option<&str>) -> anyhow::Result<()> {
    let compression = codec.map(parse_codec).transpose()?;
    let options = SaveOptions::compressed().with_compression(compression);
    resave(source, destination, &options)
}

fn parse_codec(codec: &str) -> anyhow::Result<CompressionType> {
    match codec.to_lowercase().as_str() {
        "zlib" => Ok(CompressionType::Zlib),
        "lzo" => Ok(CompressionType::Lzo),
        other => anyhow::bail!("Unknown compression codec: '{other}'. Valid options: zlib, lzo"),
    }
}

fn resave(source: &Path, destination: &Path, options: &SaveOptions) -> anyhow::Result<()> {
    let started = Instant::now();

    print_step(1, 2, LOOKING_GLASS, &format!("Reading {}...", source.display()));
    let spinner = simple_spinner("Loading package tables");
    let opened = Package::open(source, false);
    spinner.finish_and_clear();
    let mut package = opened?;
    println!(
        "      {} package, {} names, {} imports, {} exports",
        package.game(),
        package.name_count(),
        package.import_count(),
        package.export_count()
    );

    let compression = options.resolve_compression(package.game());
    let emoji = if compression == CompressionType::None { DISK } else { PACKAGE };
    print_step(2, 2, emoji, &format!("Writing {} ({compression})...", destination.display()));
    let spinner = simple_spinner("Relocating payloads and writing package");
    let saved = package.save_with_options(destination, options);
    spinner.finish_and_clear();
    saved?;

    if compression != CompressionType::None {
        println!("      {} chunks", package.header().chunks.len());
    }
    print_done(started.elapsed());
    Ok(())
}

/// Write the payload of export `uindex` to `destination`.
pub fn payload(path: &Path, uindex: i32, destination: &Path) -> anyhow::Result<()> {
    let package = Package::open(path, false)?;
    if !package.is_export(uindex) {
        anyhow::bail!(
            "{uindex} is not an export uindex (package has {} exports)",
            package.export_count()
        );
    }

    let index = uindex as usize - 1;
    let data = package.export_payload(index)?;
    std::fs::write(destination, data)?;

    println!(
        "Wrote {} bytes of {} '{}' to {}",
        data.len(),
        package.class_name(uindex)?,
        package.object_name(uindex)?,
        destination.display()
    );
    Ok(())
}

//! CLI command for listing package tables

use std::path::Path;

use crate::package::{Entry, Package};

/// Which table `mepak list` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Names,
    Imports,
    Exports,
}

/// Format byte size for human-readable output
fn format_size(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1}M", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}K", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}B")
    }
}

/// Print one table of a package.
pub fn execute(path: &Path, table: Table) -> anyhow::Result<()> {
    let package = Package::open(path, false)?;

    match table {
        Table::Names => {
            for (index, name) in package.names().iter().enumerate() {
                println!("{index:>6}  {name}");
            }
            println!("{} names", package.name_count());
        }
        Table::Imports => {
            for import in package.imports() {
                let uindex = import.uindex();
                println!(
                    "{uindex:>7}  {:<32} {}",
                    package.class_name(uindex)?,
                    full_path(&package, uindex)?
                );
            }
            println!("{} imports", package.import_count());
        }
        Table::Exports => {
            let mut total = 0usize;
            for export in package.exports() {
                let uindex = export.uindex();
                total += export.data().len();
                println!(
                    "{uindex:>7}  {:<32} {:>8}  0x{:08X}  {}",
                    package.class_name(uindex)?,
                    format_size(export.data().len()),
                    export.data_offset(),
                    full_path(&package, uindex)?
                );
            }
            println!("{} exports, {} of payload", package.export_count(), format_size(total));
        }
    }

    Ok(())
}

/// Dotted path of an entry through its outer links.
fn full_path(package: &Package, uindex: i32) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    let mut current = uindex;
    // A malformed package can link an entry to itself.
    let limit = package.import_count() as usize + package.export_count() as usize + 1;
    while current != 0 && parts.len() < limit {
        parts.push(package.object_name(current)?);
        current = match package.entry(current) {
            Some(entry) => entry.link(),
            None => 0,
        };
    }
    parts.reverse();
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{ExportEntry, MeGame, NameRef};

    #[test]
    fn test_full_path_follows_links() {
        let mut package = Package::new(MeGame::Me3);
        let outer = package.add_name("BioD_Nor") as i32;
        let inner = package.add_name("Trigger") as i32;
        let parent = package.add_export(ExportEntry::new(0, 0, 0, NameRef::new(outer, 0), Vec::new()));
        let child = package.add_export(ExportEntry::new(0, 0, parent, NameRef::new(inner, 3), Vec::new()));

        assert_eq!(full_path(&package, child).unwrap(), "BioD_Nor.Trigger_2");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(10), "10B");
        assert_eq!(format_size(1536), "1.5K");
    }
}

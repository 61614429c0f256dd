//! Command execution implementations

use super::Commands;
use super::list::Table;
use super::{info, list, package};

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying command fails.
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Commands::Info { path, json } => info::execute(path, *json),
            Commands::List {
                path,
                names,
                imports,
                exports: _,
            } => {
                let table = if *names {
                    Table::Names
                } else if *imports {
                    Table::Imports
                } else {
                    Table::Exports
                };
                list::execute(path, table)
            }
            Commands::Decompress {
                source,
                destination,
            } => package::decompress(source, destination),
            Commands::Compress {
                source,
                destination,
                codec,
            } => package::compress(source, destination, codec.as_deref()),
            Commands::Payload {
                path,
                uindex,
                destination,
            } => package::payload(path, *uindex, destination),
        }
    }
}

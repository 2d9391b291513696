pub mod category;
pub mod config;
pub mod daemon;
pub mod export;
pub mod focus;
pub mod stats;

use dwell::db::Store;
use dwell::{DataPaths, Result};
use serde::Serialize;

pub(crate) fn open_store() -> Result<(DataPaths, Store)> {
    let paths = DataPaths::resolve()?;
    paths.ensure()?;
    let store = Store::open(&paths.database)?;
    Ok((paths, store))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

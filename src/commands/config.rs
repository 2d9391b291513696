use clap::Subcommand;
use dwell::clock::now_ts;
use dwell::settings::{self, ConfigKey};
use dwell::Result;

use super::open_store;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value
    Get { key: String },
    /// Set one value
    Set { key: ConfigKey, value: String },
    /// Print every known key with its value
    List,
}

pub fn run(action: ConfigAction) -> Result<()> {
    let (_paths, store) = open_store()?;

    match action {
        ConfigAction::Get { key } => {
            let reader = store.reader()?;
            let value = match key.parse::<ConfigKey>() {
                Ok(key) => settings::get(reader.connection(), key)?.to_string(),
                Err(_) => settings::get_raw(reader.connection(), &key, "")?,
            };
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let stored = store.write(|tx| settings::set(tx, key, &value, now_ts()))?;
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            let reader = store.reader()?;
            for (key, value) in settings::list(reader.connection())? {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

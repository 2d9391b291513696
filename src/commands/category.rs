use clap::Subcommand;
use dwell::clock::now_ts;
use dwell::models::AppCategory;
use dwell::{AppError, Result};

use super::{open_store, print_json};

#[derive(Subcommand)]
pub enum CategoryAction {
    /// Assign a category to an app
    Set {
        app: String,
        category: String,
        /// Count this app as productive time
        #[arg(long)]
        productive: bool,
    },
    /// Show the category of one app
    Get { app: String },
    /// List every categorized app
    List,
    /// Remove an app's category
    Remove { app: String },
}

pub fn run(action: CategoryAction) -> Result<()> {
    let (_paths, store) = open_store()?;

    match action {
        CategoryAction::Set {
            app,
            category,
            productive,
        } => {
            let entry = AppCategory::new(&app, &category, productive)?;
            store.write(|tx| entry.save(tx, now_ts()))?;
            print_json(&entry)
        }
        CategoryAction::Get { app } => {
            let reader = store.reader()?;
            let entry = AppCategory::find(reader.connection(), &app)?
                .ok_or(AppError::NotFound { entity: "App category" })?;
            print_json(&entry)
        }
        CategoryAction::List => {
            let reader = store.reader()?;
            print_json(&AppCategory::find_all(reader.connection())?)
        }
        CategoryAction::Remove { app } => {
            if !store.write(|tx| AppCategory::delete(tx, &app))? {
                return Err(AppError::NotFound { entity: "App category" });
            }
            Ok(())
        }
    }
}

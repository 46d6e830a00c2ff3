//! `canopy collections`: manage capture sets in a JSON store file.

use std::path::{Path, PathBuf};

use canopy_store::{MemoryStore, SnapshotStore};
use clap::Subcommand;

#[derive(clap::Args)]
pub struct CollectionsArgs {
    /// Store file (created on first write).
    #[arg(long)]
    store: PathBuf,

    #[command(subcommand)]
    command: CollectionsCommand,
}

#[derive(Subcommand)]
enum CollectionsCommand {
    /// List capture sets, newest first.
    List {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create an empty capture set.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a capture set and all of its snapshots.
    Delete { id: u64 },
    /// Show the snapshots of one capture set, newest first.
    Show {
        id: u64,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn run(args: &CollectionsArgs) -> Result<(), String> {
    let mut store = load_store(&args.store)?;
    match &args.command {
        CollectionsCommand::List { json } => {
            let sets = store.sets();
            if *json {
                print_json(&sets)?;
            } else if sets.is_empty() {
                println!("No capture sets.");
            } else {
                for set in &sets {
                    let count = store.snapshots(set.id).map_or(0, |s| s.len());
                    println!(
                        "{:>4}  {:<24} {:>5} snapshots  {}",
                        set.id,
                        set.name,
                        count,
                        set.description.as_deref().unwrap_or(""),
                    );
                }
            }
        }
        CollectionsCommand::Create { name, description } => {
            let set = store
                .create_set(name, description.as_deref(), canopy_store::now_ms())
                .map_err(|e| e.to_string())?;
            save_store(&args.store, &store)?;
            println!("Created capture set {} ({})", set.id, set.name);
        }
        CollectionsCommand::Delete { id } => {
            store.delete_set(*id).map_err(|e| e.to_string())?;
            save_store(&args.store, &store)?;
            println!("Deleted capture set {id}");
        }
        CollectionsCommand::Show { id, json } => {
            let snapshots = store.snapshots(*id).map_err(|e| e.to_string())?;
            if *json {
                print_json(&snapshots)?;
            } else {
                for s in &snapshots {
                    let st = &s.statistics;
                    let spad = st
                        .spad_estimate
                        .map_or_else(String::new, |v| format!("  SPAD {v:.1}"));
                    println!(
                        "{:>4}  {}  {} mean {:.4} ± {:.4}  cover {:.1}%{spad}  {}",
                        s.id,
                        s.timestamp_ms,
                        st.index,
                        st.mean,
                        st.std_dev,
                        st.plant_area_percentage,
                        s.image_path,
                    );
                }
            }
        }
    }
    Ok(())
}

/// Load a store file; a missing file is an empty store.
pub fn load_store(path: &Path) -> Result<MemoryStore, String> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing store {}: {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MemoryStore::new()),
        Err(e) => Err(format!("Error reading store {}: {e}", path.display())),
    }
}

pub fn save_store(path: &Path, store: &MemoryStore) -> Result<(), String> {
    let json = serde_json::to_string_pretty(store)
        .map_err(|e| format!("Error serializing store: {e}"))?;
    std::fs::write(path, json).map_err(|e| format!("Error writing store {}: {e}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Error serializing: {e}"))?;
    println!("{json}");
    Ok(())
}

mod cli;
mod config;
mod coordinator;
mod hash;
mod identity;
mod model;
mod storage;

use std::{env, process};

use config::Config;
use coordinator::Coordinator;
use storage::Store;

fn main() {
    let root = config::state_root();

    let config = match Config::load(&root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let store = match Store::new(&root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialize state directory: {e}");
            process::exit(1);
        }
    };

    let work_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Could not determine working directory: {e}");
            process::exit(1);
        }
    };

    let coordinator = Coordinator::new(store, &config, work_root);

    match cli::run(&coordinator) {
        Ok(outcome) => process::exit(outcome.code()),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

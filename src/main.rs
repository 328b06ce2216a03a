mod app;
mod export;
mod io;
mod rename;
mod tree;
mod ui;

use app::{AppConfig, TreeKitApp};
use clap::Parser;

fn main() {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let config = AppConfig::parse();
    if let Err(err) = TreeKitApp::run(&config) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

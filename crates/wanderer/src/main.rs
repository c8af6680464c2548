//! Wanderer service entry point.
//!
//! Hosts the live maps and, when enabled, keeps the kill feed subscribed to
//! the systems those maps show.

mod app;
mod bridge;
mod cli;
mod config;
mod logging;
mod signals;

use cli::CliArgs;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = app::run(args).await {
        eprintln!("❌ {e:?}");
        std::process::exit(1);
    }
}

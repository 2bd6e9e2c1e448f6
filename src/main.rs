//! irczt: a single-process IRC server with in-process chat bots.
//!
//! Takes no arguments; reads `irczt.yaml` from the current directory. Any
//! byte on stdin requests an orderly shutdown (exit 0). Startup failures
//! (bad config, bind/listen/poll failure) exit 1.

mod bot;
mod channel;
mod client;
mod config;
mod error;
mod lines;
mod logger;
mod server;
mod user;
mod wire;

use std::path::Path;

use config::Config;
use error::StartupError;
use server::Server;

const CONFIG_PATH: &str = "irczt.yaml";

fn main() {
    ignore_sigpipe();
    logger::init();

    if let Err(e) = run() {
        log::error!("startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), StartupError> {
    let config = Config::load(Path::new(CONFIG_PATH))?;
    log::info!("listening on {}", config.listen);
    let server = Server::new(&config)?;
    server.run()
}

/// A disconnected client's write must surface as an ordinary `EPIPE` I/O
/// error on the next write, not kill the process outright.
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

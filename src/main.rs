mod app;
mod archive;
mod cli;
mod config;
mod egg;
mod game;
mod installer;
mod lang;
mod library;
mod logging;
mod tutorial;
mod update;

use anyhow::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    cli::run()
}

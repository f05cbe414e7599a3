mod app;
mod components;
mod config;
mod engine;
mod error;
mod image_pipeline;
mod message;
mod model;
mod native;
mod session;
mod utils;
mod views;

use app::Flags;
use std::path::PathBuf;

fn main() -> iced::Result {
    let mut args = pico_args::Arguments::from_env();

    let config_dir = match args.opt_value_from_os_str("--config-dir", |value| {
        Ok::<_, std::convert::Infallible>(PathBuf::from(value))
    }) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("medview: {err}");
            eprintln!("usage: medview [--config-dir DIR] [FILE]");
            std::process::exit(2);
        }
    };

    let flags = Flags {
        config_dir,
        file_path: args.finish().into_iter().next().map(PathBuf::from),
    };

    app::run(flags)
}

//! Settings are read from a TOML file and then from `TOKENKEEPER__*` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

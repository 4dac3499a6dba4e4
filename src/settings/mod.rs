//! Settings come from a TOML file (`--settings`, or the build profile's default)
//! overlaid by `TOKENSMITH__<SECTION>__<KEY>` environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Issues, rotates and revokes access/refresh token pairs")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
}

use std::path::{
    Path,
    PathBuf,
};

use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre;

use crate::{
    da,
    relayer,
    Environment,
};

/// A CLI for operating RollApps, their IBC relayer and their DA light client.
#[derive(Debug, Parser)]
#[command(name = "roller", version)]
pub struct Cli {
    /// The directory holding roller's configuration and the node homes
    #[arg(long, global = true, env = "ROLLER_HOME", default_value_os_t = default_home())]
    home: PathBuf,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Parse the command line arguments
    ///
    /// Exits the process with a usage message if the arguments cannot be parsed.
    #[must_use]
    pub fn get_args() -> Self {
        Self::parse()
    }

    /// Runs the selected subcommand.
    ///
    /// # Errors
    ///
    /// Returns the error of the subcommand.
    pub async fn run(self, env: &Environment) -> eyre::Result<()> {
        let home = expand_home(&self.home);
        match self.command {
            Command::Relayer(relayer) => relayer.run(&home, env).await,
            Command::Da(da) => da.run(&home, env).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Commands for managing the IBC relayer between the hub and the RollApp
    Relayer(relayer::Command),
    /// Commands for managing the data availability layer
    Da(da::Command),
}

fn default_home() -> PathBuf {
    home::home_dir().unwrap_or_default().join(".roller")
}

/// Replaces a leading `~` with the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

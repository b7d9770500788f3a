use std::path::Path;

use clap::Subcommand;
use color_eyre::eyre;

use crate::{
    hub::HubCli,
    roller_config::RollerConfig,
    Environment,
    DA_LIGHT_NODE_DIR,
};

mod avail;
mod light_client;

#[derive(Debug, clap::Args)]
pub(crate) struct Command {
    #[command(subcommand)]
    command: SubCommand,
}

impl Command {
    pub(crate) async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        match self.command {
            SubCommand::LightClient(light_client) => light_client.run(home, env).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum SubCommand {
    /// Commands for the DA light client
    LightClient(LightClientCommand),
}

#[derive(Debug, clap::Args)]
struct LightClientCommand {
    #[command(subcommand)]
    command: LightClientSubCommand,
}

impl LightClientCommand {
    async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        match self.command {
            LightClientSubCommand::Init(init) => init.run(home, env).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum LightClientSubCommand {
    /// Initialize the DA light client config in the roller home
    Init(InitArgs),
}

#[derive(Debug, clap::Args)]
struct InitArgs {
    /// The environment to initialize the light client for; `mock` runs without one
    #[arg(long, default_value = "playground")]
    env: String,
}

impl InitArgs {
    async fn run(self, home: &Path, env: &Environment) -> eyre::Result<()> {
        let config = RollerConfig::load(home)?;
        if self.env == light_client::MOCK_ENVIRONMENT {
            println!("mock environment, no DA light client to initialize");
            return Ok(());
        }
        config.validate()?;

        let chain = HubCli::new(env.hub_binary.clone());
        let da = avail::AvailClient::new(&config.da.api_url)?;
        let node = light_client::AvailLightNode::new(
            env.light_client_binary.clone(),
            home.join(DA_LIGHT_NODE_DIR),
        );
        if let Some(key) =
            light_client::initialize(&self.env, &config, &chain, &da, &node).await?
        {
            println!("successfully initialized the DA light client");
            key.print();
            println!("fund the address above before starting the light client");
        }
        Ok(())
    }
}

use std::fmt;

use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use tracing::{
    debug,
    instrument,
};

use super::{
    client::{
        Relayer,
        STATE_OPEN,
    },
    config::{
        PathEnd,
        RelayerConfig,
    },
};

/// The transfer channel between the hub (`src`) and the RollApp (`dst`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ChannelPair {
    pub(crate) src: String,
    pub(crate) dst: String,
}

impl ChannelPair {
    pub(crate) fn is_ready(&self) -> bool {
        !self.src.is_empty() && !self.dst.is_empty()
    }
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rollapp: {}\n<->\nhub: {}", self.dst, self.src)
    }
}

/// Looks for an open transfer channel of the RollApp.
///
/// A relayer that does not know the RollApp yet has no channels, so it is not asked.
#[instrument(skip(relayer), err)]
pub(crate) async fn probe(relayer: &dyn Relayer, rollapp_id: &str) -> eyre::Result<ChannelPair> {
    let known = RelayerConfig::load(relayer.home())?
        .is_some_and(|config| config.has_chain(rollapp_id));
    if !known {
        debug!("relayer has no config for the rollapp");
        return Ok(ChannelPair::default());
    }
    let channels = relayer
        .channels(rollapp_id)
        .await
        .wrap_err("failed to query the rollapp's IBC channels")?;
    let pair = channels
        .into_iter()
        .find(|channel| channel.is_open_transfer())
        .map(|channel| ChannelPair {
            src: channel.counterparty.channel_id,
            dst: channel.channel_id,
        })
        .unwrap_or_default();
    debug!(src = %pair.src, dst = %pair.dst, "probed the transfer channel");
    Ok(pair)
}

/// The (hub, RollApp) ends of the first open connection of the RollApp.
pub(crate) async fn active_connections(
    relayer: &dyn Relayer,
    hub_id: &str,
    rollapp_id: &str,
) -> eyre::Result<Option<(PathEnd, PathEnd)>> {
    let connections = relayer
        .connections(rollapp_id)
        .await
        .wrap_err("failed to query the rollapp's IBC connections")?;
    Ok(connections
        .into_iter()
        .find(|connection| connection.state == STATE_OPEN)
        .map(|connection| {
            let hub = PathEnd {
                chain_id: hub_id.to_string(),
                client_id: connection.counterparty.client_id,
                connection_id: connection.counterparty.connection_id,
            };
            let rollapp = PathEnd {
                chain_id: rollapp_id.to_string(),
                client_id: connection.client_id,
                connection_id: connection.id,
            };
            (hub, rollapp)
        }))
}

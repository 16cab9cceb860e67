//! Agent listing

use nva_client::Client;
use nva_core::{Agent, Labeled, Result};
use tracing::debug;

/// Every agent in the client's organization, sorted by label.
pub async fn list_agents(client: &dyn Client) -> Result<Vec<Agent>> {
    let mut agents = client.list_agents().await?;
    agents.sort_by(|a, b| a.label().cmp(b.label()));
    debug!(count = agents.len(), "agents listed");
    Ok(agents)
}

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use super::{AuthoredMap, Discovery};
use crate::github::queries::{build_authored_search_query, parse_search_nodes};
use crate::github::GitHubError;
use crate::pr::{PrKey, Role};

/// Catch authored PRs in repositories without a local clone.
///
/// Searches PRs by the user created or updated in the window, drops keys
/// already known, and keeps only those with an in-window commit by the user.
/// An update alone never credits a PR.
#[instrument(skip_all)]
pub async fn search_authored(
    discovery: &Discovery<'_>,
    authored: &mut AuthoredMap,
) -> Result<(), GitHubError> {
    let (query, variables) =
        build_authored_search_query(discovery.org, discovery.user, &discovery.window);
    let data = match discovery.github.query(&query, Some(&variables)).await {
        Ok(data) => data,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(error = %e, "authored PR search failed");
            return Ok(());
        }
    };

    let mut seen = BTreeSet::new();
    let mut candidates: Vec<PrKey> = Vec::new();
    for alias in ["created", "updated"] {
        for node in parse_search_nodes(&data, alias) {
            let Some(key) = node.key() else {
                continue;
            };
            if seen.insert(key.clone()) && !authored.contains(&key) {
                candidates.push(key);
            }
        }
    }
    debug!(candidates = candidates.len(), "remote authored candidates");

    for key in discovery.confirm_commits(&candidates, "commit check").await? {
        authored.insert_new(key, Role::Authored);
    }
    Ok(())
}

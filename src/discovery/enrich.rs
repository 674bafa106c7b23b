use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument, warn};

use super::{tolerate, AuthoredMap, Discovery, Findings};
use crate::github::queries::{
    build_pr_details_query, build_waiting_for_review_query, parse_pr_details_response,
    parse_search_nodes, SearchNode, DETAIL_BATCH,
};
use crate::github::GitHubError;
use crate::pr::{AuthoredEntry, PrDetail, PrKey, ReviewedEntry, Role, WaitingEntry};
use crate::window::{timestamp_date, DateWindow};

/// Fetch details for every discovered key, settle authored vs contributed,
/// and look up the user's PRs still waiting on reviewers.
#[instrument(skip_all, fields(authored = authored.len(), reviewed = reviewed.len()))]
pub async fn enrich(
    discovery: &Discovery<'_>,
    authored: &mut AuthoredMap,
    reviewed: &BTreeSet<PrKey>,
) -> Result<Findings, GitHubError> {
    let mut keys: Vec<PrKey> = authored.keys().cloned().collect();
    keys.extend(reviewed.iter().filter(|k| !authored.contains(k)).cloned());

    let details = fetch_details(discovery, &keys).await?;
    reclassify(authored, &details, discovery.user);

    let mut authored_entries: Vec<AuthoredEntry> = authored
        .keys()
        .map(|key| {
            let role = authored.role(key).unwrap_or(Role::Authored);
            let mut entry = AuthoredEntry::new(key.clone(), role, details.get(key));
            if entry.contributed && entry.original_author.is_none() {
                entry.original_author = authored.known_author(key).map(str::to_string);
            }
            entry
        })
        .collect();
    authored_entries.sort_by(|a, b| {
        (a.key.slug(), a.key.number).cmp(&(b.key.slug(), b.key.number))
    });

    let reviewed_entries = reviewed
        .iter()
        .map(|key| ReviewedEntry::new(key.clone(), details.get(key)))
        .collect();

    let waiting = find_waiting(discovery).await?;

    Ok(Findings {
        authored: authored_entries,
        reviewed: reviewed_entries,
        waiting,
    })
}

/// Details in batches; a failed batch leaves its keys without details.
pub async fn fetch_details(
    discovery: &Discovery<'_>,
    keys: &[PrKey],
) -> Result<HashMap<PrKey, PrDetail>, GitHubError> {
    let mut details = HashMap::new();
    for (batch_index, batch) in keys.chunks(DETAIL_BATCH).enumerate() {
        let query = build_pr_details_query(batch, discovery.with_bodies);
        match discovery.github.query(&query, None).await {
            Ok(data) => details.extend(parse_pr_details_response(&data, batch)),
            Err(e) => tolerate(e, "details", batch_index)?,
        }
    }
    debug!(requested = keys.len(), received = details.len(), "fetched PR details");
    Ok(details)
}

/// The authoritative authored/contributed decision: the detail's author,
/// else the author recorded during commit mapping. Keys with no known
/// author keep their role.
pub fn reclassify(authored: &mut AuthoredMap, details: &HashMap<PrKey, PrDetail>, user: &str) {
    let keys: Vec<PrKey> = authored.keys().cloned().collect();
    for key in keys {
        let author = details
            .get(&key)
            .and_then(|d| d.author.clone())
            .or_else(|| authored.known_author(&key).map(str::to_string));
        match author.as_deref() {
            Some(author) if author == user => authored.set_role(key, Role::Authored),
            Some(_) => authored.set_role(key, Role::Contributed),
            None => {}
        }
    }
}

/// Pending reviewer handles minus the user and excluded bots.
pub fn extract_reviewers(node: &SearchNode, user: &str, excluded_bots: &[String]) -> Vec<String> {
    node.review_requests
        .iter()
        .flat_map(|c| c.iter())
        .filter_map(|request| request.requested_reviewer.as_ref()?.handle())
        .filter(|handle| *handle != user && !excluded_bots.iter().any(|bot| bot.as_str() == *handle))
        .map(str::to_string)
        .collect()
}

fn waiting_entry(node: &SearchNode, reviewers: Vec<String>, window: &DateWindow) -> Option<WaitingEntry> {
    let key = node.key()?;
    let created_at = node.created_at.as_deref().unwrap_or("");
    let days_waiting = timestamp_date(created_at)
        .map(|created| window.days_until_end(created))
        .unwrap_or(0);
    Some(WaitingEntry {
        key,
        title: node.title.clone(),
        reviewers,
        created_at: created_at.chars().take(10).collect(),
        days_waiting,
    })
}

/// Open, non-draft PRs by the user with at least one outstanding reviewer.
pub async fn find_waiting(discovery: &Discovery<'_>) -> Result<Vec<WaitingEntry>, GitHubError> {
    let (query, variables) = build_waiting_for_review_query(discovery.org, discovery.user);
    let data = match discovery.github.query(&query, Some(&variables)).await {
        Ok(data) => data,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(error = %e, "waiting for review query failed");
            return Ok(Vec::new());
        }
    };

    Ok(parse_search_nodes(&data, "search")
        .iter()
        .filter(|node| !node.is_draft)
        .filter_map(|node| {
            let reviewers = extract_reviewers(node, discovery.user, discovery.excluded_bots);
            if reviewers.is_empty() {
                return None;
            }
            waiting_entry(node, reviewers, &discovery.window)
        })
        .collect())
}

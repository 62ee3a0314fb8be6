// src/pipeline/sync.rs

//! One synchronization cycle: fetch, extract, persist.

use log::info;

use crate::error::Result;
use crate::models::Circular;
use crate::pipeline::reconcile;
use crate::services::extract::extract_circulars;
use crate::services::feed::{fetch_feed, FeedTransport};
use crate::store::Store;

/// Number of leading circulars, in parse order, eligible for field updates.
/// Records outside this window are treated as immutable upstream.
pub const RECENT_WINDOW: usize = 25;

/// Result of one sync cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// Circulars extracted this cycle, in parse order.
    pub circulars: Vec<Circular>,
}

/// Run one fetch → extract → persist cycle.
///
/// The store write happens in a single transaction; on any failure the cycle
/// leaves no partial state behind.
pub async fn run_cycle(transport: &dyn FeedTransport, store: &mut Store) -> Result<CycleOutcome> {
    info!("getting circulars");
    let corpus = fetch_feed(transport).await?;

    info!("parsing circulars");
    let circulars = extract_circulars(&corpus)?;
    info!("parsed {} circulars", circulars.len());

    info!("updating store");
    store.apply(&circulars, RECENT_WINDOW)?;
    info!("store updated");

    Ok(CycleOutcome { circulars })
}

/// Remove persisted records that vanished from the active listing.
///
/// Returns the number of removed circulars and attachments. Runs on its own
/// cadence because deletion is destructive and the active listing does not
/// include archived entries.
pub fn run_cleanup(store: &mut Store, circulars: &[Circular]) -> Result<(usize, usize)> {
    let persisted_circulars = store.circular_ids()?;
    let persisted_attachments = store.attachment_ids()?;

    let removals = reconcile::removal_set(circulars, &persisted_circulars, &persisted_attachments);
    store.delete_removed(&removals.circulars, &removals.attachments)
}

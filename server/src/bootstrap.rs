//! Server-start state reset.
//!
//! Live state does not survive restarts: every location known to the
//! catalog is wiped from the store, re-seeded with its title, and given
//! a fresh dance-floor daemon.

use crate::catalog::Catalog;
use crate::dance;
use crate::error::EngineError;
use crate::store::Store;
use log::info;
use std::sync::Arc;

pub async fn reset_state(store: &Store, catalog: &Arc<Catalog>) -> Result<(), EngineError> {
    for location in catalog.locations() {
        store.wipe_location(&location.id).await?;
        store
            .set_location_title(&location.id, &location.title)
            .await?;

        let store = store.clone();
        let catalog = Arc::clone(catalog);
        let location = location.clone();
        tokio::spawn(async move {
            dance::run_dance_floor(store, catalog, location).await;
        });
    }

    info!(
        "initialized {} locations from the catalog",
        catalog.locations().len()
    );
    Ok(())
}

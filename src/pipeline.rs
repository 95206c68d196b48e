//! Admission pipeline shared by both ingestion paths: registry first, then
//! notification once the entry is on disk.

use std::sync::Arc;

use tracing::{info, warn};

use crate::notifier::Notifier;
use crate::registry::{Admission, Candidate, Registry, RegistryError};

pub struct Pipeline {
    registry: Arc<Registry>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(registry: Arc<Registry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    /// Offer a candidate to the registry and notify if it was admitted.
    ///
    /// The notification is sent after the registry lock is released and only
    /// for committed entries. A failed notification is logged and ignored.
    pub async fn submit(&self, candidate: Candidate) -> Result<Admission, RegistryError> {
        let admission = self.registry.admit(&candidate).await?;

        if let Admission::Admitted(entry) = &admission {
            info!(
                address = %entry.address_hex(),
                method = %entry.method_label(),
                source = %candidate.source,
                tx = %candidate.source_tx,
                "Admitted contract"
            );

            if let Err(e) = self.notifier.notify(entry).await {
                warn!(address = %entry.address_hex(), error = %e, "Failed to deliver notification");
            }
        }

        Ok(admission)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

//! Identity resolver: maps probe output onto endpoint fields.

use tracing::{debug, info, warn};

use crate::models::endpoint::EndpointAddress;
use crate::persistence::endpoint_repo::EndpointRepo;
use crate::protocol::Probe;

/// Writes identity probe results onto endpoint records.
#[derive(Clone)]
pub struct IdentityResolver {
    endpoints: EndpointRepo,
}

impl IdentityResolver {
    /// Create a resolver backed by `endpoints`.
    #[must_use]
    pub fn new(endpoints: EndpointRepo) -> Self {
        Self { endpoints }
    }

    /// Store `body` in the field mapped from `probe_name`.
    ///
    /// Unknown probe names are ignored. Store failures are logged and never
    /// propagate to the session. Returns whether a field was written.
    pub async fn resolve(&self, address: &EndpointAddress, probe_name: &str, body: &str) -> bool {
        let Some(probe) = Probe::from_name(probe_name) else {
            debug!(probe = probe_name, "ignoring unknown identity probe");
            return false;
        };

        match self
            .endpoints
            .update_field(address, probe.field(), body)
            .await
        {
            Ok(()) => {
                info!(%address, probe = probe.name(), value = body, "resolved endpoint identity");
                true
            }
            Err(err) => {
                warn!(%address, probe = probe.name(), %err, "failed to store endpoint identity");
                false
            }
        }
    }
}

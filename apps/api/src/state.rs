use std::sync::Arc;

use crate::proposal::service::ProposalService;

/// Shared application state injected into all route handlers via Axum
/// extractors. The service owns the only shared mutable state in the
/// process (rate-limit windows and the response cache).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProposalService>,
}

use async_trait::async_trait;
use tracing::{info, warn};

use dough_core::{FrontingEntry, Member, MentalState};

use crate::client::ApiClient;

/// Result of the one-time seed fetches. Each part is `None` when its fetch
/// failed, so the caller can keep whatever it already has for that part.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitialSnapshot {
    pub members: Option<Vec<Member>>,
    pub fronting: Option<FrontingEntry>,
    pub mental_state: Option<MentalState>,
    pub is_admin: bool,
}

impl InitialSnapshot {
    /// Whether every presence fetch succeeded.
    pub fn is_complete(&self) -> bool {
        self.members.is_some() && self.fronting.is_some()
    }
}

/// Anything that can produce a seed snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> InitialSnapshot;
}

#[async_trait]
impl SnapshotSource for ApiClient {
    async fn load(&self) -> InitialSnapshot {
        load_initial(self).await
    }
}

/// Issue the four independent seed requests concurrently. Failures are
/// logged and leave the matching part empty.
pub async fn load_initial(client: &ApiClient) -> InitialSnapshot {
    let (members, fronting, system, admin) = tokio::join!(
        client.members(),
        client.fronters(),
        client.system(),
        client.is_admin(),
    );

    let members = members
        .map_err(|e| warn!(error = %e, kind = e.error_kind(), "initial members fetch failed"))
        .ok();
    let fronting = fronting
        .map_err(|e| warn!(error = %e, kind = e.error_kind(), "initial fronters fetch failed"))
        .ok();
    let mental_state = system
        .map_err(|e| warn!(error = %e, kind = e.error_kind(), "initial system fetch failed"))
        .ok()
        .and_then(|s| s.mental_state);
    // Anonymous visitors get 401 here; that is the normal case.
    let is_admin = admin.unwrap_or(false);

    info!(
        members = members.as_ref().map_or(0, Vec::len),
        fronters = fronting.as_ref().map_or(0, |f| f.members.len()),
        has_mental_state = mental_state.is_some(),
        is_admin,
        "initial snapshot loaded"
    );

    InitialSnapshot {
        members,
        fronting,
        mental_state,
        is_admin,
    }
}

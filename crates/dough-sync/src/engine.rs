use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dough_api::{InitialSnapshot, SnapshotSource};
use dough_core::{Envelope, FrontingEntry, Member, MentalState};
use dough_settings::MetadataSettings;

use crate::banner::ConnectivityBanner;
use crate::cofront::{expand, ExpandedFrontingView};
use crate::dispatcher::{dispatch, PushHandler};
use crate::filter::{filter, grid_view, FilterState, TagFilter};
use crate::metadata::{MetadataSink, MetadataSynchronizer};
use crate::presence::PresenceModel;

const INPUT_QUEUE: usize = 256;

/// Everything that can change engine state, serialised through one queue.
#[derive(Debug)]
pub enum EngineInput {
    Push(Envelope),
    /// Result of a seed fetch tagged with the generation that requested it.
    Seed {
        generation: u64,
        snapshot: InitialSnapshot,
    },
    SetSearch(String),
    SetTagFilter(Option<TagFilter>),
    SetMatchPronouns(bool),
    SetConnected(bool),
    /// Re-run the seed fetches.
    Refetch,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineExit {
    /// The server asked for a full reload; start over with fresh state.
    Reload,
    Shutdown,
    Cancelled,
}

/// Derived views published after every state change.
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    pub version: u64,
    pub members: Vec<Member>,
    pub filtered: Vec<Member>,
    pub grid: Vec<Member>,
    pub fronting: ExpandedFrontingView,
    pub mental_state: Option<MentalState>,
    pub filter: FilterState,
    pub tags: Vec<String>,
    pub banner: ConnectivityBanner,
    pub is_admin: bool,
    pub seeded: bool,
}

/// Cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    inputs: mpsc::Sender<EngineInput>,
    views: watch::Receiver<Arc<ViewSnapshot>>,
}

impl EngineHandle {
    pub fn inputs(&self) -> mpsc::Sender<EngineInput> {
        self.inputs.clone()
    }

    pub fn views(&self) -> watch::Receiver<Arc<ViewSnapshot>> {
        self.views.clone()
    }

    pub fn current(&self) -> Arc<ViewSnapshot> {
        Arc::clone(&*self.views.borrow())
    }

    /// Returns `false` once the engine is gone.
    pub async fn send(&self, input: EngineInput) -> bool {
        self.inputs.send(input).await.is_ok()
    }
}

/// Aggregates pushed while a seed fetch was outstanding.
#[derive(Debug, Default)]
struct PushedSinceSeed {
    members: bool,
    fronting: bool,
    mental_state: bool,
    upserts: Vec<Member>,
}

/// Single-owner state machine: applies inputs in arrival order, recomputes
/// derived views, and keeps document metadata in step.
pub struct SyncEngine<S> {
    presence: PresenceModel,
    filter: FilterState,
    banner: ConnectivityBanner,
    metadata: MetadataSynchronizer<S>,
    source: Arc<dyn SnapshotSource>,
    inputs_tx: mpsc::Sender<EngineInput>,
    inputs_rx: mpsc::Receiver<EngineInput>,
    views: watch::Sender<Arc<ViewSnapshot>>,
    generation: u64,
    seed_in_flight: bool,
    pushed: PushedSinceSeed,
    ever_connected: bool,
    is_admin: bool,
    seeded: bool,
    version: u64,
    dirty: bool,
    reload: bool,
}

impl<S: MetadataSink> SyncEngine<S> {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        sink: S,
        defaults: MetadataSettings,
        banner_grace: Duration,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::channel(INPUT_QUEUE);
        let banner = ConnectivityBanner::new(banner_grace);
        let (views, _) = watch::channel(Arc::new(ViewSnapshot {
            version: 0,
            members: Vec::new(),
            filtered: Vec::new(),
            grid: Vec::new(),
            fronting: ExpandedFrontingView::default(),
            mental_state: None,
            filter: FilterState::default(),
            tags: Vec::new(),
            banner,
            is_admin: false,
            seeded: false,
        }));
        Self {
            presence: PresenceModel::new(),
            filter: FilterState::default(),
            banner,
            metadata: MetadataSynchronizer::new(sink, defaults),
            source,
            inputs_tx,
            inputs_rx,
            views,
            generation: 0,
            seed_in_flight: false,
            pushed: PushedSinceSeed::default(),
            ever_connected: false,
            is_admin: false,
            seeded: false,
            version: 0,
            dirty: false,
            reload: false,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            inputs: self.inputs_tx.clone(),
            views: self.views.subscribe(),
        }
    }

    pub fn presence(&self) -> &PresenceModel {
        &self.presence
    }

    pub fn metadata(&self) -> &MetadataSynchronizer<S> {
        &self.metadata
    }

    /// Generation of the most recent seed request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a seed fetch in the background. Only the latest request's result
    /// is applied; earlier ones are dropped when they arrive.
    pub fn request_seed(&mut self) {
        self.generation += 1;
        self.seed_in_flight = true;
        self.pushed = PushedSinceSeed::default();

        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.inputs_tx.clone();
        debug!(generation, "requesting seed");
        tokio::spawn(async move {
            let snapshot = source.load().await;
            if tx.send(EngineInput::Seed { generation, snapshot }).await.is_err() {
                debug!(generation, "engine gone before seed arrived");
            }
        });
    }

    /// Apply one input. Returns `Some` when the engine should stop.
    pub fn apply(&mut self, input: EngineInput) -> Option<EngineExit> {
        match input {
            EngineInput::Push(envelope) => {
                debug!(
                    event_type = envelope.event.event_type(),
                    sent_at = ?envelope.sent_at,
                    "applying push"
                );
                dispatch(envelope.event, self);
            }
            EngineInput::Seed {
                generation,
                snapshot,
            } => self.apply_seed(generation, snapshot),
            EngineInput::SetSearch(search) => {
                if self.filter.search != search {
                    self.filter.search = search;
                    self.dirty = true;
                }
            }
            EngineInput::SetTagFilter(tag) => {
                if self.filter.tag != tag {
                    self.filter.tag = tag;
                    self.dirty = true;
                }
            }
            EngineInput::SetMatchPronouns(enabled) => {
                if self.filter.match_pronouns != enabled {
                    self.filter.match_pronouns = enabled;
                    self.dirty = true;
                }
            }
            EngineInput::SetConnected(connected) => {
                if self.banner.set_connected(connected, Instant::now()) {
                    self.dirty = true;
                    if connected {
                        if self.ever_connected {
                            info!("push channel back; refreshing state");
                            self.request_seed();
                        }
                        self.ever_connected = true;
                    }
                }
            }
            EngineInput::Refetch => self.request_seed(),
            EngineInput::Shutdown => return Some(EngineExit::Shutdown),
        }

        if self.reload {
            return Some(EngineExit::Reload);
        }
        if std::mem::take(&mut self.dirty) {
            self.publish();
        }
        None
    }

    fn apply_seed(&mut self, generation: u64, snapshot: InitialSnapshot) {
        if !self.seed_in_flight || generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale seed");
            return;
        }
        self.seed_in_flight = false;
        let pushed = std::mem::take(&mut self.pushed);
        if !snapshot.is_complete() {
            warn!(generation, "seed incomplete; relying on pushes for missing parts");
        }

        if !pushed.members {
            if let Some(members) = snapshot.members {
                self.dirty |= self.presence.replace_members(members);
            }
            // Cofront changes pushed while the fetch was outstanding are newer
            // than anything the fetch returned.
            for member in pushed.upserts {
                self.dirty |= self.presence.upsert_member(member);
            }
        }
        if !pushed.fronting {
            if let Some(entry) = snapshot.fronting {
                self.dirty |= self.presence.replace_fronting(entry);
            }
        }
        if !pushed.mental_state {
            self.dirty |= self.presence.replace_mental_state(snapshot.mental_state);
        }
        if self.is_admin != snapshot.is_admin {
            self.is_admin = snapshot.is_admin;
            self.dirty = true;
        }
        if !self.seeded {
            self.seeded = true;
            self.dirty = true;
        }
        info!(
            generation,
            members = self.presence.members().len(),
            fronters = self.presence.fronting().members.len(),
            "seed applied"
        );
    }

    fn publish(&mut self) {
        let fronting = expand(self.presence.fronting(), &self.presence);
        self.metadata.sync(&fronting);
        let filtered = filter(self.presence.members(), &self.filter);
        let grid = grid_view(&filtered);
        self.version += 1;
        self.views.send_replace(Arc::new(ViewSnapshot {
            version: self.version,
            members: self.presence.members().to_vec(),
            filtered,
            grid,
            fronting,
            mental_state: self.presence.mental_state().cloned(),
            filter: self.filter.clone(),
            tags: self.presence.all_tags(),
            banner: self.banner,
            is_admin: self.is_admin,
            seeded: self.seeded,
        }));
    }

    /// Seed, then apply inputs until told to stop.
    pub async fn run(&mut self, cancel: &CancellationToken) -> EngineExit {
        self.request_seed();
        self.publish();
        loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => return EngineExit::Cancelled,
                input = self.inputs_rx.recv() => input,
            };
            // The engine keeps a sender of its own, so the queue stays open.
            let Some(input) = input else {
                return EngineExit::Cancelled;
            };
            if let Some(exit) = self.apply(input) {
                info!(exit = ?exit, "engine stopping");
                return exit;
            }
        }
    }
}

impl<S: MetadataSink> PushHandler for SyncEngine<S> {
    fn on_fronting_update(&mut self, entry: FrontingEntry) {
        self.pushed.fronting = true;
        self.dirty |= self.presence.replace_fronting(entry);
    }

    fn on_mental_state_update(&mut self, state: Option<MentalState>) {
        if state.is_some() {
            self.pushed.mental_state = true;
        }
        self.dirty |= self.presence.replace_mental_state(state);
    }

    fn on_members_update(&mut self, members: Vec<Member>) {
        self.pushed.members = true;
        self.pushed.upserts.clear();
        self.dirty |= self.presence.replace_members(members);
    }

    fn on_cofront_update(&mut self, cofront: Member) {
        if self.seed_in_flight {
            self.pushed.upserts.push(cofront.clone());
        }
        self.dirty |= self.presence.upsert_member(cofront);
    }

    fn on_force_refresh(&mut self, message: Option<String>) {
        info!(message = message.as_deref().unwrap_or(""), "server requested reload");
        self.presence.reset();
        self.reload = true;
    }
}

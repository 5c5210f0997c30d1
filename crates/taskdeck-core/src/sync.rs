//! Optimistic mutation engine.
//!
//! Each user action runs as one linear async task:
//!
//! | Action        | Local change                  | On failure                    |
//! |---------------|-------------------------------|-------------------------------|
//! | add           | provisional entry, up front   | entry removed                 |
//! | update status | new status, up front          | full re-fetch replaces store  |
//! | delete one    | removal after server ack      | item stays                    |
//! | delete all    | clear after server ack        | collection stays              |
//!
//! Errors never escape: they land on the [`ErrorSurface`] and in the
//! returned [`MutationReport`].

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;
use taskdeck_shared::{TaskDraft, TaskId, TaskItem, TaskStatus};
use tracing::{debug, info, instrument, warn};

use crate::confirm::{ConfirmationGate, Prompt};
use crate::error::SyncError;
use crate::gateway::TaskGateway;
use crate::queue::ItemQueues;
use crate::store::TaskStore;
use crate::surface::{ErrorSurface, Notice};
use crate::task::{Board, DraftForm, MISSING_FIELDS};

pub const DELETE_ONE_PROMPT: &str = "Delete this todo?";
pub const DELETE_ALL_PROMPT: &str = "Are you sure you want to delete all todos?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Queue status updates and deletes per item.
    pub serialize_per_item: bool,
    /// Re-fetch the whole list after an add commits.
    pub refresh_after_create: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            serialize_per_item: true,
            refresh_after_create: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    UpdateStatus,
    DeleteOne,
    DeleteAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
    Committed,
    RolledBack,
}

impl MutationState {
    pub fn can_advance_to(self, next: MutationState) -> bool {
        matches!(
            (self, next),
            (MutationState::Idle, MutationState::Pending)
                | (MutationState::Pending, MutationState::Committed)
                | (MutationState::Pending, MutationState::RolledBack)
        )
    }
}

/// Why a mutation never reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Invalid,
    Busy,
    Declined,
    NothingPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub kind: MutationKind,
    pub state: MutationState,
    pub skipped: Option<SkipReason>,
    pub error: Option<SyncError>,
}

impl MutationReport {
    pub fn is_committed(&self) -> bool {
        self.state == MutationState::Committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.state == MutationState::RolledBack
    }
}

#[derive(Debug)]
struct Mutation {
    kind: MutationKind,
    state: MutationState,
}

impl Mutation {
    fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            state: MutationState::Idle,
        }
    }

    fn advance(&mut self, next: MutationState) {
        if !self.state.can_advance_to(next) {
            warn!(kind = ?self.kind, from = ?self.state, to = ?next, "ignoring invalid mutation transition");
            return;
        }
        debug!(kind = ?self.kind, from = ?self.state, to = ?next, "mutation transition");
        self.state = next;
    }

    fn skip(self, reason: SkipReason, error: Option<SyncError>) -> MutationReport {
        debug!(kind = ?self.kind, ?reason, "mutation skipped");
        MutationReport {
            kind: self.kind,
            state: self.state,
            skipped: Some(reason),
            error,
        }
    }

    fn finish(self, error: Option<SyncError>) -> MutationReport {
        MutationReport {
            kind: self.kind,
            state: self.state,
            skipped: None,
            error,
        }
    }
}

/// Set while an add or delete-all is in flight.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Applies task mutations locally and reconciles them with the remote
/// store. Locks are never held across an await.
pub struct SyncController<G> {
    gateway: G,
    options: SyncOptions,
    store: Mutex<TaskStore>,
    surface: Mutex<ErrorSurface>,
    gate: Mutex<ConfirmationGate>,
    queues: ItemQueues,
    busy: AtomicBool,
    next_provisional: AtomicI64,
}

impl<G: TaskGateway> SyncController<G> {
    pub fn new(gateway: G, options: SyncOptions) -> Self {
        Self {
            gateway,
            options,
            store: Mutex::new(TaskStore::new()),
            surface: Mutex::new(ErrorSurface::default()),
            gate: Mutex::new(ConfirmationGate::default()),
            queues: ItemQueues::new(options.serialize_per_item),
            busy: AtomicBool::new(false),
            next_provisional: AtomicI64::new(-1),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn tasks(&self) -> Vec<TaskItem> {
        self.store.lock().list()
    }

    pub fn task(&self, id: TaskId) -> Option<TaskItem> {
        self.store.lock().get(id).cloned()
    }

    pub fn board(&self) -> Board {
        Board::from_items(&self.tasks())
    }

    pub fn notice(&self) -> Option<Notice> {
        self.surface.lock().current().cloned()
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.surface.lock().error().cloned()
    }

    /// Called when the user focuses an input.
    pub fn dismiss_notice(&self) {
        self.surface.lock().clear();
    }

    pub fn inform(&self, text: impl Into<String>) {
        self.surface.lock().inform(text);
    }

    pub fn pending_delete(&self) -> Option<TaskId> {
        self.gate.lock().pending_target()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Replaces the store with the server's list. On failure the store is
    /// left untouched.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        self.dismiss_notice();
        self.reload().await.inspect_err(|err| self.report(err))
    }

    /// Validates the form and adds it. The fields are cleared only when the
    /// add commits.
    pub async fn submit(&self, form: &mut DraftForm) -> MutationReport {
        self.submit_all(std::slice::from_mut(form)).await
    }

    /// Validates every form and adds them as one batch.
    #[instrument(skip(self, forms), fields(count = forms.len()))]
    pub async fn submit_all(&self, forms: &mut [DraftForm]) -> MutationReport {
        self.dismiss_notice();
        let drafts = match forms.iter().map(DraftForm::to_draft).collect::<Result<Vec<_>, _>>() {
            Ok(drafts) => drafts,
            Err(err) => {
                self.report(&err);
                return Mutation::new(MutationKind::Add).skip(SkipReason::Invalid, Some(err));
            }
        };

        let report = self.add(drafts).await;
        if report.is_committed() {
            forms.iter_mut().for_each(DraftForm::reset);
        }
        report
    }

    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    pub async fn add(&self, drafts: Vec<TaskDraft>) -> MutationReport {
        let mut mutation = Mutation::new(MutationKind::Add);
        if drafts.is_empty() || drafts.iter().any(|d| d.task.trim().is_empty()) {
            let err = SyncError::validation(MISSING_FIELDS);
            self.report(&err);
            return mutation.skip(SkipReason::Invalid, Some(err));
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            return mutation.skip(SkipReason::Busy, None);
        };
        self.dismiss_notice();

        let provisional: Vec<TaskItem> = drafts
            .iter()
            .map(|draft| TaskItem {
                id: self.next_provisional.fetch_sub(1, Ordering::Relaxed),
                task: draft.task.clone(),
                due_date: draft.due_date,
                status: TaskStatus::Backlog,
            })
            .collect();
        {
            let mut store = self.store.lock();
            for item in &provisional {
                store.upsert(item.clone());
            }
        }
        mutation.advance(MutationState::Pending);

        match self.gateway.create(&drafts).await {
            Ok(created) => {
                mutation.advance(MutationState::Committed);
                self.reconcile_created(&provisional, created);
                info!(count = provisional.len(), "add committed");

                if self.options.refresh_after_create
                    && let Err(err) = self.reload().await
                {
                    self.report(&err);
                }
                mutation.finish(None)
            }
            Err(err) => {
                mutation.advance(MutationState::RolledBack);
                {
                    let mut store = self.store.lock();
                    for item in &provisional {
                        store.remove(item.id);
                    }
                }
                warn!(error = %err, "add rolled back");
                self.report(&err);
                mutation.finish(Some(err))
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: TaskId, status: TaskStatus) -> MutationReport {
        let mut mutation = Mutation::new(MutationKind::UpdateStatus);
        self.dismiss_notice();
        if let Err(err) = check_server_id(id) {
            self.report(&err);
            return mutation.skip(SkipReason::Invalid, Some(err));
        }

        let _turn = self.queues.turn(id).await;
        let previous = self.store.lock().get(id).cloned();
        let Some(previous) = previous else {
            let err = SyncError::validation(format!("No task with id {id}"));
            self.report(&err);
            return mutation.skip(SkipReason::Invalid, Some(err));
        };

        self.store.lock().upsert(TaskItem {
            status,
            ..previous.clone()
        });
        mutation.advance(MutationState::Pending);

        match self.gateway.update_status(id, status).await {
            Ok(()) => {
                mutation.advance(MutationState::Committed);
                info!(id, %status, "status update committed");
                mutation.finish(None)
            }
            Err(err) => {
                mutation.advance(MutationState::RolledBack);
                warn!(id, %status, error = %err, "status update rejected; re-fetching");
                if let Err(fetch_err) = self.reload().await {
                    warn!(id, error = %fetch_err, "re-fetch failed; reverting status locally");
                    let mut store = self.store.lock();
                    if let Some(current) = store.get(id).cloned()
                        && current.status == status
                    {
                        store.upsert(TaskItem {
                            status: previous.status,
                            ..current
                        });
                    }
                }
                self.report(&err);
                mutation.finish(Some(err))
            }
        }
    }

    /// Opens the confirmation gate for `id`. Returns false when there is no
    /// such confirmed item.
    pub fn request_delete(&self, id: TaskId) -> bool {
        self.dismiss_notice();
        if check_server_id(id).is_err() || !self.store.lock().contains(id) {
            debug!(id, "delete requested for unknown item");
            return false;
        }
        self.gate.lock().request(id);
        true
    }

    pub fn cancel_delete(&self) -> Option<TaskId> {
        self.gate.lock().cancel()
    }

    /// Deletes the item held by the gate, if any.
    pub async fn confirm_delete(&self) -> MutationReport {
        let run = self.gate.lock().confirm(|id| self.delete_confirmed(id));
        match run {
            Some(run) => run.await,
            None => Mutation::new(MutationKind::DeleteOne).skip(SkipReason::NothingPending, None),
        }
    }

    #[instrument(skip(self))]
    async fn delete_confirmed(&self, id: TaskId) -> MutationReport {
        let mut mutation = Mutation::new(MutationKind::DeleteOne);
        self.dismiss_notice();

        let _turn = self.queues.turn(id).await;
        mutation.advance(MutationState::Pending);
        match self.gateway.delete_one(id).await {
            Ok(()) => {
                self.store.lock().remove(id);
                mutation.advance(MutationState::Committed);
                info!(id, "delete committed");
                mutation.finish(None)
            }
            Err(err) => {
                mutation.advance(MutationState::RolledBack);
                warn!(id, error = %err, "delete rejected; item kept");
                self.report(&err);
                mutation.finish(Some(err))
            }
        }
    }

    #[instrument(skip(self, prompt))]
    pub async fn delete_all<P>(&self, prompt: &P) -> MutationReport
    where
        P: Prompt + ?Sized,
    {
        let mut mutation = Mutation::new(MutationKind::DeleteAll);
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            return mutation.skip(SkipReason::Busy, None);
        };
        if !prompt.confirm(DELETE_ALL_PROMPT) {
            return mutation.skip(SkipReason::Declined, None);
        }
        self.dismiss_notice();

        mutation.advance(MutationState::Pending);
        match self.gateway.delete_all().await {
            Ok(()) => {
                self.store.lock().clear();
                mutation.advance(MutationState::Committed);
                info!("delete all committed");
                mutation.finish(None)
            }
            Err(err) => {
                mutation.advance(MutationState::RolledBack);
                warn!(error = %err, "delete all rejected; collection kept");
                self.report(&err);
                mutation.finish(Some(err))
            }
        }
    }

    async fn reload(&self) -> Result<usize, SyncError> {
        let items = self.gateway.fetch_all().await?;
        let mut store = self.store.lock();
        store.replace_all(items);
        Ok(store.len())
    }

    fn reconcile_created(&self, provisional: &[TaskItem], created: Vec<TaskItem>) {
        if created.len() != provisional.len() {
            if created.is_empty() {
                debug!("server returned no ids; keeping provisional entries");
            } else {
                warn!(
                    submitted = provisional.len(),
                    returned = created.len(),
                    "create response does not match the batch; keeping provisional entries"
                );
            }
            return;
        }

        let mut store = self.store.lock();
        for (local, remote) in provisional.iter().zip(created) {
            debug!(provisional = local.id, id = remote.id, "reconciled task id");
            store.rekey(local.id, remote);
        }
    }

    fn report(&self, err: &SyncError) {
        self.surface.lock().report(err);
    }
}

fn check_server_id(id: TaskId) -> Result<(), SyncError> {
    if id < 0 {
        return Err(SyncError::validation("Task is still being saved"));
    }
    Ok(())
}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use taskdeck_core::error::{Operation, SyncError};
use taskdeck_core::gateway::TaskGateway;
use taskdeck_core::sync::{MutationKind, MutationState, SkipReason, SyncController, SyncOptions};
use taskdeck_core::task::{BAD_DUE_DATE, DraftForm, MISSING_FIELDS};
use taskdeck_shared::{TaskDraft, TaskId, TaskItem, TaskStatus};
use tokio::sync::Notify;
use tokio::time::timeout;

const SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    FetchAll,
    Create(Vec<String>),
    UpdateStatus(TaskId, TaskStatus),
    DeleteOne(TaskId),
    DeleteAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Hold {
    Create,
    Update(TaskId, TaskStatus),
    Delete(TaskId),
}

#[derive(Debug, Default)]
struct FakeState {
    remote: Vec<TaskItem>,
    calls: Vec<Call>,
    failing: Vec<Operation>,
    failing_updates: HashSet<TaskId>,
    echo_created: bool,
    next_id: TaskId,
}

/// In-memory remote store with scripted failures and pausable calls.
#[derive(Debug, Default)]
struct FakeGateway {
    state: Mutex<FakeState>,
    holds: Mutex<HashMap<Hold, Arc<Notify>>>,
}

impl FakeGateway {
    fn with_items(items: Vec<TaskItem>) -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.state.lock();
            state.remote = items;
            state.next_id = 100;
        }
        gateway
    }

    fn echo_created(&self) {
        self.state.lock().echo_created = true;
    }

    fn fail(&self, operation: Operation) {
        self.state.lock().failing.push(operation);
    }

    fn fail_update_for(&self, id: TaskId) {
        self.state.lock().failing_updates.insert(id);
    }

    fn heal(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.failing_updates.clear();
    }

    /// The matching call blocks until the returned handle is notified.
    fn hold(&self, hold: Hold) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds.lock().insert(hold, notify.clone());
        notify
    }

    fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn remote(&self) -> Vec<TaskItem> {
        self.state.lock().remote.clone()
    }

    fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::FetchAll)
            .count()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn check(&self, operation: Operation) -> Result<(), SyncError> {
        if self.state.lock().failing.contains(&operation) {
            return Err(server_error(operation));
        }
        Ok(())
    }

    async fn wait_if_held(&self, hold: Hold) {
        let notify = self.holds.lock().remove(&hold);
        if let Some(notify) = notify {
            notify.notified().await;
        }
    }
}

fn server_error(operation: Operation) -> SyncError {
    SyncError::Server {
        operation,
        status: 500,
        message: None,
    }
}

#[async_trait]
impl TaskGateway for FakeGateway {
    async fn fetch_all(&self) -> Result<Vec<TaskItem>, SyncError> {
        self.record(Call::FetchAll);
        self.check(Operation::FetchAll)?;
        Ok(self.remote())
    }

    async fn create(&self, drafts: &[TaskDraft]) -> Result<Vec<TaskItem>, SyncError> {
        self.record(Call::Create(
            drafts.iter().map(|draft| draft.task.clone()).collect(),
        ));
        self.wait_if_held(Hold::Create).await;
        self.check(Operation::Create)?;

        let mut state = self.state.lock();
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let item = TaskItem {
                id: state.next_id,
                task: draft.task.clone(),
                due_date: draft.due_date,
                status: TaskStatus::Backlog,
            };
            state.next_id += 1;
            state.remote.push(item.clone());
            created.push(item);
        }

        if state.echo_created {
            Ok(created)
        } else {
            Ok(Vec::new())
        }
    }

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), SyncError> {
        self.record(Call::UpdateStatus(id, status));
        self.wait_if_held(Hold::Update(id, status)).await;
        self.check(Operation::UpdateStatus)?;

        let mut state = self.state.lock();
        if state.failing_updates.contains(&id) {
            return Err(server_error(Operation::UpdateStatus));
        }
        match state.remote.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                Ok(())
            }
            None => Err(SyncError::Server {
                operation: Operation::UpdateStatus,
                status: 404,
                message: Some("Todo not found".to_string()),
            }),
        }
    }

    async fn delete_one(&self, id: TaskId) -> Result<(), SyncError> {
        self.record(Call::DeleteOne(id));
        self.wait_if_held(Hold::Delete(id)).await;
        self.check(Operation::DeleteOne)?;
        self.state.lock().remote.retain(|item| item.id != id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), SyncError> {
        self.record(Call::DeleteAll);
        self.check(Operation::DeleteAll)?;
        self.state.lock().remote.clear();
        Ok(())
    }
}

fn due() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}

fn item(id: TaskId, task: &str, status: TaskStatus) -> TaskItem {
    TaskItem {
        id,
        task: task.to_string(),
        due_date: due(),
        status,
    }
}

fn serialized() -> SyncOptions {
    SyncOptions::default()
}

async fn board_with(items: Vec<TaskItem>, options: SyncOptions) -> SyncController<FakeGateway> {
    let controller = SyncController::new(FakeGateway::with_items(items), options);
    controller.refresh().await.expect("initial fetch");
    controller.gateway().clear_calls();
    controller
}

fn assert_unique_ids(controller: &SyncController<FakeGateway>) {
    let tasks = controller.tasks();
    let ids: HashSet<TaskId> = tasks.iter().map(|task| task.id).collect();
    assert_eq!(ids.len(), tasks.len(), "duplicate ids in {tasks:?}");
}

fn error_text(controller: &SyncController<FakeGateway>) -> String {
    controller
        .notice()
        .filter(|notice| notice.is_error())
        .map(|notice| notice.text)
        .unwrap_or_default()
}

#[tokio::test]
async fn add_commits_into_backlog() {
    let controller = board_with(vec![], serialized()).await;
    let mut form = DraftForm::new("Write report", "2024-06-01");

    let report = controller.submit(&mut form).await;

    assert!(report.is_committed());
    assert_eq!(report.kind, MutationKind::Add);
    let tasks = controller.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task, "Write report");
    assert_eq!(tasks[0].due_date, due());
    assert_eq!(tasks[0].status, TaskStatus::Backlog);
    assert_eq!(form, DraftForm::default(), "form is cleared after commit");
    assert!(controller.notice().is_none());
}

#[tokio::test]
async fn failed_add_leaves_no_orphan() {
    let controller = board_with(vec![], serialized()).await;
    controller.gateway().fail(Operation::Create);
    let mut form = DraftForm::new("Write report", "2024-06-01");

    let report = controller.submit(&mut form).await;

    assert!(report.is_rolled_back());
    assert!(controller.tasks().is_empty());
    assert!(error_text(&controller).contains("Failed to add todo"));
    assert_eq!(form.task, "Write report", "form keeps its input for a retry");
}

#[tokio::test]
async fn status_update_commits_without_refetch() {
    let controller = board_with(vec![item(7, "Ship", TaskStatus::Today)], serialized()).await;

    let report = controller.update_status(7, TaskStatus::Done).await;

    assert!(report.is_committed());
    assert_eq!(
        controller.task(7).map(|task| task.status),
        Some(TaskStatus::Done)
    );
    assert_eq!(controller.gateway().fetch_count(), 0);
    assert_eq!(
        controller.gateway().calls(),
        vec![Call::UpdateStatus(7, TaskStatus::Done)]
    );
}

#[tokio::test]
async fn rejected_status_update_restores_server_list() {
    let controller = board_with(
        vec![
            item(7, "Ship", TaskStatus::Today),
            item(8, "Review", TaskStatus::Tomorrow),
        ],
        serialized(),
    )
    .await;
    controller.gateway().fail_update_for(7);

    let report = controller.update_status(7, TaskStatus::Done).await;

    assert!(report.is_rolled_back());
    assert_eq!(controller.gateway().fetch_count(), 1);
    assert_eq!(controller.tasks(), controller.gateway().remote());
    assert_eq!(
        controller.task(7).map(|task| task.status),
        Some(TaskStatus::Today)
    );
    assert_eq!(error_text(&controller), "Failed to update todo");
    assert_eq!(
        controller.last_error(),
        Some(server_error(Operation::UpdateStatus))
    );
}

#[tokio::test]
async fn rejected_status_update_reverts_locally_when_refetch_fails() {
    let controller = board_with(vec![item(7, "Ship", TaskStatus::Today)], serialized()).await;
    controller.gateway().fail(Operation::UpdateStatus);
    controller.gateway().fail(Operation::FetchAll);

    let report = controller.update_status(7, TaskStatus::Done).await;

    assert!(report.is_rolled_back());
    assert_eq!(
        controller.task(7).map(|task| task.status),
        Some(TaskStatus::Today)
    );
    assert_eq!(
        report.error.and_then(|err| err.operation()),
        Some(Operation::UpdateStatus)
    );
}

#[tokio::test]
async fn cancelled_delete_touches_nothing() {
    let controller = board_with(vec![item(3, "Old", TaskStatus::Backlog)], serialized()).await;

    assert!(controller.request_delete(3));
    assert_eq!(controller.pending_delete(), Some(3));
    assert_eq!(controller.cancel_delete(), Some(3));

    assert_eq!(controller.pending_delete(), None);
    assert!(controller.task(3).is_some());
    assert!(controller.gateway().calls().is_empty());
}

#[tokio::test]
async fn confirmed_delete_removes_item() {
    let controller = board_with(
        vec![
            item(3, "Old", TaskStatus::Backlog),
            item(4, "New", TaskStatus::Today),
        ],
        serialized(),
    )
    .await;

    assert!(controller.request_delete(3));
    let report = controller.confirm_delete().await;

    assert!(report.is_committed());
    assert!(controller.task(3).is_none());
    assert!(controller.task(4).is_some());
    assert_eq!(controller.pending_delete(), None);
    assert_eq!(controller.gateway().calls(), vec![Call::DeleteOne(3)]);
}

#[tokio::test]
async fn item_stays_visible_until_delete_is_acknowledged() {
    let controller = board_with(vec![item(3, "Old", TaskStatus::Backlog)], serialized()).await;
    let release = controller.gateway().hold(Hold::Delete(3));

    assert!(controller.request_delete(3));
    let delete = controller.confirm_delete();
    tokio::pin!(delete);
    assert!(timeout(SETTLE, &mut delete).await.is_err());

    assert_eq!(controller.gateway().calls(), vec![Call::DeleteOne(3)]);
    assert_eq!(controller.pending_delete(), None);
    assert!(controller.task(3).is_some(), "removal waits for the server");

    release.notify_one();
    assert!(delete.await.is_committed());
    assert!(controller.task(3).is_none());
}

#[tokio::test]
async fn confirm_without_request_sends_nothing() {
    let controller = board_with(vec![item(3, "Old", TaskStatus::Backlog)], serialized()).await;

    let report = controller.confirm_delete().await;

    assert_eq!(report.skipped, Some(SkipReason::NothingPending));
    assert_eq!(report.state, MutationState::Idle);
    assert!(controller.gateway().calls().is_empty());
}

#[tokio::test]
async fn delete_of_unknown_or_unsaved_item_is_refused() {
    let controller = board_with(vec![item(3, "Old", TaskStatus::Backlog)], serialized()).await;

    assert!(!controller.request_delete(42));
    assert!(!controller.request_delete(-1));
    assert_eq!(controller.pending_delete(), None);
}

#[tokio::test]
async fn newer_delete_request_replaces_pending_one() {
    let controller = board_with(
        vec![
            item(3, "Old", TaskStatus::Backlog),
            item(4, "New", TaskStatus::Today),
        ],
        serialized(),
    )
    .await;

    assert!(controller.request_delete(3));
    assert!(controller.request_delete(4));
    controller.confirm_delete().await;

    assert!(controller.task(3).is_some());
    assert!(controller.task(4).is_none());
}

#[tokio::test]
async fn failed_delete_keeps_item() {
    let controller = board_with(vec![item(3, "Old", TaskStatus::Backlog)], serialized()).await;
    controller.gateway().fail(Operation::DeleteOne);

    assert!(controller.request_delete(3));
    let report = controller.confirm_delete().await;

    assert!(report.is_rolled_back());
    assert!(controller.task(3).is_some());
    assert_eq!(error_text(&controller), "Failed to delete todo");
}

#[tokio::test]
async fn delete_all_follows_the_prompt() {
    let controller = board_with(
        vec![
            item(1, "A", TaskStatus::Backlog),
            item(2, "B", TaskStatus::Done),
        ],
        serialized(),
    )
    .await;

    let declined = controller.delete_all(&|_: &str| false).await;
    assert_eq!(declined.skipped, Some(SkipReason::Declined));
    assert_eq!(controller.tasks().len(), 2);
    assert!(controller.gateway().calls().is_empty());

    controller.gateway().fail(Operation::DeleteAll);
    let failed = controller.delete_all(&|_: &str| true).await;
    assert!(failed.is_rolled_back());
    assert_eq!(controller.tasks().len(), 2);
    assert_eq!(error_text(&controller), "Failed to delete todos");

    controller.gateway().heal();
    let asked = Mutex::new(Vec::new());
    let cleared = controller
        .delete_all(&|message: &str| {
            asked.lock().push(message.to_string());
            true
        })
        .await;
    assert!(cleared.is_committed());
    assert!(controller.tasks().is_empty());
    assert_eq!(
        *asked.lock(),
        vec!["Are you sure you want to delete all todos?".to_string()]
    );
}

#[tokio::test]
async fn blank_or_malformed_forms_never_reach_the_server() {
    let controller = board_with(vec![], serialized()).await;

    let mut blank = DraftForm::new("   ", "2024-06-01");
    let report = controller.submit(&mut blank).await;
    assert_eq!(report.skipped, Some(SkipReason::Invalid));
    assert_eq!(error_text(&controller), MISSING_FIELDS);

    let mut no_date = DraftForm::new("Write report", "");
    controller.submit(&mut no_date).await;
    assert_eq!(error_text(&controller), MISSING_FIELDS);

    let mut bad_date = DraftForm::new("Write report", "next tuesday");
    controller.submit(&mut bad_date).await;
    assert_eq!(error_text(&controller), BAD_DUE_DATE);

    let empty = controller.add(Vec::new()).await;
    assert_eq!(empty.skipped, Some(SkipReason::Invalid));

    assert!(controller.tasks().is_empty());
    assert!(controller.gateway().calls().is_empty());
    assert_eq!(bad_date.task, "Write report");
}

#[tokio::test]
async fn batch_add_is_one_request() {
    let controller = board_with(vec![], serialized()).await;
    let mut forms = vec![
        DraftForm::new("Write report", "2024-06-01"),
        DraftForm::new("Send invoice", "2024-06-01"),
    ];

    let report = controller.submit_all(&mut forms).await;

    assert!(report.is_committed());
    assert_eq!(
        controller.gateway().calls(),
        vec![Call::Create(vec![
            "Write report".to_string(),
            "Send invoice".to_string()
        ])]
    );
    assert_eq!(controller.tasks().len(), 2);
    assert_unique_ids(&controller);
}

#[tokio::test]
async fn unechoed_creates_keep_provisional_ids() {
    let controller = board_with(vec![], serialized()).await;

    controller
        .add(vec![TaskDraft::new("Write report", due())])
        .await;
    let tasks = controller.tasks();
    assert_eq!(tasks.len(), 1);
    let provisional = tasks[0].id;
    assert!(provisional < 0);

    let report = controller
        .update_status(provisional, TaskStatus::Done)
        .await;
    assert_eq!(report.skipped, Some(SkipReason::Invalid));
    assert_eq!(error_text(&controller), "Task is still being saved");
    assert!(!controller.request_delete(provisional));

    controller.refresh().await.expect("refresh");
    let tasks = controller.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, 100);
}

#[tokio::test]
async fn echoed_creates_take_server_ids() {
    let controller = board_with(vec![item(1, "A", TaskStatus::Today)], serialized()).await;
    controller.gateway().echo_created();

    controller
        .add(vec![
            TaskDraft::new("B", due()),
            TaskDraft::new("C", due()),
        ])
        .await;

    let ids: Vec<TaskId> = controller.tasks().iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![1, 100, 101]);

    let report = controller.update_status(101, TaskStatus::Today).await;
    assert!(report.is_committed());
}

#[tokio::test]
async fn refresh_after_create_replaces_provisional_entries() {
    let options = SyncOptions {
        refresh_after_create: true,
        ..SyncOptions::default()
    };
    let controller = board_with(vec![], options).await;

    controller
        .add(vec![TaskDraft::new("Write report", due())])
        .await;

    assert_eq!(controller.gateway().fetch_count(), 1);
    assert_eq!(controller.tasks(), controller.gateway().remote());
}

#[tokio::test]
async fn failed_initial_fetch_surfaces_and_keeps_store() {
    let controller = SyncController::new(
        FakeGateway::with_items(vec![item(1, "A", TaskStatus::Today)]),
        serialized(),
    );
    controller.gateway().fail(Operation::FetchAll);

    let err = controller.refresh().await.expect_err("fetch fails");

    assert!(err.is_server());
    assert!(controller.tasks().is_empty());
    assert_eq!(error_text(&controller), "Failed to fetch todos");

    controller.dismiss_notice();
    assert!(controller.notice().is_none());
}

#[tokio::test]
async fn new_action_clears_previous_error() {
    let controller = board_with(vec![item(7, "Ship", TaskStatus::Today)], serialized()).await;
    controller.gateway().fail(Operation::DeleteOne);
    controller.request_delete(7);
    controller.confirm_delete().await;
    assert!(!error_text(&controller).is_empty());

    controller.update_status(7, TaskStatus::Done).await;
    assert!(controller.notice().is_none());
}

#[tokio::test]
async fn add_while_add_in_flight_is_skipped() {
    let controller = board_with(vec![], serialized()).await;
    let release = controller.gateway().hold(Hold::Create);

    let first = controller.add(vec![TaskDraft::new("A", due())]);
    tokio::pin!(first);
    assert!(timeout(SETTLE, &mut first).await.is_err());
    assert!(controller.is_busy());
    assert_eq!(controller.tasks().len(), 1, "provisional entry is visible");

    let second = controller.add(vec![TaskDraft::new("B", due())]).await;
    assert_eq!(second.skipped, Some(SkipReason::Busy));
    let clear = controller.delete_all(&|_: &str| true).await;
    assert_eq!(clear.skipped, Some(SkipReason::Busy));

    release.notify_one();
    let first = first.await;
    assert!(first.is_committed());
    assert!(!controller.is_busy());
    assert_eq!(
        controller.gateway().calls(),
        vec![Call::Create(vec!["A".to_string()])]
    );
}

#[tokio::test]
async fn same_item_updates_reach_server_in_issue_order() {
    let controller = board_with(vec![item(7, "Ship", TaskStatus::Today)], serialized()).await;
    let release = controller
        .gateway()
        .hold(Hold::Update(7, TaskStatus::InProgress));

    let first = controller.update_status(7, TaskStatus::InProgress);
    let second = controller.update_status(7, TaskStatus::Done);
    tokio::pin!(first);
    tokio::pin!(second);

    assert!(timeout(SETTLE, &mut first).await.is_err());
    assert!(timeout(SETTLE, &mut second).await.is_err());
    assert_eq!(
        controller.gateway().calls(),
        vec![Call::UpdateStatus(7, TaskStatus::InProgress)],
        "second update waits for the first to reconcile"
    );

    release.notify_one();
    let (first, second) = tokio::join!(first, second);
    assert!(first.is_committed());
    assert!(second.is_committed());
    assert_eq!(
        controller.gateway().calls(),
        vec![
            Call::UpdateStatus(7, TaskStatus::InProgress),
            Call::UpdateStatus(7, TaskStatus::Done),
        ]
    );
    assert_eq!(
        controller.task(7).map(|task| task.status),
        Some(TaskStatus::Done)
    );
    assert_eq!(controller.gateway().remote()[0].status, TaskStatus::Done);
}

#[tokio::test]
async fn unserialized_updates_overlap() {
    let options = SyncOptions {
        serialize_per_item: false,
        ..SyncOptions::default()
    };
    let controller = board_with(vec![item(7, "Ship", TaskStatus::Today)], options).await;
    let release = controller
        .gateway()
        .hold(Hold::Update(7, TaskStatus::InProgress));

    let first = controller.update_status(7, TaskStatus::InProgress);
    tokio::pin!(first);
    assert!(timeout(SETTLE, &mut first).await.is_err());

    let second = timeout(SETTLE, controller.update_status(7, TaskStatus::Done))
        .await
        .expect("second update is not queued");
    assert!(second.is_committed());

    release.notify_one();
    assert!(first.await.is_committed());
    // the remote applied the older request last
    assert_eq!(
        controller.gateway().remote()[0].status,
        TaskStatus::InProgress
    );
}

#[tokio::test]
async fn rollback_refetch_discards_other_items_in_flight_edit() {
    let controller = board_with(
        vec![
            item(1, "A", TaskStatus::Today),
            item(2, "B", TaskStatus::Today),
        ],
        serialized(),
    )
    .await;
    let release = controller.gateway().hold(Hold::Update(1, TaskStatus::Done));
    controller.gateway().fail_update_for(2);

    let first = controller.update_status(1, TaskStatus::Done);
    tokio::pin!(first);
    assert!(timeout(SETTLE, &mut first).await.is_err());
    assert_eq!(
        controller.task(1).map(|task| task.status),
        Some(TaskStatus::Done)
    );

    let second = controller.update_status(2, TaskStatus::Done).await;
    assert!(second.is_rolled_back());
    assert_eq!(
        controller.task(1).map(|task| task.status),
        Some(TaskStatus::Today),
        "re-fetch replaced the whole list"
    );

    release.notify_one();
    assert!(first.await.is_committed());
    assert_eq!(
        controller.task(1).map(|task| task.status),
        Some(TaskStatus::Today)
    );
    assert_eq!(controller.gateway().remote()[0].status, TaskStatus::Done);
    assert_unique_ids(&controller);
}

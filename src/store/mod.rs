//! Task store - the authoritative client-side collection.
//!
//! Every mutation follows the same optimistic protocol: snapshot the
//! affected state, apply the change locally and notify subscribers, then
//! issue the remote call. Success reconciles (a create patches in the
//! canonical id), failure restores the snapshot exactly and re-raises the
//! classified error. The local collection never violates its invariants,
//! even mid-failure.
//!
//! Progress updates arrive at drag frequency, so their remote syncs are
//! coalesced per task id: at most one update is in flight per task, later
//! values overwrite a stashed pending slot, and the in-flight worker loops
//! until the stash drains. The last value the user set is the one that
//! ends up persisted.
//!
//! Local mutations apply synchronously, before each method's first await
//! point. Callers that must not wait for the remote settle spawn the
//! returned future.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::client::{ClientError, TaskClient, TaskPatch};
use crate::model::{clamp_fraction, derive_status, fraction_to_percentage, Task, TaskId};

/// Read-only derived summary over the whole collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// Tasks whose progress rounds to 100%.
    pub completed_count: usize,
    pub total_count: usize,
    /// `round(mean(progress) * 100)`, 0 for an empty collection.
    pub overall_progress_percent: u8,
}

/// Compute the summary for an ordered snapshot of tasks.
pub fn summarize(tasks: &[Task]) -> Summary {
    if tasks.is_empty() {
        return Summary::default();
    }
    let completed_count = tasks
        .iter()
        .filter(|t| fraction_to_percentage(t.progress) == 100)
        .count();
    let mean = tasks.iter().map(|t| t.progress).sum::<f64>() / tasks.len() as f64;
    Summary {
        completed_count,
        total_count: tasks.len(),
        overall_progress_percent: fraction_to_percentage(mean),
    }
}

/// Per-task bookkeeping for coalesced progress syncs.
struct ProgressSync {
    /// Latest locally-set fraction not yet picked up by the worker.
    pending: Option<f64>,
    /// Whether a worker loop currently owns remote syncing for this id.
    in_flight: bool,
    /// Last remotely-acknowledged progress; the rollback baseline.
    synced: f64,
    synced_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    /// Ordered by `created_at` (creation order for unacked tasks). Never
    /// reordered by mutation.
    tasks: Vec<Task>,
    next_local_id: u64,
    /// Local ids deleted before their create acknowledged. A late ack
    /// must not resurrect them.
    tombstones: HashSet<u64>,
    progress: HashMap<TaskId, ProgressSync>,
}

struct Inner {
    client: Arc<dyn TaskClient>,
    state: Mutex<State>,
    watch: watch::Sender<Vec<Task>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Critical sections are short and keep invariants at every exit;
        // recover the state rather than propagate poisoning.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, state: &State) {
        self.watch.send_replace(state.tasks.clone());
    }
}

/// The optimistic task collection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

impl TaskStore {
    pub fn new(client: Arc<dyn TaskClient>) -> Self {
        let (watch, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                client,
                state: Mutex::new(State::default()),
                watch,
            }),
        }
    }

    /// Subscribe to ordered snapshots of the collection. A new snapshot is
    /// published after every local mutation and every reconciliation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Task>> {
        self.inner.watch.subscribe()
    }

    /// Current ordered snapshot of the collection.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().tasks.clone()
    }

    /// Current derived summary.
    pub fn summary(&self) -> Summary {
        summarize(&self.inner.lock().tasks)
    }

    /// Fetch the full remote state and replace the synced portion of the
    /// collection, ordered by `created_at`. Tasks with unsettled optimistic
    /// progress keep their local values; tasks whose create has not been
    /// acknowledged yet stay at the tail in creation order.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let rows = self.inner.client.list_all().await?;

        let mut state = self.inner.lock();
        let st = &mut *state;
        let mut merged: Vec<Task> = rows
            .into_iter()
            .map(|row| {
                let id = TaskId::Remote(row.id);
                if st.progress.contains_key(&id) {
                    if let Some(existing) = st.tasks.iter().find(|t| t.id == id) {
                        return existing.clone();
                    }
                }
                Task::from(row)
            })
            .collect();
        merged.sort_by_key(|t| t.created_at);
        merged.extend(
            st.tasks
                .iter()
                .filter(|t| t.id.remote().is_none())
                .cloned(),
        );
        st.tasks = merged;
        self.inner.notify(st);
        tracing::debug!(count = st.tasks.len(), "collection refreshed from remote");
        Ok(())
    }

    /// Add a task. The task appears in the collection immediately with a
    /// local id; the canonical id is patched in once the remote create
    /// acknowledges. On failure the task is removed entirely.
    ///
    /// Whitespace-only descriptions are a no-op.
    pub async fn add(&self, description: &str) -> Result<(), ClientError> {
        let text = description.trim();
        if text.is_empty() {
            return Ok(());
        }

        let (local_id, fields) = {
            let mut state = self.inner.lock();
            let local_id = state.next_local_id;
            state.next_local_id += 1;
            let task = Task::new(local_id, text.to_string());
            let fields = task.fields();
            state.tasks.push(task);
            self.inner.notify(&state);
            (local_id, fields)
        };
        tracing::debug!(local_id, "optimistic add applied");

        match self.inner.client.create(&fields).await {
            Ok(remote_id) => self.reconcile_create(local_id, remote_id, &fields).await,
            Err(err) => {
                let mut state = self.inner.lock();
                let local = TaskId::Local(local_id);
                state.tasks.retain(|t| t.id != local);
                state.tombstones.remove(&local_id);
                state.progress.remove(&local);
                self.inner.notify(&state);
                tracing::warn!(local_id, error = %err, "create failed; optimistic add rolled back");
                Err(err)
            }
        }
    }

    /// Delete a task. Removed from the collection immediately; a remote
    /// not-found is success (the end state matches), any other failure
    /// re-inserts the task at its original index with identical fields.
    pub async fn delete(&self, id: TaskId) -> Result<(), ClientError> {
        let snapshot = {
            let mut state = self.inner.lock();
            let st = &mut *state;
            let Some(index) = st.tasks.iter().position(|t| t.id == id) else {
                return Ok(());
            };
            let task = st.tasks.remove(index);
            st.progress.remove(&id);
            if let TaskId::Local(local_id) = id {
                st.tombstones.insert(local_id);
            }
            self.inner.notify(st);
            (task, index)
        };

        let Some(remote_id) = id.remote() else {
            // Create not acknowledged yet; nothing exists remotely. The
            // tombstone handles the ack when it lands.
            return Ok(());
        };

        match self.inner.client.delete(remote_id).await {
            Ok(()) => Ok(()),
            Err(ClientError::NotFound(_)) => {
                tracing::debug!(remote_id, "already absent remotely; delete treated as success");
                Ok(())
            }
            Err(err) => {
                let (task, index) = snapshot;
                let mut state = self.inner.lock();
                let st = &mut *state;
                let index = index.min(st.tasks.len());
                st.tasks.insert(index, task);
                self.inner.notify(st);
                tracing::warn!(remote_id, error = %err, "delete failed; task restored at original position");
                Err(err)
            }
        }
    }

    /// Edit a task's description. No-op when the text trims to empty or is
    /// unchanged. Rollback restores the prior description unless a newer
    /// edit landed while the failed request was in flight.
    pub async fn set_description(&self, id: TaskId, text: &str) -> Result<(), ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let prior = {
            let mut state = self.inner.lock();
            let st = &mut *state;
            let Some(task) = st.tasks.iter_mut().find(|t| t.id == id) else {
                return Ok(());
            };
            if task.description == text {
                return Ok(());
            }
            let prior = (task.description.clone(), task.updated_at);
            task.description = text.to_string();
            task.updated_at = Utc::now();
            self.inner.notify(st);
            prior
        };

        let Some(remote_id) = id.remote() else {
            // Flushed by the create reconciliation when the id arrives.
            return Ok(());
        };

        match self
            .inner
            .client
            .update(remote_id, &TaskPatch::description(text))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                let mut state = self.inner.lock();
                let st = &mut *state;
                let mut rolled_back = false;
                if let Some(task) = st.tasks.iter_mut().find(|t| t.id == id) {
                    if task.description == text {
                        task.description = prior.0;
                        task.updated_at = prior.1;
                        rolled_back = true;
                    }
                }
                if rolled_back {
                    self.inner.notify(st);
                    tracing::warn!(remote_id, error = %err, "description sync failed; rolled back");
                } else {
                    tracing::debug!(remote_id, error = %err, "stale description failure discarded");
                }
                Err(err)
            }
        }
    }

    /// Set a task's progress. The fraction is clamped to [0, 1] and the
    /// status derived from it in the same mutation; the two are never set
    /// independently.
    ///
    /// Remote syncs are coalesced per id: if an update is already in
    /// flight for this task, the value is stashed and the call returns
    /// immediately; the in-flight worker picks the stash up, so the last
    /// value set always wins.
    pub async fn set_progress(&self, id: TaskId, fraction: f64) -> Result<(), ClientError> {
        let fraction = clamp_fraction(fraction);

        let start_sync = {
            let mut state = self.inner.lock();
            let st = &mut *state;
            let Some(task) = st.tasks.iter_mut().find(|t| t.id == id) else {
                return Ok(());
            };
            if task.progress == fraction {
                return Ok(());
            }
            let prior = (task.progress, task.updated_at);
            task.progress = fraction;
            task.status = derive_status(fraction);
            task.updated_at = Utc::now();

            let mut start_sync = None;
            {
                let sync = st.progress.entry(id).or_insert_with(|| ProgressSync {
                    pending: None,
                    in_flight: false,
                    synced: prior.0,
                    synced_at: prior.1,
                });
                sync.pending = Some(fraction);
                if !sync.in_flight {
                    if let Some(remote_id) = id.remote() {
                        sync.in_flight = true;
                        start_sync = Some(remote_id);
                    }
                    // No remote id yet: the create reconciliation flushes
                    // the pending value once the id arrives.
                }
            }
            self.inner.notify(st);
            start_sync
        };

        match start_sync {
            Some(remote_id) => self.drive_progress_sync(id, remote_id).await,
            None => Ok(()),
        }
    }

    /// Worker loop owning the remote progress sync for one task id. Sends
    /// the stashed value, and keeps going while newer values land. Failure
    /// rolls back to the last acknowledged baseline, but only when no
    /// newer local value superseded the failed one; responses for tasks
    /// deleted in the interim are discarded outright.
    async fn drive_progress_sync(&self, id: TaskId, remote_id: i64) -> Result<(), ClientError> {
        loop {
            let fraction = {
                let mut state = self.inner.lock();
                let Some(sync) = state.progress.get_mut(&id) else {
                    return Ok(());
                };
                match sync.pending.take() {
                    Some(fraction) => fraction,
                    None => {
                        state.progress.remove(&id);
                        return Ok(());
                    }
                }
            };

            tracing::debug!(remote_id, fraction, "syncing progress");
            match self
                .inner
                .client
                .update(remote_id, &TaskPatch::progress(fraction))
                .await
            {
                Ok(()) => {
                    let mut state = self.inner.lock();
                    let Some(sync) = state.progress.get_mut(&id) else {
                        tracing::debug!(remote_id, "progress ack for deleted task discarded");
                        return Ok(());
                    };
                    sync.synced = fraction;
                    sync.synced_at = Utc::now();
                    if sync.pending.is_none() {
                        state.progress.remove(&id);
                        return Ok(());
                    }
                    // Newer value stashed while in flight; loop to send it.
                }
                Err(err) => {
                    let mut state = self.inner.lock();
                    let st = &mut *state;
                    let Some(sync) = st.progress.get_mut(&id) else {
                        tracing::debug!(remote_id, "progress failure for deleted task discarded");
                        return Ok(());
                    };
                    if sync.pending.is_some() {
                        // A newer local value supersedes the failed one;
                        // rolling back would overwrite it.
                        tracing::debug!(remote_id, error = %err, "superseded progress failure discarded");
                        continue;
                    }
                    let baseline = sync.synced;
                    let baseline_at = sync.synced_at;
                    st.progress.remove(&id);
                    if let Some(task) = st.tasks.iter_mut().find(|t| t.id == id) {
                        task.progress = baseline;
                        task.status = derive_status(baseline);
                        task.updated_at = baseline_at;
                    }
                    self.inner.notify(st);
                    tracing::warn!(remote_id, error = %err, "progress sync failed; rolled back to last acknowledged value");
                    return Err(err);
                }
            }
        }
    }

    /// Reconcile an acknowledged create: swap the canonical id in place,
    /// then flush any edits the user made while the create was in flight.
    /// If the task was deleted locally in the interim, the ack is
    /// discarded and the now-orphaned remote row removed best-effort.
    async fn reconcile_create(
        &self,
        local_id: u64,
        remote_id: i64,
        sent: &crate::client::TaskFields,
    ) -> Result<(), ClientError> {
        enum Ack {
            Deleted,
            Patched {
                description_patch: Option<TaskPatch>,
                flush_progress: bool,
            },
        }

        let ack = {
            let mut state = self.inner.lock();
            let st = &mut *state;
            if st.tombstones.remove(&local_id) {
                Ack::Deleted
            } else {
                let local = TaskId::Local(local_id);
                let mut description_patch = None;
                if let Some(task) = st.tasks.iter_mut().find(|t| t.id == local) {
                    task.id = TaskId::Remote(remote_id);
                    if task.description != sent.description {
                        description_patch = Some(TaskPatch::description(task.description.clone()));
                    }
                } else {
                    return Ok(());
                }
                let mut flush_progress = false;
                if let Some(mut sync) = st.progress.remove(&local) {
                    flush_progress = sync.pending.is_some();
                    sync.in_flight = flush_progress;
                    st.progress.insert(TaskId::Remote(remote_id), sync);
                }
                self.inner.notify(st);
                Ack::Patched {
                    description_patch,
                    flush_progress,
                }
            }
        };

        match ack {
            Ack::Deleted => {
                tracing::debug!(remote_id, "create settled after local delete; removing remote row");
                if let Err(err) = self.inner.client.delete(remote_id).await {
                    if !matches!(err, ClientError::NotFound(_)) {
                        tracing::warn!(remote_id, error = %err, "failed to remove remote row for locally deleted task");
                    }
                }
                Ok(())
            }
            Ack::Patched {
                description_patch,
                flush_progress,
            } => {
                tracing::debug!(local_id, remote_id, "create acknowledged; canonical id patched in");
                let mut result = Ok(());
                if flush_progress {
                    result = self
                        .drive_progress_sync(TaskId::Remote(remote_id), remote_id)
                        .await;
                }
                if let Some(patch) = description_patch {
                    if let Err(err) = self.inner.client.update(remote_id, &patch).await {
                        tracing::warn!(remote_id, error = %err, "failed to sync description edited during create");
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    use super::*;
    use crate::client::{RemoteTask, TaskFields};
    use crate::model::TaskStatus;

    #[derive(Debug, Clone)]
    enum Call {
        ListAll,
        Create(TaskFields),
        Update(i64, TaskPatch),
        Delete(i64),
    }

    /// Scriptable client stub. Results are consumed front-to-back; an
    /// empty queue answers success. Optional gates hold a response in
    /// flight until the test releases it.
    #[derive(Default)]
    struct MockClient {
        calls: StdMutex<Vec<Call>>,
        list_results: StdMutex<VecDeque<Result<Vec<RemoteTask>, ClientError>>>,
        create_results: StdMutex<VecDeque<Result<i64, ClientError>>>,
        update_results: StdMutex<VecDeque<Result<(), ClientError>>>,
        delete_results: StdMutex<VecDeque<Result<(), ClientError>>>,
        create_gate: Option<Arc<Notify>>,
        update_gate: Option<Arc<Notify>>,
        next_id: AtomicI64,
    }

    impl MockClient {
        fn gated_create() -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let client = Self {
                create_gate: Some(gate.clone()),
                ..Self::default()
            };
            (client, gate)
        }

        fn gated_update() -> (Self, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let client = Self {
                update_gate: Some(gate.clone()),
                ..Self::default()
            };
            (client, gate)
        }

        fn will_list(&self, rows: Vec<RemoteTask>) {
            self.list_results.lock().unwrap().push_back(Ok(rows));
        }

        fn will_create(&self, result: Result<i64, ClientError>) {
            self.create_results.lock().unwrap().push_back(result);
        }

        fn will_update(&self, result: Result<(), ClientError>) {
            self.update_results.lock().unwrap().push_back(result);
        }

        fn will_delete(&self, result: Result<(), ClientError>) {
            self.delete_results.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn sent_progress(&self) -> Vec<f64> {
            self.calls()
                .iter()
                .filter_map(|c| match c {
                    Call::Update(_, patch) => patch.progress,
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl TaskClient for MockClient {
        async fn list_all(&self) -> Result<Vec<RemoteTask>, ClientError> {
            self.calls.lock().unwrap().push(Call::ListAll);
            self.list_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn create(&self, fields: &TaskFields) -> Result<i64, ClientError> {
            self.calls.lock().unwrap().push(Call::Create(fields.clone()));
            if let Some(gate) = &self.create_gate {
                gate.notified().await;
            }
            match self.create_results.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(100 + self.next_id.fetch_add(1, Ordering::SeqCst)),
            }
        }

        async fn update(&self, id: i64, patch: &TaskPatch) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(Call::Update(id, patch.clone()));
            if let Some(gate) = &self.update_gate {
                gate.notified().await;
            }
            self.update_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn delete(&self, id: i64) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(Call::Delete(id));
            self.delete_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    fn transport() -> ClientError {
        ClientError::Transport("connection refused".to_string())
    }

    fn row(id: i64, description: &str, progress: f64, minute: u32) -> RemoteTask {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap();
        RemoteTask {
            id,
            description: description.to_string(),
            status: derive_status(progress),
            progress,
            created_at: at,
            updated_at: at,
        }
    }

    fn store_with(client: MockClient) -> (TaskStore, Arc<MockClient>) {
        let client = Arc::new(client);
        (TaskStore::new(client.clone()), client)
    }

    async fn seeded(client: MockClient, rows: Vec<RemoteTask>) -> (TaskStore, Arc<MockClient>) {
        client.will_list(rows);
        let (store, client) = store_with(client);
        store.refresh().await.unwrap();
        (store, client)
    }

    /// Poll a condition while letting spawned tasks run.
    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never reached");
    }

    #[tokio::test]
    async fn add_patches_in_canonical_id() {
        let client = MockClient::default();
        client.will_create(Ok(41));
        let (store, _client) = store_with(client);

        store.add("  buy milk  ").await.unwrap();

        let tasks = store.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, TaskId::Remote(41));
        assert_eq!(tasks[0].description, "buy milk");
        assert_eq!(tasks[0].status, TaskStatus::New);
    }

    #[tokio::test]
    async fn empty_add_is_a_no_op() {
        let (store, client) = store_with(MockClient::default());
        store.add("   ").await.unwrap();
        assert!(store.tasks().is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn add_is_visible_before_create_settles_and_rolls_back_on_failure() {
        let (client, gate) = MockClient::gated_create();
        client.will_create(Err(transport()));
        let (store, _client) = store_with(client);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.add("doomed").await })
        };

        // Optimistic insert lands before the remote call settles.
        wait_until(|| store.tasks().len() == 1).await;
        assert!(matches!(store.tasks()[0].id, TaskId::Local(_)));

        gate.notify_one();
        let result = worker.await.unwrap();
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert!(store.tasks().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_restores_task_at_original_index() {
        let client = MockClient::default();
        let (store, client) = seeded(
            client,
            vec![row(1, "first", 0.0, 0), row(2, "second", 0.5, 1), row(3, "third", 1.0, 2)],
        )
        .await;
        let before = store.tasks();

        client.will_delete(Err(transport()));
        let result = store.delete(TaskId::Remote(2)).await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        // Identical fields, identical position.
        assert_eq!(store.tasks(), before);
    }

    #[tokio::test]
    async fn delete_of_remotely_absent_task_is_success() {
        let client = MockClient::default();
        let (store, client) = seeded(client, vec![row(1, "only", 0.0, 0)]).await;

        client.will_delete(Err(ClientError::NotFound(1)));
        store.delete(TaskId::Remote(1)).await.unwrap();
        assert!(store.tasks().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_a_no_op() {
        let (store, client) = store_with(MockClient::default());
        store.delete(TaskId::Remote(99)).await.unwrap();
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn rapid_progress_updates_coalesce_to_last_write() {
        let (client, gate) = MockClient::gated_update();
        let (store, client) = seeded(client, vec![row(1, "drag me", 0.0, 0)]).await;
        let id = TaskId::Remote(1);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.set_progress(id, 0.1).await })
        };
        wait_until(|| store.tasks()[0].progress == 0.1).await;

        // These land while the first update is held in flight.
        store.set_progress(id, 0.5).await.unwrap();
        store.set_progress(id, 0.9).await.unwrap();

        assert_eq!(store.tasks()[0].progress, 0.9);
        assert_eq!(store.tasks()[0].status, TaskStatus::Started);

        gate.notify_one();
        gate.notify_one();
        worker.await.unwrap().unwrap();

        // The intermediate 0.5 was coalesced away; the final value is the
        // one persisted.
        assert_eq!(client.sent_progress(), vec![0.1, 0.9]);
        assert_eq!(store.tasks()[0].progress, 0.9);
    }

    #[tokio::test]
    async fn failed_sync_never_overwrites_a_newer_value() {
        let (client, gate) = MockClient::gated_update();
        client.will_update(Err(transport()));
        let (store, client) = seeded(client, vec![row(1, "drag me", 0.0, 0)]).await;
        let id = TaskId::Remote(1);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.set_progress(id, 0.2).await })
        };
        wait_until(|| store.tasks()[0].progress == 0.2).await;
        store.set_progress(id, 0.8).await.unwrap();

        gate.notify_one();
        gate.notify_one();
        // The 0.2 sync fails, but 0.8 superseded it: no rollback, and the
        // worker carries on to persist 0.8.
        worker.await.unwrap().unwrap();

        assert_eq!(store.tasks()[0].progress, 0.8);
        assert_eq!(client.sent_progress(), vec![0.2, 0.8]);
    }

    #[tokio::test]
    async fn failed_sync_rolls_back_to_last_acknowledged_value() {
        let client = MockClient::default();
        client.will_update(Err(transport()));
        let (store, _client) = seeded(client, vec![row(1, "steady", 0.5, 0)]).await;
        let before = store.tasks();

        let result = store.set_progress(TaskId::Remote(1), 0.75).await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(store.tasks(), before);
        assert_eq!(store.tasks()[0].status, TaskStatus::Started);
    }

    #[tokio::test]
    async fn progress_response_after_local_delete_is_discarded() {
        let (client, gate) = MockClient::gated_update();
        let (store, _client) = seeded(client, vec![row(1, "short lived", 0.0, 0)]).await;
        let id = TaskId::Remote(1);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.set_progress(id, 0.7).await })
        };
        wait_until(|| store.tasks()[0].progress == 0.7).await;

        store.delete(id).await.unwrap();
        assert!(store.tasks().is_empty());

        gate.notify_one();
        worker.await.unwrap().unwrap();
        // The settled response must not resurrect the task.
        assert!(store.tasks().is_empty());
    }

    #[tokio::test]
    async fn create_ack_after_local_delete_never_resurrects() {
        let (client, gate) = MockClient::gated_create();
        client.will_create(Ok(77));
        let (store, client) = store_with(client);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.add("fleeting").await })
        };
        wait_until(|| store.tasks().len() == 1).await;
        let local_id = store.tasks()[0].id;

        store.delete(local_id).await.unwrap();
        assert!(store.tasks().is_empty());

        gate.notify_one();
        worker.await.unwrap().unwrap();

        assert!(store.tasks().is_empty());
        // The acked remote row is cleaned up to match local intent.
        assert!(client
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Delete(77))));
    }

    #[tokio::test]
    async fn edits_during_create_are_flushed_after_ack() {
        let (client, gate) = MockClient::gated_create();
        client.will_create(Ok(5));
        let (store, client) = store_with(client);

        let worker = {
            let store = store.clone();
            tokio::spawn(async move { store.add("draft").await })
        };
        wait_until(|| store.tasks().len() == 1).await;
        let local_id = store.tasks()[0].id;

        // Neither can reach the remote yet; both apply locally and wait
        // for the canonical id.
        store.set_description(local_id, "final wording").await.unwrap();
        store.set_progress(local_id, 0.3).await.unwrap();

        gate.notify_one();
        worker.await.unwrap().unwrap();

        let task = &store.tasks()[0];
        assert_eq!(task.id, TaskId::Remote(5));
        assert_eq!(task.description, "final wording");
        assert_eq!(task.progress, 0.3);

        let flushed: Vec<_> = client
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::Update(id, patch) => Some((*id, patch.clone())),
                _ => None,
            })
            .collect();
        assert!(flushed
            .iter()
            .any(|(id, p)| *id == 5 && p.progress == Some(0.3)));
        assert!(flushed
            .iter()
            .any(|(id, p)| *id == 5 && p.description.as_deref() == Some("final wording")));
    }

    #[tokio::test]
    async fn description_edit_trims_and_skips_no_ops() {
        let client = MockClient::default();
        let (store, client) = seeded(client, vec![row(1, "original", 0.0, 0)]).await;
        let id = TaskId::Remote(1);

        store.set_description(id, "   ").await.unwrap();
        store.set_description(id, " original ").await.unwrap();
        assert_eq!(client.calls().len(), 1); // just the seed list_all

        store.set_description(id, "  revised  ").await.unwrap();
        assert_eq!(store.tasks()[0].description, "revised");
    }

    #[tokio::test]
    async fn description_rollback_on_failure() {
        let client = MockClient::default();
        client.will_update(Err(transport()));
        let (store, _client) = seeded(client, vec![row(1, "original", 0.0, 0)]).await;
        let before = store.tasks();

        let result = store.set_description(TaskId::Remote(1), "revised").await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(store.tasks(), before);
    }

    #[tokio::test]
    async fn refresh_orders_by_creation_time() {
        let client = MockClient::default();
        let (store, _client) = seeded(
            client,
            vec![row(3, "late", 0.0, 30), row(1, "early", 0.0, 0), row(2, "middle", 0.0, 15)],
        )
        .await;

        let ids: Vec<_> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec![TaskId::Remote(1), TaskId::Remote(2), TaskId::Remote(3)]
        );
    }

    #[tokio::test]
    async fn subscribers_see_every_local_mutation() {
        let client = MockClient::default();
        client.will_create(Ok(9));
        let (store, _client) = store_with(client);
        let rx = store.subscribe();

        store.add("watched").await.unwrap();

        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, TaskId::Remote(9));
    }

    #[tokio::test]
    async fn summary_over_mixed_progress() {
        let client = MockClient::default();
        let (store, _client) = seeded(
            client,
            vec![row(1, "a", 0.0, 0), row(2, "b", 0.5, 1), row(3, "c", 1.0, 2)],
        )
        .await;

        assert_eq!(
            store.summary(),
            Summary {
                completed_count: 1,
                total_count: 3,
                overall_progress_percent: 50,
            }
        );
    }

    #[test]
    fn summary_of_empty_collection_is_zero() {
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[tokio::test]
    async fn start_convenience_patches_status() {
        // MockClient does not override `start`, so this exercises the
        // trait's default mapping onto a status patch.
        let (_, client) = store_with(MockClient::default());
        client.start(3).await.unwrap();

        match &client.calls()[..] {
            [Call::Update(3, patch)] => {
                assert_eq!(patch.status, Some(TaskStatus::Started));
                assert_eq!(patch.progress, None);
                assert_eq!(patch.description, None);
            }
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }
}

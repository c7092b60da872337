use crate::{
    Config,
    dispatcher::Dispatcher,
    ports::{
        Destination,
        ForeignChain,
        HostNode,
        HostNotification,
    },
    relay::{
        RelayProgress,
        RelayState,
    },
    snapshot,
};
use fuel_core_services::{
    RunnableService,
    RunnableTask,
    ServiceRunner,
    StateWatcher,
    TaskNextAction,
    stream::{
        BoxStream,
        IntoBoxStream,
    },
};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::{
    sync::watch,
    time::MissedTickBehavior,
};

pub type Service<H, F> = ServiceRunner<NotInitializedTask<H, F>>;

/// Read side of the relay, shared with whoever started it.
#[derive(Clone)]
pub struct SharedState {
    progress: watch::Receiver<RelayProgress>,
}

impl SharedState {
    pub fn progress(&self) -> RelayProgress {
        *self.progress.borrow()
    }

    /// Waits until the relay has processed the finalized block `block_num`.
    pub async fn await_finalized(&self, block_num: u32) -> anyhow::Result<()> {
        self.await_progress(|progress| {
            progress
                .last_finalized_block
                .is_some_and(|last| last >= block_num)
        })
        .await
    }

    /// Waits until at least `count` jobs were accepted by the foreign chain.
    pub async fn await_sent_jobs(&self, count: usize) -> anyhow::Result<()> {
        self.await_progress(|progress| progress.sent_jobs >= count)
            .await
    }

    async fn await_progress(
        &self,
        mut condition: impl FnMut(&RelayProgress) -> bool,
    ) -> anyhow::Result<()> {
        let mut rx = self.progress.clone();
        loop {
            if condition(&rx.borrow_and_update()) {
                break
            }
            rx.changed().await?;
        }
        Ok(())
    }
}

pub struct NotInitializedTask<H, F> {
    host: H,
    foreign_chain: F,
    config: Config,
    progress: watch::Sender<RelayProgress>,
}

impl<H, F> NotInitializedTask<H, F> {
    fn new(host: H, foreign_chain: F, config: Config) -> Self {
        let (progress, _) = watch::channel(RelayProgress::default());
        Self {
            host,
            foreign_chain,
            config,
            progress,
        }
    }
}

#[async_trait::async_trait]
impl<H, F> RunnableService for NotInitializedTask<H, F>
where
    H: HostNode + 'static,
    F: ForeignChain + 'static,
{
    const NAME: &'static str = "BridgeRelay";

    type SharedData = SharedState;
    type Task = Task<F>;
    type TaskParams = ();

    fn shared_data(&self) -> Self::SharedData {
        SharedState {
            progress: self.progress.subscribe(),
        }
    }

    async fn into_task(
        self,
        _: &StateWatcher,
        _: Self::TaskParams,
    ) -> anyhow::Result<Self::Task> {
        let Self {
            host,
            foreign_chain,
            config,
            progress,
        } = self;

        if config.dispatch_interval.is_zero() {
            anyhow::bail!("The dispatch interval must be positive");
        }

        let snapshot_path = config.snapshot_path();
        let mut state = RelayState::from_config(&config);
        if let Some(snapshot) = snapshot::load(&snapshot_path, config.purge_history)? {
            state.restore(snapshot);
        }
        progress.send_replace(state.progress());

        let mut dispatch_timer = tokio::time::interval(config.dispatch_interval);
        dispatch_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let destination = Destination {
            endpoint: config.foreign_endpoint.clone(),
            account: config.foreign_account.clone(),
        };

        Ok(Task {
            notifications: host.notifications(),
            state,
            dispatcher: Dispatcher::new(foreign_chain, destination),
            dispatch_timer,
            snapshot_path,
            progress,
        })
    }
}

pub struct Task<F> {
    notifications: BoxStream<HostNotification>,
    state: RelayState,
    dispatcher: Dispatcher<F>,
    dispatch_timer: tokio::time::Interval,
    snapshot_path: PathBuf,
    progress: watch::Sender<RelayProgress>,
}

impl<F> Task<F>
where
    F: ForeignChain,
{
    pub fn state(&self) -> &RelayState {
        &self.state
    }

    fn publish_progress(&self) {
        let progress = self.state.progress();
        self.progress.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }
}

impl<F> RunnableTask for Task<F>
where
    F: ForeignChain + 'static,
{
    async fn run(&mut self, watcher: &mut StateWatcher) -> TaskNextAction {
        let action = tokio::select! {
            biased;

            _ = watcher.while_started() => {
                TaskNextAction::Stop
            }

            _ = self.dispatch_timer.tick() => {
                let report = self.dispatcher.sweep(&mut self.state).await;
                if report.submitted() > 0 || report.dropped > 0 {
                    tracing::debug!(
                        "Dispatch sweep: {} accepted, {} rejected, {} dropped",
                        report.accepted,
                        report.rejected,
                        report.dropped,
                    );
                }
                TaskNextAction::Continue
            }

            notification = self.notifications.next() => {
                match notification {
                    Some(notification) => {
                        self.state.on_notification(notification);
                    }
                    None => {
                        tracing::warn!(
                            "The host notification stream ended, only dispatching from now on"
                        );
                        self.notifications = futures::stream::pending().into_boxed();
                    }
                }
                TaskNextAction::Continue
            }
        };
        self.publish_progress();
        action
    }

    async fn shutdown(mut self) -> anyhow::Result<()> {
        let snapshot = self.state.take_snapshot();
        snapshot::write(&self.snapshot_path, &snapshot)?;
        Ok(())
    }
}

pub fn new_service<H, F>(host: H, foreign_chain: F, config: Config) -> Service<H, F>
where
    H: HostNode + 'static,
    F: ForeignChain + 'static,
{
    ServiceRunner::new(NotInitializedTask::new(host, foreign_chain, config))
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::JobStatus,
        snapshot::Snapshot,
        test_helpers::{
            BRIDGE,
            FakeForeignChain,
            FakeHostNode,
            TOKEN,
            finalized_chain,
            scenario_notifications,
        },
    };
    use bridge_relay_types::test_helpers::name;
    use fuel_core_services::Service as _;
    use std::time::Duration;

    fn config(data_dir: &std::path::Path) -> Config {
        Config {
            bridge_account: name(BRIDGE),
            token_contract: name(TOKEN),
            data_dir: data_dir.to_path_buf(),
            dispatch_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn task(
        notifications: Vec<HostNotification>,
        chain: &FakeForeignChain,
        config: Config,
    ) -> anyhow::Result<Task<FakeForeignChain>> {
        NotInitializedTask::new(FakeHostNode::new(notifications), chain.clone(), config)
            .into_task(&StateWatcher::started(), ())
            .await
    }

    #[tokio::test]
    async fn service__can_be_started_and_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let service = new_service(
            FakeHostNode::default(),
            FakeForeignChain::accepting(),
            config(dir.path()),
        );

        service.start_and_await().await.unwrap();
        service.stop_and_await().await.unwrap();

        assert!(dir.path().join("bridge_relay.dat").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn task__scenario__relays_both_proofs_once() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let chain = FakeForeignChain::accepting();
        let notifications = scenario_notifications();
        let runs = notifications.len().saturating_add(4);
        let mut task = task(notifications, &chain, config(dir.path()))
            .await
            .unwrap();
        let mut watcher = StateWatcher::started();

        // When
        for _ in 0..runs {
            let action = task.run(&mut watcher).await;
            assert!(matches!(action, TaskNextAction::Continue));
        }

        // Then
        let schedule = chain.schedule_submissions();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].subject_block_num, 100);
        assert_eq!(schedule[0].headers.len(), 15);
        let expected_anchor = finalized_chain(98, 1)[0].blockroot_merkle.clone();
        assert_eq!(schedule[0].anchor_merkle, expected_anchor);
        assert_eq!(chain.action_submissions().len(), 1);
        let job = task.state().schedule_jobs().get(100).unwrap();
        assert_eq!(job.status(), JobStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn task__rejecting_foreign_chain__retries_every_interval() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let chain = FakeForeignChain::rejecting();
        let notifications = scenario_notifications();
        // One initial tick, every notification, then the end of the stream.
        let runs = notifications.len().saturating_add(2);
        let mut task = task(notifications, &chain, config(dir.path()))
            .await
            .unwrap();
        let mut watcher = StateWatcher::started();
        for _ in 0..runs {
            let _ = task.run(&mut watcher).await;
        }

        // When
        for _ in 0..3 {
            let _ = task.run(&mut watcher).await;
        }

        // Then
        assert_eq!(chain.schedule_submissions().len(), 3);
        assert_eq!(task.state().progress().ready_jobs, 2);
    }

    #[tokio::test]
    async fn task__shutdown__snapshot_restored_on_next_start() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let chain = FakeForeignChain::rejecting();
        let mut task = task(scenario_notifications(), &chain, config(dir.path()))
            .await
            .unwrap();
        let mut watcher = StateWatcher::started();
        while task.state().progress().last_finalized_block != Some(268) {
            let _ = task.run(&mut watcher).await;
        }
        let before = task.state().snapshot();
        assert!(!before.is_empty());

        // When
        task.shutdown().await.unwrap();
        let restored = self::task(Vec::new(), &chain, config(dir.path()))
            .await
            .unwrap();

        // Then
        assert_eq!(restored.state().snapshot(), before);
        assert!(!dir.path().join("bridge_relay.dat").exists());
    }

    #[tokio::test]
    async fn task__purge_history__starts_empty() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let relay = crate::test_helpers::ready_relay();
        snapshot::write(&config.snapshot_path(), &relay.snapshot()).unwrap();
        let config = Config {
            purge_history: true,
            ..config
        };

        // When
        let task = task(Vec::new(), &FakeForeignChain::accepting(), config)
            .await
            .unwrap();

        // Then
        assert_eq!(task.state().snapshot(), Snapshot::default());
        assert!(!dir.path().join("bridge_relay.dat").exists());
    }

    #[tokio::test]
    async fn task__corrupt_snapshot__fails_to_start() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(config.snapshot_path(), b"BRLY\x02\x05").unwrap();

        // When
        let result = task(Vec::new(), &FakeForeignChain::accepting(), config).await;

        // Then
        assert!(result.is_err());
        assert!(dir.path().join("bridge_relay.dat").exists());
    }

    #[tokio::test]
    async fn task__zero_dispatch_interval__fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            dispatch_interval: Duration::ZERO,
            ..config(dir.path())
        };

        let result = task(Vec::new(), &FakeForeignChain::accepting(), config).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn service__shared_state__observes_sent_jobs() {
        // Given
        let dir = tempfile::tempdir().unwrap();
        let chain = FakeForeignChain::accepting();
        let service = new_service(
            FakeHostNode::new(scenario_notifications()),
            chain.clone(),
            config(dir.path()),
        );
        let shared = service.shared.clone();

        // When
        service.start_and_await().await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), shared.await_finalized(268))
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(10), shared.await_sent_jobs(2))
            .await
            .unwrap()
            .unwrap();
        service.stop_and_await().await.unwrap();

        // Then
        assert_eq!(shared.progress().sent_jobs, 2);
        assert_eq!(chain.schedule_submissions().len(), 1);
        assert_eq!(chain.action_submissions().len(), 1);
    }
}

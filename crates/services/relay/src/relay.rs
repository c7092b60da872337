//! All mutable state of the relay and the handling of host notifications.

use crate::{
    Config,
    detector::EventDetector,
    job::{
        ActionEvidence,
        JobStatus,
        JobTable,
        ProofJob,
        ScheduleChange,
    },
    ledger::{
        BlockLedger,
        BlockRecord,
    },
    ports::{
        AppliedTransaction,
        FinalizedBlock,
        HostNotification,
    },
    snapshot::Snapshot,
};
use bridge_relay_types::{
    Name,
    blockchain::ProducerSchedule,
    merkle::IncrementalMerkle,
};

/// How many `previous` links separate a subject block from the block whose
/// cumulative merkle anchors its proof. The anchor predates the subject block,
/// so the foreign chain never has to trust the block it is verifying.
pub const ANCHOR_DEPTH: usize = 2;

/// Counters published to observers of the relay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayProgress {
    pub last_finalized_block: Option<u32>,
    pub collecting_jobs: usize,
    pub ready_jobs: usize,
    pub sent_jobs: usize,
}

#[derive(Debug)]
pub struct RelayState {
    ledger: BlockLedger,
    detector: EventDetector,
    schedule_jobs: JobTable<ScheduleChange>,
    action_jobs: JobTable<ActionEvidence>,
    /// The last producer schedule announced by a finalized block.
    active_schedule: Option<ProducerSchedule>,
    last_finalized_block: Option<u32>,
}

impl RelayState {
    pub fn new(token_contract: Name, bridge_account: Name, ledger_capacity: usize) -> Self {
        Self {
            ledger: BlockLedger::new(ledger_capacity),
            detector: EventDetector::new(token_contract, bridge_account),
            schedule_jobs: JobTable::new(),
            action_jobs: JobTable::new(),
            active_schedule: None,
            last_finalized_block: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.token_contract,
            config.bridge_account,
            config.ledger_capacity,
        )
    }

    pub fn ledger(&self) -> &BlockLedger {
        &self.ledger
    }

    pub fn schedule_jobs(&self) -> &JobTable<ScheduleChange> {
        &self.schedule_jobs
    }

    pub fn action_jobs(&self) -> &JobTable<ActionEvidence> {
        &self.action_jobs
    }

    pub fn active_schedule(&self) -> Option<&ProducerSchedule> {
        self.active_schedule.as_ref()
    }

    pub(crate) fn schedule_jobs_mut(&mut self) -> &mut JobTable<ScheduleChange> {
        &mut self.schedule_jobs
    }

    pub(crate) fn action_jobs_mut(&mut self) -> &mut JobTable<ActionEvidence> {
        &mut self.action_jobs
    }

    pub fn progress(&self) -> RelayProgress {
        let count = |status| {
            self.schedule_jobs
                .count(status)
                .saturating_add(self.action_jobs.count(status))
        };
        RelayProgress {
            last_finalized_block: self.last_finalized_block,
            collecting_jobs: count(JobStatus::Collecting),
            ready_jobs: count(JobStatus::Ready),
            sent_jobs: count(JobStatus::Sent),
        }
    }

    pub fn on_notification(&mut self, notification: HostNotification) {
        match notification {
            HostNotification::FinalizedBlock(block) => self.on_finalized_block(block),
            HostNotification::AppliedTransaction(transaction) => {
                self.on_action_applied(&transaction)
            }
        }
    }

    pub fn on_action_applied(&mut self, transaction: &AppliedTransaction) {
        self.detector.on_action_applied(transaction);
    }

    /// Handles a block that became irreversible.
    ///
    /// The block is recorded first, then it grows the windows of the jobs that
    /// are still collecting, and only then the jobs it triggers are opened, so
    /// a new job never sees its own subject block twice.
    pub fn on_finalized_block(&mut self, block: FinalizedBlock) {
        let record = BlockRecord::from(block);
        let number = record.number;
        if self.last_finalized_block.is_some_and(|last| number <= last) {
            tracing::debug!("Ignoring block {number}, it is not newer than the last finalized one");
            return
        }
        if !self.ledger.record(record.clone()) {
            tracing::debug!("Block {} is already recorded", record.id);
            return
        }
        self.last_finalized_block = Some(number);

        for subject in self.schedule_jobs.collect_block(&record) {
            tracing::info!("Schedule change proof for block {subject} is ready");
        }
        for subject in self.action_jobs.collect_block(&record) {
            tracing::info!("Deposit proof for block {subject} is ready");
        }

        if let Some(schedule) = EventDetector::schedule_change(&record) {
            let legacy_schedule_hash =
                self.active_schedule.as_ref().map(ProducerSchedule::digest);
            self.active_schedule = Some(schedule.clone());
            match self.anchor_of(&record) {
                Some(anchor_merkle) => {
                    tracing::info!(
                        "Producer schedule version {} announced in block {number}",
                        schedule.version
                    );
                    let evidence = ScheduleChange {
                        schedule,
                        legacy_schedule_hash,
                    };
                    self.schedule_jobs
                        .insert(ProofJob::new(&record, anchor_merkle, evidence));
                }
                None => tracing::warn!(
                    "Dropping schedule change of block {number}: its anchor block is no longer retained"
                ),
            }
        }

        if let Some(deposit) = self.detector.take_finalized(&record) {
            match self.anchor_of(&record) {
                Some(anchor_merkle) => {
                    tracing::info!(
                        "Deposit in block {number}, transaction {}",
                        deposit.candidate.transaction_id
                    );
                    let evidence = ActionEvidence {
                        transaction_id: deposit.candidate.transaction_id,
                        action: deposit.candidate.action,
                        action_receipt: deposit.candidate.action_receipt,
                        sibling_receipt_digests: deposit.receipt_digests,
                        receipt_inclusion_path: Vec::new(),
                    };
                    self.action_jobs.insert(ProofJob::new(&record, anchor_merkle, evidence));
                }
                None => tracing::warn!(
                    "Dropping deposit of block {number}: its anchor block is no longer retained"
                ),
            }
        }

        if let Some(oldest) = self.ledger.oldest_number() {
            let pruned = self
                .schedule_jobs
                .prune_sent_before(oldest)
                .saturating_add(self.action_jobs.prune_sent_before(oldest));
            if pruned > 0 {
                tracing::debug!("Pruned {pruned} sent jobs older than block {oldest}");
            }
        }
    }

    fn anchor_of(&self, record: &BlockRecord) -> Option<IncrementalMerkle> {
        self.ledger
            .ancestor(&record.id, ANCHOR_DEPTH)
            .map(|anchor| anchor.cumulative_merkle.clone())
    }

    /// Copies the persistent part of the state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            blocks: self.ledger.iter().cloned().collect(),
            schedule_jobs: self.schedule_jobs.iter().cloned().collect(),
            action_jobs: self.action_jobs.iter().cloned().collect(),
            active_schedule: self.active_schedule.clone(),
        }
    }

    /// Moves the persistent part of the state out, leaving the relay empty.
    pub fn take_snapshot(&mut self) -> Snapshot {
        let snapshot = self.snapshot();
        self.clear();
        snapshot
    }

    /// Loads a snapshot into the relay, on top of what it already holds.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let Snapshot {
            blocks,
            schedule_jobs,
            action_jobs,
            active_schedule,
        } = snapshot;
        if active_schedule.is_some() {
            self.active_schedule = active_schedule;
        }
        for block in blocks {
            let number = block.number;
            if self.ledger.record(block) {
                self.last_finalized_block = Some(
                    self.last_finalized_block
                        .map_or(number, |last| last.max(number)),
                );
            }
        }
        for job in schedule_jobs {
            self.schedule_jobs.insert(job);
        }
        for job in action_jobs {
            self.action_jobs.insert(job);
        }
    }

    pub fn clear(&mut self) {
        self.ledger.clear();
        self.detector.clear();
        self.schedule_jobs.clear();
        self.action_jobs.clear();
        self.active_schedule = None;
        self.last_finalized_block = None;
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::window::MAX_HEADERS,
        test_helpers::{
            BRIDGE,
            TOKEN,
            deposit_transaction,
            finalized_chain,
            with_schedule_change,
        },
    };
    use bridge_relay_types::test_helpers::name;

    fn relay(capacity: usize) -> RelayState {
        RelayState::new(name(TOKEN), name(BRIDGE), capacity)
    }

    #[test]
    fn relay_state__schedule_change__anchored_two_blocks_back() {
        // Given
        let mut relay = relay(1024);
        let mut chain = finalized_chain(98, 3);
        with_schedule_change(&mut chain, 2, 7);
        let expected_anchor = chain[0].blockroot_merkle.clone();

        // When
        for block in chain {
            relay.on_finalized_block(block);
        }

        // Then
        let job = relay.schedule_jobs().get(100).unwrap();
        assert_eq!(job.status(), JobStatus::Collecting);
        assert_eq!(job.anchor_merkle(), &expected_anchor);
        assert_eq!(job.evidence().schedule.version, 7);
        assert_eq!(job.window().headers().len(), 1);
    }

    #[test]
    fn relay_state__second_schedule_change__carries_first_schedule_digest() {
        // Given
        let mut relay = relay(1024);
        let mut chain = finalized_chain(98, 40);
        with_schedule_change(&mut chain, 2, 7);
        with_schedule_change(&mut chain, 30, 8);
        let first = chain[2].header.header.schedule_change().unwrap();

        // When
        for block in chain {
            relay.on_finalized_block(block);
        }

        // Then
        let first_job = relay.schedule_jobs().get(100).unwrap();
        assert_eq!(first_job.evidence().legacy_schedule_hash, None);
        let second_job = relay.schedule_jobs().get(128).unwrap();
        assert_eq!(second_job.evidence().schedule.version, 8);
        assert_eq!(
            second_job.evidence().legacy_schedule_hash,
            Some(first.digest())
        );
        assert_eq!(relay.active_schedule().map(|s| s.version), Some(8));
    }

    #[test]
    fn relay_state__schedule_change_without_anchor__is_dropped() {
        // Given
        let mut relay = relay(1024);
        let mut chain = finalized_chain(99, 2);
        with_schedule_change(&mut chain, 1, 7);

        // When
        for block in chain {
            relay.on_finalized_block(block);
        }

        // Then
        assert!(relay.schedule_jobs().is_empty());
        assert_eq!(relay.active_schedule().map(|s| s.version), Some(7));
    }

    #[test]
    fn relay_state__deposit__becomes_action_job_on_finalization() {
        // Given
        let mut relay = relay(1024);
        let chain = finalized_chain(98, 3);
        let transaction = deposit_transaction(1, 100, "alice", 4);

        // When
        relay.on_finalized_block(chain[0].clone());
        relay.on_finalized_block(chain[1].clone());
        relay.on_action_applied(&transaction);
        relay.on_finalized_block(chain[2].clone());

        // Then
        let job = relay.action_jobs().get(100).unwrap();
        assert_eq!(job.anchor_merkle(), &chain[0].blockroot_merkle);
        assert_eq!(job.evidence().transaction_id, transaction.transaction_id);
        assert_eq!(job.evidence().sibling_receipt_digests.len(), 4);
        assert!(job.evidence().receipt_inclusion_path.is_empty());
    }

    #[test]
    fn relay_state__full_window__job_ready_after_fifteen_headers() {
        // Given
        let mut relay = relay(1024);
        let mut chain = finalized_chain(98, 171);
        with_schedule_change(&mut chain, 2, 3);

        // When
        for block in chain {
            relay.on_finalized_block(block);
        }

        // Then
        let job = relay.schedule_jobs().get(100).unwrap();
        assert_eq!(job.status(), JobStatus::Ready);
        assert_eq!(job.window().headers().len(), MAX_HEADERS);
        assert_eq!(relay.progress().ready_jobs, 1);
        assert_eq!(relay.progress().last_finalized_block, Some(268));
    }

    #[test]
    fn relay_state__stale_block__is_ignored() {
        // Given
        let mut relay = relay(1024);
        let chain = finalized_chain(10, 3);
        relay.on_finalized_block(chain[2].clone());

        // When
        relay.on_finalized_block(chain[1].clone());

        // Then
        assert_eq!(relay.ledger().len(), 1);
        assert_eq!(relay.progress().last_finalized_block, Some(12));
    }

    #[test]
    fn relay_state__sent_job__pruned_once_subject_leaves_ledger() {
        // Given
        let capacity = 200;
        let mut relay = relay(capacity);
        let mut chain = finalized_chain(98, 400);
        with_schedule_change(&mut chain, 2, 3);
        let mut blocks = chain.into_iter();
        for block in blocks.by_ref().take(171) {
            relay.on_finalized_block(block);
        }
        assert!(relay.schedule_jobs_mut().mark_sent(100));

        // When
        for block in blocks {
            relay.on_finalized_block(block);
        }

        // Then
        assert!(relay.schedule_jobs().is_empty());
        assert_eq!(relay.ledger().len(), capacity);
    }

    #[test]
    fn relay_state__take_snapshot__empties_state() {
        // Given
        let mut relay = relay(1024);
        let mut chain = finalized_chain(98, 20);
        with_schedule_change(&mut chain, 2, 3);
        for block in chain {
            relay.on_finalized_block(block);
        }
        let expected = relay.snapshot();

        // When
        let snapshot = relay.take_snapshot();

        // Then
        assert_eq!(snapshot, expected);
        assert!(relay.ledger().is_empty());
        assert!(relay.schedule_jobs().is_empty());
        assert_eq!(relay.progress(), RelayProgress::default());

        assert_eq!(relay.active_schedule(), None);
        relay.restore(snapshot);
        assert_eq!(relay.snapshot(), expected);
        assert_eq!(relay.active_schedule().map(|s| s.version), Some(3));
        assert_eq!(relay.progress().last_finalized_block, Some(117));
    }
}

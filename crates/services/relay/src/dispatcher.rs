//! Submission of ready jobs to the foreign chain.

use crate::{
    job::{
        ActionProofJob,
        JobStatus,
        JobTable,
        ScheduleChangeJob,
    },
    ports::{
        ActionProofSubmission,
        Destination,
        ForeignChain,
        ScheduleChangeSubmission,
        SubmissionResult,
    },
    relay::RelayState,
};

/// Outcome of one dispatch sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub accepted: usize,
    pub rejected: usize,
    pub dropped: usize,
}

impl SweepReport {
    pub fn submitted(&self) -> usize {
        self.accepted.saturating_add(self.rejected)
    }
}

fn schedule_change_submission(job: &ScheduleChangeJob) -> ScheduleChangeSubmission {
    ScheduleChangeSubmission {
        subject_block_num: job.subject_block_num(),
        legacy_schedule_hash: job.evidence().legacy_schedule_hash,
        schedule: job.evidence().schedule.clone(),
        anchor_merkle: job.anchor_merkle().clone(),
        headers: job.window().headers().to_vec(),
        id_gaps: job.window().id_gaps().to_vec(),
    }
}

fn action_proof_submission(job: &ActionProofJob) -> ActionProofSubmission {
    let evidence = job.evidence();
    ActionProofSubmission {
        subject_block_num: job.subject_block_num(),
        transaction_id: evidence.transaction_id,
        action: evidence.action.clone(),
        action_receipt: evidence.action_receipt.clone(),
        receipt_inclusion_path: evidence.receipt_inclusion_path.clone(),
        anchor_merkle: job.anchor_merkle().clone(),
        headers: job.window().headers().to_vec(),
        id_gaps: job.window().id_gaps().to_vec(),
    }
}

/// Submits ready jobs one after another and moves the accepted ones to `Sent`.
///
/// Rejected jobs stay ready and are submitted again by the next sweep, without
/// any limit or backoff.
pub struct Dispatcher<F> {
    foreign_chain: F,
    destination: Destination,
}

impl<F> Dispatcher<F>
where
    F: ForeignChain,
{
    pub fn new(foreign_chain: F, destination: Destination) -> Self {
        Self {
            foreign_chain,
            destination,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub async fn sweep(&self, state: &mut RelayState) -> SweepReport {
        let mut report = SweepReport::default();

        for subject in state.schedule_jobs().ids_with_status(JobStatus::Ready) {
            let Some(job) = state.schedule_jobs().get(subject) else {
                continue
            };
            let submission = schedule_change_submission(job);
            let result = self
                .foreign_chain
                .submit_schedule_change(&self.destination, submission)
                .await;
            apply_result(
                state.schedule_jobs_mut(),
                subject,
                "schedule change",
                result,
                &mut report,
            );
        }

        for subject in state.action_jobs().ids_with_status(JobStatus::Ready) {
            let Some(job) = state.action_jobs_mut().get_mut(subject) else {
                continue
            };
            let refreshed = job.evidence_mut().refresh_inclusion_path().map(|_| ());
            if let Err(err) = refreshed {
                tracing::warn!(
                    "Dropping deposit proof for block {subject}, its receipt cannot be proven: {err}"
                );
                state.action_jobs_mut().remove(subject);
                report.dropped = report.dropped.saturating_add(1);
                continue
            }
            let submission = action_proof_submission(job);
            let result = self
                .foreign_chain
                .submit_action_proof(&self.destination, submission)
                .await;
            apply_result(
                state.action_jobs_mut(),
                subject,
                "deposit",
                result,
                &mut report,
            );
        }

        report
    }
}

fn apply_result<E>(
    jobs: &mut JobTable<E>,
    subject: u32,
    kind: &str,
    result: anyhow::Result<SubmissionResult>,
    report: &mut SweepReport,
) {
    match result {
        Ok(SubmissionResult {
            accepted: true,
            message,
        }) => {
            jobs.mark_sent(subject);
            tracing::info!(
                "The foreign chain accepted the {kind} proof for block {subject}: {message}"
            );
            report.accepted = report.accepted.saturating_add(1);
        }
        Ok(SubmissionResult {
            accepted: false,
            message,
        }) => {
            tracing::warn!(
                "The foreign chain rejected the {kind} proof for block {subject}: {message}"
            );
            report.rejected = report.rejected.saturating_add(1);
        }
        Err(err) => {
            tracing::warn!("Failed to submit the {kind} proof for block {subject}: {err:?}");
            report.rejected = report.rejected.saturating_add(1);
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FAKE_TRANSACTION_HASH,
        FakeForeignChain,
        ready_relay,
    };
    use bridge_relay_types::{
        merkle,
        test_helpers::producer_schedule,
    };
    use tracing_test::traced_test;

    fn dispatcher(chain: &FakeForeignChain) -> Dispatcher<FakeForeignChain> {
        Dispatcher::new(
            chain.clone(),
            Destination {
                endpoint: "http://foreign".into(),
                account: "bridge".into(),
            },
        )
    }

    #[tokio::test]
    async fn dispatcher__sweep__accepted_jobs_become_sent() {
        // Given
        let mut relay = ready_relay();
        let chain = FakeForeignChain::accepting();
        let dispatcher = dispatcher(&chain);

        // When
        let report = dispatcher.sweep(&mut relay).await;

        // Then
        assert_eq!(report.accepted, 2);
        assert_eq!(relay.progress().sent_jobs, 2);
        assert_eq!(relay.progress().ready_jobs, 0);
        assert_eq!(chain.schedule_submissions().len(), 1);
        assert_eq!(chain.action_submissions().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn dispatcher__accepted_submission__logs_foreign_transaction() {
        let mut relay = ready_relay();
        let chain = FakeForeignChain::accepting();

        dispatcher(&chain).sweep(&mut relay).await;

        assert!(logs_contain(&format!(
            "accepted the schedule change proof for block 100: {FAKE_TRANSACTION_HASH}"
        )));
        assert!(logs_contain(&format!(
            "accepted the deposit proof for block 100: {FAKE_TRANSACTION_HASH}"
        )));
    }

    #[tokio::test]
    async fn dispatcher__sweep__sent_jobs_are_not_resubmitted() {
        // Given
        let mut relay = ready_relay();
        let chain = FakeForeignChain::accepting();
        let dispatcher = dispatcher(&chain);
        dispatcher.sweep(&mut relay).await;

        // When
        let report = dispatcher.sweep(&mut relay).await;

        // Then
        assert_eq!(report.submitted(), 0);
        assert_eq!(chain.schedule_submissions().len(), 1);
    }

    #[tokio::test]
    async fn dispatcher__rejections__resubmit_identical_evidence() {
        // Given
        let mut relay = ready_relay();
        let chain = FakeForeignChain::rejecting();
        let dispatcher = dispatcher(&chain);
        let sweeps = 3;

        // When
        for _ in 0..sweeps {
            let report = dispatcher.sweep(&mut relay).await;
            assert_eq!(report.rejected, 2);
        }
        chain.set_accepting(true);
        let report = dispatcher.sweep(&mut relay).await;

        // Then
        assert_eq!(report.accepted, 2);
        let schedule = chain.schedule_submissions();
        assert_eq!(schedule.len(), sweeps + 1);
        assert!(schedule.windows(2).all(|pair| pair[0] == pair[1]));
        let actions = chain.action_submissions();
        assert_eq!(actions.len(), sweeps + 1);
        assert!(actions.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn dispatcher__transport_error__keeps_job_ready() {
        // Given
        let mut relay = ready_relay();
        let chain = FakeForeignChain::unreachable();
        let dispatcher = dispatcher(&chain);

        // When
        let report = dispatcher.sweep(&mut relay).await;

        // Then
        assert_eq!(report.rejected, 2);
        assert_eq!(relay.progress().ready_jobs, 2);
    }

    #[tokio::test]
    async fn dispatcher__action_submission__carries_valid_inclusion_path() {
        // Given
        let mut relay = ready_relay();
        let chain = FakeForeignChain::accepting();
        let dispatcher = dispatcher(&chain);

        // When
        dispatcher.sweep(&mut relay).await;

        // Then
        let submission = chain.action_submissions().remove(0);
        let job = relay.action_jobs().iter().next().unwrap();
        let root = merkle::merkle_root(&job.evidence().sibling_receipt_digests);
        assert_eq!(
            merkle::root_from_path(
                &submission.action_receipt.digest(),
                &submission.receipt_inclusion_path
            ),
            root
        );
        assert_eq!(submission.headers.len(), 15);
        assert_eq!(submission.id_gaps.len(), 15);
    }

    #[tokio::test]
    async fn dispatcher__schedule_submission__carries_legacy_schedule_hash() {
        // Given
        let mut relay = ready_relay();
        let legacy = producer_schedule(1).digest();
        relay
            .schedule_jobs_mut()
            .get_mut(100)
            .unwrap()
            .evidence_mut()
            .legacy_schedule_hash = Some(legacy);
        let chain = FakeForeignChain::accepting();
        let dispatcher = dispatcher(&chain);

        // When
        dispatcher.sweep(&mut relay).await;

        // Then
        let submission = chain.schedule_submissions().remove(0);
        assert_eq!(submission.legacy_schedule_hash, Some(legacy));
    }

    #[tokio::test]
    async fn dispatcher__unprovable_receipt__drops_job() {
        // Given
        let mut relay = ready_relay();
        let subject = relay.action_jobs().ids_with_status(JobStatus::Ready)[0];
        relay
            .action_jobs_mut()
            .get_mut(subject)
            .unwrap()
            .evidence_mut()
            .sibling_receipt_digests
            .clear();
        let chain = FakeForeignChain::accepting();
        let dispatcher = dispatcher(&chain);

        // When
        let report = dispatcher.sweep(&mut relay).await;

        // Then
        assert_eq!(report.dropped, 1);
        assert!(relay.action_jobs().is_empty());
        assert!(chain.action_submissions().is_empty());
    }
}

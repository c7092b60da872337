//! Proof jobs: the evidence collected for one detected event.
//!
//! A job starts `Collecting` with the subject block as the first header of its
//! [`Window`], becomes `Ready` once the window is complete and `Sent` once the
//! foreign chain accepted it. The status never goes back.

use crate::ledger::BlockRecord;
use bridge_relay_types::{
    BlockId,
    Checksum256,
    TransactionId,
    action::{
        Action,
        ActionReceipt,
    },
    blockchain::ProducerSchedule,
    merkle::{
        self,
        IncrementalMerkle,
        MerkleError,
    },
};
use serde::{
    Deserialize,
    Serialize,
};

pub mod table;
pub mod window;

pub use table::JobTable;
pub use window::{
    Window,
    WindowUpdate,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobStatus {
    Collecting,
    Ready,
    Sent,
}

/// Evidence of a producer schedule change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleChange {
    pub schedule: ProducerSchedule,
    /// Digest of the schedule being replaced, when the relay saw it announced.
    pub legacy_schedule_hash: Option<Checksum256>,
}

/// Evidence of a deposit action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvidence {
    pub transaction_id: TransactionId,
    pub action: Action,
    pub action_receipt: ActionReceipt,
    /// Every action receipt digest of the subject block, in execution order.
    pub sibling_receipt_digests: Vec<Checksum256>,
    /// Path from the receipt to the block's action merkle root. Filled in
    /// right before submission.
    pub receipt_inclusion_path: Vec<Checksum256>,
}

impl ActionEvidence {
    /// Recomputes `receipt_inclusion_path` from the sibling digests.
    pub fn refresh_inclusion_path(&mut self) -> Result<&[Checksum256], MerkleError> {
        let receipt_digest = self.action_receipt.digest();
        let index = self
            .sibling_receipt_digests
            .iter()
            .position(|digest| *digest == receipt_digest)
            .unwrap_or(self.sibling_receipt_digests.len());
        self.receipt_inclusion_path =
            merkle::inclusion_path(index, &self.sibling_receipt_digests)?;
        Ok(&self.receipt_inclusion_path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofJob<E> {
    subject_block_num: u32,
    subject_block_id: BlockId,
    status: JobStatus,
    anchor_merkle: IncrementalMerkle,
    window: Window,
    evidence: E,
}

pub type ScheduleChangeJob = ProofJob<ScheduleChange>;
pub type ActionProofJob = ProofJob<ActionEvidence>;

impl<E> ProofJob<E> {
    /// Opens a collecting job for `subject`, anchored on `anchor_merkle`.
    pub fn new(subject: &BlockRecord, anchor_merkle: IncrementalMerkle, evidence: E) -> Self {
        Self {
            subject_block_num: subject.number,
            subject_block_id: subject.id,
            status: JobStatus::Collecting,
            anchor_merkle,
            window: Window::new(subject.raw.clone()),
            evidence,
        }
    }

    pub fn subject_block_num(&self) -> u32 {
        self.subject_block_num
    }

    pub fn subject_block_id(&self) -> &BlockId {
        &self.subject_block_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn anchor_merkle(&self) -> &IncrementalMerkle {
        &self.anchor_merkle
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn evidence(&self) -> &E {
        &self.evidence
    }

    pub(crate) fn evidence_mut(&mut self) -> &mut E {
        &mut self.evidence
    }

    /// Feeds the next finalized block to the window of a collecting job and
    /// moves the job to `Ready` once the window is complete.
    ///
    /// Ready and sent jobs are left untouched.
    pub(crate) fn collect(&mut self, block: &BlockRecord) -> WindowUpdate {
        if self.status != JobStatus::Collecting {
            return WindowUpdate::Ignored
        }
        let update = self.window.push_block(block.number, block.id, &block.raw);
        if self.window.is_complete() || self.window.span_exhausted(block.number) {
            if !self.window.is_complete() {
                tracing::warn!(
                    "Job for block {} closes its window with {} headers, a cadence block was missed",
                    self.subject_block_num,
                    self.window.headers().len(),
                );
            }
            self.status = JobStatus::Ready;
        }
        update
    }

    pub(crate) fn mark_sent(&mut self) -> bool {
        if self.status == JobStatus::Ready {
            self.status = JobStatus::Sent;
            true
        } else {
            false
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        block_records,
        deposit_evidence,
    };
    use bridge_relay_types::test_helpers::producer_schedule;

    fn schedule_job(subject: &BlockRecord) -> ScheduleChangeJob {
        ProofJob::new(
            subject,
            IncrementalMerkle::default(),
            ScheduleChange {
                schedule: producer_schedule(2),
                legacy_schedule_hash: None,
            },
        )
    }

    #[test]
    fn proof_job__fifteen_spaced_blocks__ready_exactly_at_fifteenth() {
        // Given
        let blocks = block_records(100, 169);
        let spaced: Vec<_> = blocks.iter().step_by(12).collect();
        assert_eq!(spaced.len(), 15);
        let mut job = schedule_job(spaced[0]);

        // When / Then
        for (i, block) in spaced.iter().enumerate().skip(1) {
            assert_eq!(job.status(), JobStatus::Collecting);
            let update = job.collect(block);
            assert_eq!(update, WindowUpdate::HeaderAppended);
            assert_eq!(job.window().headers().len(), i + 1);
        }
        assert_eq!(job.status(), JobStatus::Ready);
        assert_eq!(job.window().headers().len(), window::MAX_HEADERS);
    }

    #[test]
    fn proof_job__ready__ignores_further_blocks() {
        // Given
        let blocks = block_records(100, 200);
        let mut job = schedule_job(&blocks[0]);
        for block in &blocks[1..=168] {
            job.collect(block);
        }
        assert_eq!(job.status(), JobStatus::Ready);
        let window = job.window().clone();

        // When
        let update = job.collect(&blocks[169]);

        // Then
        assert_eq!(update, WindowUpdate::Ignored);
        assert_eq!(job.window(), &window);
    }

    #[test]
    fn proof_job__missed_cadence_block__ready_when_span_exhausted() {
        // Given
        let blocks = block_records(100, 190);
        let mut job = schedule_job(&blocks[0]);

        // When
        for block in blocks[1..=180].iter().filter(|b| b.number != 112) {
            job.collect(block);
        }

        // Then
        assert_eq!(job.status(), JobStatus::Ready);
        assert_eq!(job.window().headers().len(), 1);
        assert_eq!(job.window().id_gaps()[0].len(), window::MAX_IDS_PER_GAP);
    }

    #[test]
    fn proof_job__mark_sent__only_from_ready() {
        let blocks = block_records(100, 170);
        let mut job = schedule_job(&blocks[0]);
        assert!(!job.mark_sent());

        for block in &blocks[1..] {
            job.collect(block);
        }
        assert!(job.mark_sent());
        assert_eq!(job.status(), JobStatus::Sent);
        assert!(!job.mark_sent());
    }

    #[test]
    fn action_evidence__refresh_inclusion_path__proves_receipt() {
        // Given
        let mut evidence = deposit_evidence(3, 5);

        // When
        let path = evidence.refresh_inclusion_path().unwrap().to_vec();

        // Then
        let root = merkle::merkle_root(&evidence.sibling_receipt_digests);
        assert_eq!(
            merkle::root_from_path(&evidence.action_receipt.digest(), &path),
            root
        );
    }

    #[test]
    fn action_evidence__receipt_not_among_siblings__is_invalid_index() {
        let mut evidence = deposit_evidence(0, 2);
        evidence.sibling_receipt_digests.remove(0);

        let result = evidence.refresh_inclusion_path();

        assert_eq!(
            result,
            Err(MerkleError::InvalidIndex { index: 1, len: 1 })
        );
    }
}

use bridge_relay_types::{
    BlockId,
    Checksum256,
    TransactionId,
    action::{
        Action,
        ActionReceipt,
        ActionTrace,
    },
    blockchain::{
        ProducerSchedule,
        SignedBlockHeader,
    },
    merkle::IncrementalMerkle,
};
use fuel_core_services::stream::BoxStream;
use serde::{
    Deserialize,
    Serialize,
};

/// A block that became irreversible on the host chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBlock {
    pub id: BlockId,
    pub block_num: u32,
    pub header: SignedBlockHeader,
    /// Merkle of the ids of every block preceding this one.
    pub blockroot_merkle: IncrementalMerkle,
}

/// A transaction executed by the host chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedTransaction {
    pub transaction_id: TransactionId,
    pub action_traces: Vec<ActionTrace>,
    pub receipts: Vec<ActionReceipt>,
}

/// Notifications emitted by the host node, in the order it produced them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostNotification {
    FinalizedBlock(FinalizedBlock),
    AppliedTransaction(AppliedTransaction),
}

/// The host node the relay runs alongside.
pub trait HostNode: Send + Sync {
    /// Stream of host notifications. Finalized blocks arrive in increasing
    /// block number order, at most once each.
    fn notifications(&self) -> BoxStream<HostNotification>;
}

/// Where submissions are sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Destination {
    pub endpoint: String,
    pub account: String,
}

/// Evidence that the producer schedule changed at `subject_block_num`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleChangeSubmission {
    pub subject_block_num: u32,
    /// Digest of the schedule the foreign chain trusts before this change.
    pub legacy_schedule_hash: Option<Checksum256>,
    pub schedule: ProducerSchedule,
    pub anchor_merkle: IncrementalMerkle,
    pub headers: Vec<SignedBlockHeader>,
    pub id_gaps: Vec<Vec<BlockId>>,
}

/// Evidence that `action` was executed in block `subject_block_num`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionProofSubmission {
    pub subject_block_num: u32,
    pub transaction_id: TransactionId,
    pub action: Action,
    pub action_receipt: ActionReceipt,
    pub receipt_inclusion_path: Vec<Checksum256>,
    pub anchor_merkle: IncrementalMerkle,
    pub headers: Vec<SignedBlockHeader>,
    pub id_gaps: Vec<Vec<BlockId>>,
}

/// Answer of the foreign chain to a submission.
///
/// `message` holds the reference of the foreign transaction when accepted and
/// the reason otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub accepted: bool,
    pub message: String,
}

impl SubmissionResult {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

/// The foreign chain that verifies the evidence.
///
/// An `Err` is handled like a rejection.
#[async_trait::async_trait]
pub trait ForeignChain: Send + Sync {
    async fn submit_schedule_change(
        &self,
        destination: &Destination,
        submission: ScheduleChangeSubmission,
    ) -> anyhow::Result<SubmissionResult>;

    async fn submit_action_proof(
        &self,
        destination: &Destination,
        submission: ActionProofSubmission,
    ) -> anyhow::Result<SubmissionResult>;
}

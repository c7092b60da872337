//! Synthetic chains and fake collaborators for tests.

use crate::{
    job::ActionEvidence,
    ledger::BlockRecord,
    ports::{
        ActionProofSubmission,
        AppliedTransaction,
        Destination,
        FinalizedBlock,
        ForeignChain,
        HostNode,
        HostNotification,
        ScheduleChangeSubmission,
        SubmissionResult,
    },
    relay::RelayState,
};
use bridge_relay_types::{
    action::ActionReceipt,
    merkle::{
        self,
        IncrementalMerkle,
    },
    test_helpers::{
        action_trace,
        header_chain,
        name,
        producer_schedule,
        receipt_for,
        transaction_id,
        transfer_action,
    },
};
use fuel_core_services::stream::{
    BoxStream,
    IntoBoxStream,
};
use std::sync::{
    Arc,
    Mutex,
};

pub const TOKEN: &str = "eosio.token";
pub const BRIDGE: &str = "bridge";

/// `count` linked finalized blocks starting at `first_block_num`, each
/// carrying the merkle of the ids before it.
pub fn finalized_chain(first_block_num: u32, count: u32) -> Vec<FinalizedBlock> {
    let headers = header_chain(first_block_num, count);
    let mut merkle = IncrementalMerkle::new();
    if let Some(first) = headers.first() {
        merkle.append(first.header.previous);
    }
    headers
        .into_iter()
        .map(|header| {
            let id = header.id();
            let block = FinalizedBlock {
                id,
                block_num: header.block_num(),
                header,
                blockroot_merkle: merkle.clone(),
            };
            merkle.append(id);
            block
        })
        .collect()
}

/// Recomputes ids, `previous` links and merkles after headers were edited.
pub fn relink(chain: &mut [FinalizedBlock]) {
    for i in 0..chain.len() {
        if let Some(parent) = i.checked_sub(1).map(|p| chain[p].clone()) {
            let mut merkle = parent.blockroot_merkle;
            merkle.append(parent.id);
            chain[i].header.header.previous = parent.id;
            chain[i].blockroot_merkle = merkle;
        }
        chain[i].id = chain[i].header.id();
        chain[i].block_num = chain[i].header.block_num();
    }
}

/// Makes `chain[index]` announce a producer schedule of `version`.
pub fn with_schedule_change(chain: &mut [FinalizedBlock], index: usize, version: u32) {
    chain[index].header.header.new_producers = Some(producer_schedule(version));
    relink(chain);
}

pub fn block_records(first_block_num: u32, count: u32) -> Vec<BlockRecord> {
    finalized_chain(first_block_num, count)
        .into_iter()
        .map(BlockRecord::from)
        .collect()
}

/// A transaction in `block_num` transferring tokens from `from` into the
/// bridge, with `receipt_count` receipts, the first one being the transfer's.
pub fn deposit_transaction(
    seed: u64,
    block_num: u32,
    from: &str,
    receipt_count: usize,
) -> AppliedTransaction {
    let action = transfer_action(TOKEN, from, BRIDGE, 100);
    let base_sequence = seed.saturating_mul(1000);
    let trace = action_trace(action.clone(), name(TOKEN), block_num, base_sequence);
    let mut receipts: Vec<_> = trace.receipt.iter().cloned().collect();
    for sequence in 1..receipt_count as u64 {
        receipts.push(receipt_for(
            &action,
            name(BRIDGE),
            base_sequence.saturating_add(sequence),
        ));
    }
    AppliedTransaction {
        transaction_id: transaction_id(seed),
        action_traces: vec![trace],
        receipts,
    }
}

/// A block record whose `action_mroot` commits to `receipts`.
pub fn record_with_action_root(block_num: u32, receipts: &[ActionReceipt]) -> BlockRecord {
    let mut record = block_records(block_num, 1).remove(0);
    let digests: Vec<_> = receipts.iter().map(ActionReceipt::digest).collect();
    record.action_root = merkle::merkle_root(&digests);
    record.raw.header.action_mroot = record.action_root;
    record
}

/// Deposit evidence whose receipt is the `index`th of `count` siblings.
pub fn deposit_evidence(index: usize, count: usize) -> ActionEvidence {
    let action = transfer_action(TOKEN, "alice", BRIDGE, 5);
    let receipts: Vec<_> = (0..count as u64)
        .map(|sequence| receipt_for(&action, name(TOKEN), sequence))
        .collect();
    ActionEvidence {
        transaction_id: transaction_id(index as u64),
        action,
        action_receipt: receipts[index].clone(),
        sibling_receipt_digests: receipts.iter().map(ActionReceipt::digest).collect(),
        receipt_inclusion_path: Vec::new(),
    }
}

/// Host notifications of a chain from 98 to 268 where block 100 announces a
/// schedule change and contains a deposit.
pub fn scenario_notifications() -> Vec<HostNotification> {
    let mut chain = finalized_chain(98, 171);
    with_schedule_change(&mut chain, 2, 2);
    let deposit = deposit_transaction(1, 100, "alice", 3);
    let mut notifications = Vec::new();
    for block in chain {
        if block.block_num == 100 {
            notifications.push(HostNotification::AppliedTransaction(deposit.clone()));
        }
        notifications.push(HostNotification::FinalizedBlock(block));
    }
    notifications
}

/// A relay holding one ready schedule change job and one ready deposit job,
/// both for block 100.
pub fn ready_relay() -> RelayState {
    let mut relay = RelayState::new(name(TOKEN), name(BRIDGE), 1024);
    for notification in scenario_notifications() {
        relay.on_notification(notification);
    }
    relay
}

/// Replays a fixed list of notifications.
#[derive(Clone, Default)]
pub struct FakeHostNode {
    notifications: Vec<HostNotification>,
}

impl FakeHostNode {
    pub fn new(notifications: Vec<HostNotification>) -> Self {
        Self { notifications }
    }
}

impl HostNode for FakeHostNode {
    fn notifications(&self) -> BoxStream<HostNotification> {
        futures::stream::iter(self.notifications.clone()).into_boxed()
    }
}

#[derive(Default)]
struct FakeForeignChainState {
    accepting: bool,
    unreachable: bool,
    schedule_submissions: Vec<ScheduleChangeSubmission>,
    action_submissions: Vec<ActionProofSubmission>,
}

pub const FAKE_TRANSACTION_HASH: &str = "0x5eed";

/// Records submissions and answers them all the same way.
#[derive(Clone, Default)]
pub struct FakeForeignChain {
    state: Arc<Mutex<FakeForeignChainState>>,
}

impl FakeForeignChain {
    fn with_state(accepting: bool, unreachable: bool) -> Self {
        let state = FakeForeignChainState {
            accepting,
            unreachable,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn accepting() -> Self {
        Self::with_state(true, false)
    }

    pub fn rejecting() -> Self {
        Self::with_state(false, false)
    }

    pub fn unreachable() -> Self {
        Self::with_state(false, true)
    }

    pub fn set_accepting(&self, accepting: bool) {
        let mut state = self.state.lock().expect("not poisoned");
        state.accepting = accepting;
        state.unreachable = false;
    }

    pub fn schedule_submissions(&self) -> Vec<ScheduleChangeSubmission> {
        self.state
            .lock()
            .expect("not poisoned")
            .schedule_submissions
            .clone()
    }

    pub fn action_submissions(&self) -> Vec<ActionProofSubmission> {
        self.state
            .lock()
            .expect("not poisoned")
            .action_submissions
            .clone()
    }

    fn answer(state: &FakeForeignChainState) -> anyhow::Result<SubmissionResult> {
        if state.unreachable {
            Err(anyhow::anyhow!("connection refused"))
        } else if state.accepting {
            Ok(SubmissionResult::accepted(FAKE_TRANSACTION_HASH))
        } else {
            Ok(SubmissionResult::rejected("proof already known"))
        }
    }
}

#[async_trait::async_trait]
impl ForeignChain for FakeForeignChain {
    async fn submit_schedule_change(
        &self,
        _: &Destination,
        submission: ScheduleChangeSubmission,
    ) -> anyhow::Result<SubmissionResult> {
        let mut state = self.state.lock().expect("not poisoned");
        state.schedule_submissions.push(submission);
        Self::answer(&state)
    }

    async fn submit_action_proof(
        &self,
        _: &Destination,
        submission: ActionProofSubmission,
    ) -> anyhow::Result<SubmissionResult> {
        let mut state = self.state.lock().expect("not poisoned");
        state.action_submissions.push(submission);
        Self::answer(&state)
    }
}

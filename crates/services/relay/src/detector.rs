//! Classifies host notifications into schedule changes and bridge deposits.

use crate::{
    ledger::BlockRecord,
    ports::AppliedTransaction,
};
use bridge_relay_types::{
    Checksum256,
    Name,
    TransactionId,
    action::{
        Action,
        ActionReceipt,
        ActionTrace,
        Transfer,
    },
    blockchain::ProducerSchedule,
    merkle,
};
use std::collections::BTreeMap;

/// `transfer`
const TRANSFER_ACTION: Name = Name::new(0xcdcd_3c2d_5700_0000);

/// A deposit seen in a block that is not final yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositCandidate {
    pub transaction_id: TransactionId,
    pub action: Action,
    pub action_receipt: ActionReceipt,
}

/// A deposit whose block became final, with every receipt digest of that block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedDeposit {
    pub candidate: DepositCandidate,
    pub receipt_digests: Vec<Checksum256>,
}

#[derive(Debug, Default)]
struct PendingBlock {
    receipt_digests: Vec<Checksum256>,
    candidate: Option<DepositCandidate>,
}

#[derive(Debug)]
pub struct EventDetector {
    token_contract: Name,
    bridge_account: Name,
    pending: BTreeMap<u32, PendingBlock>,
}

impl EventDetector {
    pub fn new(token_contract: Name, bridge_account: Name) -> Self {
        Self {
            token_contract,
            bridge_account,
            pending: BTreeMap::new(),
        }
    }

    /// The schedule announced by a finalized block, if any.
    pub fn schedule_change(block: &BlockRecord) -> Option<ProducerSchedule> {
        if !block.has_schedule_change {
            return None
        }
        block.raw.header.schedule_change()
    }

    fn is_deposit(&self, trace: &ActionTrace) -> bool {
        let action = &trace.act;
        if trace.except.is_some()
            || trace.receiver != self.token_contract
            || action.account != self.token_contract
            || action.name != TRANSFER_ACTION
        {
            return false
        }
        match action.decode_data::<Transfer>() {
            Ok(transfer) => {
                transfer.to == self.bridge_account && transfer.from != self.bridge_account
            }
            Err(_) => false,
        }
    }

    /// Records the receipts of an executed transaction and remembers the
    /// last deposit it contains as the candidate of its block.
    pub fn on_action_applied(&mut self, transaction: &AppliedTransaction) {
        let Some(block_num) = transaction.action_traces.first().map(|t| t.block_num)
        else {
            return
        };

        let pending = self.pending.entry(block_num).or_default();
        pending
            .receipt_digests
            .extend(transaction.receipts.iter().map(ActionReceipt::digest));

        let mut candidate = None;
        for trace in &transaction.action_traces {
            if !self.is_deposit(trace) {
                continue
            }
            let Some(receipt) = &trace.receipt else {
                tracing::debug!(
                    "Deposit in transaction {} has no receipt yet, skipping it",
                    transaction.transaction_id
                );
                return
            };
            candidate = Some(DepositCandidate {
                transaction_id: transaction.transaction_id,
                action: trace.act.clone(),
                action_receipt: receipt.clone(),
            });
        }

        if let Some(candidate) = candidate {
            tracing::debug!(
                "Deposit candidate in block {block_num}, transaction {}",
                candidate.transaction_id
            );
            if let Some(pending) = self.pending.get_mut(&block_num) {
                pending.candidate = Some(candidate);
            }
        }
    }

    /// Takes the deposit of a block that just became final and forgets
    /// everything recorded for it and for older blocks.
    pub fn take_finalized(&mut self, block: &BlockRecord) -> Option<DetectedDeposit> {
        let newer = self.pending.split_off(&block.number.saturating_add(1));
        let finalized = core::mem::replace(&mut self.pending, newer);
        let pending = finalized.into_iter().next_back().and_then(|(number, pending)| {
            (number == block.number).then_some(pending)
        })?;
        let candidate = pending.candidate?;

        let root = merkle::merkle_root(&pending.receipt_digests);
        if root != block.action_root {
            tracing::warn!(
                "Receipts recorded for block {} hash to {root}, the header commits to {}",
                block.number,
                block.action_root,
            );
        }

        Some(DetectedDeposit {
            candidate,
            receipt_digests: pending.receipt_digests,
        })
    }

    /// Number of blocks with recorded receipts that are not final yet.
    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

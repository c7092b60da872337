//! Builders for synthetic chains used across the workspace tests.

use crate::{
    action::{
        Action,
        ActionReceipt,
        ActionTrace,
        Asset,
        PermissionLevel,
        Transfer,
    },
    blockchain::{
        BlockHeader,
        ProducerKey,
        ProducerSchedule,
        SignedBlockHeader,
    },
    codec,
    primitives::{
        BlockId,
        Bytes32,
        Name,
    },
};

/// A block id with `block_num` in its prefix, usable as the `previous` of
/// the first header of a synthetic chain.
pub fn block_id(block_num: u32) -> BlockId {
    let mut id = codec::sha256(&block_num.to_be_bytes());
    id[..4].copy_from_slice(&block_num.to_be_bytes());
    id
}

/// A signed header extending `previous`.
pub fn signed_header(previous: BlockId) -> SignedBlockHeader {
    let block_num = BlockHeader::num_from_id(&previous).wrapping_add(1);
    SignedBlockHeader {
        header: BlockHeader {
            timestamp: block_num.wrapping_mul(2),
            producer: name("producer1"),
            previous,
            ..Default::default()
        },
        producer_signature: vec![0x5a; 65],
    }
}

/// `count` linked headers, the first one at `first_block_num`.
pub fn header_chain(first_block_num: u32, count: u32) -> Vec<SignedBlockHeader> {
    let mut previous = block_id(first_block_num.wrapping_sub(1));
    let mut chain = Vec::new();
    for _ in 0..count {
        let header = signed_header(previous);
        previous = header.id();
        chain.push(header);
    }
    chain
}

pub fn producer_schedule(version: u32) -> ProducerSchedule {
    ProducerSchedule {
        version,
        producers: vec![
            ProducerKey {
                producer_name: name("producer1"),
                block_signing_key: vec![0x02; 33],
            },
            ProducerKey {
                producer_name: name("producer2"),
                block_signing_key: vec![0x03; 33],
            },
        ],
    }
}

pub fn name(text: &str) -> Name {
    text.parse().expect("test names are valid")
}

/// A `transfer` action on `token` moving `amount` from `from` to `to`.
pub fn transfer_action(token: &str, from: &str, to: &str, amount: i64) -> Action {
    let transfer = Transfer {
        from: name(from),
        to: name(to),
        quantity: Asset {
            amount,
            symbol: 0x04_534f_4504,
        },
        memo: String::new(),
    };
    Action {
        account: name(token),
        name: name("transfer"),
        authorization: vec![PermissionLevel {
            actor: name(from),
            permission: name("active"),
        }],
        data: codec::canonical_bytes(&transfer),
    }
}

pub fn receipt_for(action: &Action, receiver: Name, global_sequence: u64) -> ActionReceipt {
    ActionReceipt {
        receiver,
        act_digest: action.digest(),
        global_sequence,
        recv_sequence: global_sequence,
        auth_sequence: vec![(receiver, global_sequence)],
        code_sequence: 1,
        abi_sequence: 1,
    }
}

/// A successful trace of `action` executed by `receiver` in `block_num`.
pub fn action_trace(
    action: Action,
    receiver: Name,
    block_num: u32,
    global_sequence: u64,
) -> ActionTrace {
    let receipt = receipt_for(&action, receiver, global_sequence);
    ActionTrace {
        action_ordinal: 1,
        receiver,
        act: action,
        receipt: Some(receipt),
        block_num,
        except: None,
    }
}

/// A distinct transaction id per seed.
pub fn transaction_id(seed: u64) -> Bytes32 {
    codec::sha256(&seed.to_le_bytes())
}

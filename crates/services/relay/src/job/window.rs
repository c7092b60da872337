use bridge_relay_types::{
    BlockId,
    blockchain::SignedBlockHeader,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Block distance between two consecutive window headers, one producer round.
pub const HEADER_CADENCE: u32 = 12;
/// Headers in a complete window.
pub const MAX_HEADERS: usize = 15;
/// Block ids sampled between two consecutive headers.
pub const MAX_IDS_PER_GAP: usize = 10;
/// Distance from the first header after which a window can no longer grow.
pub const MAX_WINDOW_SPAN: u32 = 180;

/// Headers spaced [`HEADER_CADENCE`] blocks apart, starting at the subject
/// block, and after each of them up to [`MAX_IDS_PER_GAP`] ids of the blocks
/// that follow it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    headers: Vec<SignedBlockHeader>,
    id_gaps: Vec<Vec<BlockId>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowUpdate {
    /// The block started a new header entry.
    HeaderAppended,
    /// The block id was sampled into the current gap.
    IdAppended,
    /// The current gap is saturated.
    IdDropped,
    /// The block is not newer than the last header, or the job is no longer collecting.
    Ignored,
}

impl Window {
    pub fn new(subject: SignedBlockHeader) -> Self {
        Self {
            headers: vec![subject],
            id_gaps: vec![Vec::new()],
        }
    }

    pub fn headers(&self) -> &[SignedBlockHeader] {
        &self.headers
    }

    pub fn id_gaps(&self) -> &[Vec<BlockId>] {
        &self.id_gaps
    }

    pub fn first_block_num(&self) -> u32 {
        self.headers.first().map_or(0, SignedBlockHeader::block_num)
    }

    pub fn last_block_num(&self) -> u32 {
        self.headers.last().map_or(0, SignedBlockHeader::block_num)
    }

    pub fn is_complete(&self) -> bool {
        self.headers.len() >= MAX_HEADERS
    }

    /// Whether `block_num` is too far from the first header for the window to
    /// ever receive another header.
    pub fn span_exhausted(&self, block_num: u32) -> bool {
        block_num.saturating_sub(self.first_block_num()) >= MAX_WINDOW_SPAN
    }

    /// Applies the next finalized block.
    pub fn push_block(
        &mut self,
        block_num: u32,
        block_id: BlockId,
        header: &SignedBlockHeader,
    ) -> WindowUpdate {
        let last = self.last_block_num();
        if block_num <= last || self.is_complete() {
            return WindowUpdate::Ignored
        }

        if block_num.saturating_sub(last) == HEADER_CADENCE {
            self.headers.push(header.clone());
            self.id_gaps.push(Vec::new());
            return WindowUpdate::HeaderAppended
        }

        match self.id_gaps.last_mut() {
            Some(gap) if gap.len() < MAX_IDS_PER_GAP => {
                gap.push(block_id);
                WindowUpdate::IdAppended
            }
            _ => WindowUpdate::IdDropped,
        }
    }
}

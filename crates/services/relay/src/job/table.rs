use super::{
    JobStatus,
    ProofJob,
};
use crate::ledger::BlockRecord;
use std::collections::{
    BTreeMap,
    BTreeSet,
};

/// Jobs keyed by subject block number, with one index per status so the
/// window pass and the dispatch sweep only visit the jobs they act on.
#[derive(Debug)]
pub struct JobTable<E> {
    jobs: BTreeMap<u32, ProofJob<E>>,
    collecting: BTreeSet<u32>,
    ready: BTreeSet<u32>,
    sent: BTreeSet<u32>,
}

impl<E> Default for JobTable<E> {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            collecting: BTreeSet::new(),
            ready: BTreeSet::new(),
            sent: BTreeSet::new(),
        }
    }
}

impl<E> JobTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_mut(&mut self, status: JobStatus) -> &mut BTreeSet<u32> {
        match status {
            JobStatus::Collecting => &mut self.collecting,
            JobStatus::Ready => &mut self.ready,
            JobStatus::Sent => &mut self.sent,
        }
    }

    fn index(&self, status: JobStatus) -> &BTreeSet<u32> {
        match status {
            JobStatus::Collecting => &self.collecting,
            JobStatus::Ready => &self.ready,
            JobStatus::Sent => &self.sent,
        }
    }

    /// Inserts `job`, replacing the job with the same subject block.
    pub fn insert(&mut self, job: ProofJob<E>) -> Option<ProofJob<E>> {
        let key = job.subject_block_num();
        let status = job.status();
        let replaced = self.remove(key);
        self.index_mut(status).insert(key);
        self.jobs.insert(key, job);
        replaced
    }

    pub fn remove(&mut self, subject_block_num: u32) -> Option<ProofJob<E>> {
        let job = self.jobs.remove(&subject_block_num)?;
        self.index_mut(job.status()).remove(&subject_block_num);
        Some(job)
    }

    pub fn get(&self, subject_block_num: u32) -> Option<&ProofJob<E>> {
        self.jobs.get(&subject_block_num)
    }

    pub(crate) fn get_mut(&mut self, subject_block_num: u32) -> Option<&mut ProofJob<E>> {
        self.jobs.get_mut(&subject_block_num)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.index(status).len()
    }

    /// Subject block numbers of the jobs in `status`, ascending.
    pub fn ids_with_status(&self, status: JobStatus) -> Vec<u32> {
        self.index(status).iter().copied().collect()
    }

    /// Jobs in subject block order.
    pub fn iter(&self) -> impl Iterator<Item = &ProofJob<E>> {
        self.jobs.values()
    }

    /// Feeds a finalized block to every collecting job. Returns the subject
    /// block numbers of the jobs that became ready.
    pub fn collect_block(&mut self, block: &BlockRecord) -> Vec<u32> {
        let mut readied = Vec::new();
        for key in self.ids_with_status(JobStatus::Collecting) {
            let Some(job) = self.jobs.get_mut(&key) else {
                continue
            };
            job.collect(block);
            if job.status() == JobStatus::Ready {
                readied.push(key);
            }
        }
        for key in &readied {
            self.collecting.remove(key);
            self.ready.insert(*key);
        }
        readied
    }

    /// Moves a ready job to `Sent`.
    pub fn mark_sent(&mut self, subject_block_num: u32) -> bool {
        let sent = self
            .jobs
            .get_mut(&subject_block_num)
            .is_some_and(ProofJob::mark_sent);
        if sent {
            self.ready.remove(&subject_block_num);
            self.sent.insert(subject_block_num);
        }
        sent
    }

    /// Removes sent jobs whose subject block is older than `block_num`.
    pub fn prune_sent_before(&mut self, block_num: u32) -> usize {
        let retained = self.sent.split_off(&block_num);
        let pruned = core::mem::replace(&mut self.sent, retained);
        for key in &pruned {
            self.jobs.remove(key);
        }
        pruned.len()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.collecting.clear();
        self.ready.clear();
        self.sent.clear();
    }
}

impl<E> FromIterator<ProofJob<E>> for JobTable<E> {
    fn from_iter<I: IntoIterator<Item = ProofJob<E>>>(iter: I) -> Self {
        let mut table = Self::new();
        for job in iter {
            table.insert(job);
        }
        table
    }
}

use bridge_relay_types::Name;
use std::{
    path::PathBuf,
    time::Duration,
};

/// Configuration settings for the bridge relay.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address of the foreign chain's submission endpoint.
    pub foreign_endpoint: String,
    /// Account on the foreign chain that receives the proofs.
    pub foreign_account: String,
    /// Bridge account on the host chain. Deposits are transfers into it.
    pub bridge_account: Name,
    /// Token contract whose `transfer` actions are watched.
    pub token_contract: Name,
    /// Directory holding the shutdown snapshot.
    pub data_dir: PathBuf,
    /// Deletes the snapshot at startup instead of loading it.
    pub purge_history: bool,
    /// Maximum number of finalized blocks kept in the ledger.
    pub ledger_capacity: usize,
    /// Period of the dispatch sweep.
    pub dispatch_interval: Duration,
}

#[allow(missing_docs)]
impl Config {
    pub const DEFAULT_FOREIGN_ENDPOINT: &'static str = "http://127.0.0.1:8888";
    /// `eosio.token`
    pub const DEFAULT_TOKEN_CONTRACT: Name = Name::new(0x5530_ea03_3482_a600);
    pub const DEFAULT_LEDGER_CAPACITY: usize = 1024;
    pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(1);
    pub const SNAPSHOT_FILE_NAME: &'static str = "bridge_relay.dat";

    /// Location of the shutdown snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(Self::SNAPSHOT_FILE_NAME)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            foreign_endpoint: Self::DEFAULT_FOREIGN_ENDPOINT.to_string(),
            foreign_account: String::new(),
            bridge_account: Name::default(),
            token_contract: Self::DEFAULT_TOKEN_CONTRACT,
            data_dir: PathBuf::from("."),
            purge_history: false,
            ledger_capacity: Self::DEFAULT_LEDGER_CAPACITY,
            dispatch_interval: Self::DEFAULT_DISPATCH_INTERVAL,
        }
    }
}

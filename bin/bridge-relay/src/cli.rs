use crate::adapters::{
    feed::NdjsonFeed,
    json_rpc::JsonRpcForeignChain,
};
use bridge_relay::Config;
use bridge_relay_types::Name;
use clap::Parser;
use fuel_core_services::Service as _;
use std::{
    env,
    path::PathBuf,
    str::FromStr,
};
use tracing_subscriber::{
    Layer,
    filter::EnvFilter,
    layer::SubscriberExt,
    registry,
};

pub const LOG_FILTER: &str = "RUST_LOG";
pub const HUMAN_LOGGING: &str = "HUMAN_LOGGING";

#[derive(Parser, Debug)]
#[clap(
    name = "bridge-relay",
    about = "Relays finality proofs of bridge events to a foreign chain",
    version,
    rename_all = "kebab-case"
)]
pub struct Opt {
    #[clap(flatten)]
    pub relay: RelayArgs,

    #[clap(flatten)]
    pub foreign: ForeignChainArgs,

    /// File with newline-delimited JSON host notifications. Reads stdin when omitted.
    #[clap(long = "host-feed", env)]
    pub host_feed: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RelayArgs {
    /// Account on the host chain that receives deposits.
    #[clap(long = "bridge-account", env)]
    pub bridge_account: Name,

    /// Token contract whose transfers into the bridge account are deposits.
    #[clap(long = "token-contract", default_value = "eosio.token", env)]
    pub token_contract: Name,

    /// Directory holding the relay snapshot.
    #[clap(long = "data-dir", default_value = ".", env)]
    pub data_dir: PathBuf,

    /// Discard the snapshot of the previous run instead of restoring it.
    #[clap(long = "purge-history", env)]
    pub purge_history: bool,

    /// Number of finalized blocks kept in memory.
    #[clap(long = "ledger-capacity", default_value_t = Config::DEFAULT_LEDGER_CAPACITY, env)]
    pub ledger_capacity: usize,

    /// Delay between two submission sweeps.
    #[clap(long = "dispatch-interval", default_value = "1s", env)]
    pub dispatch_interval: humantime::Duration,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ForeignChainArgs {
    /// JSON-RPC endpoint of the foreign chain.
    #[clap(long = "foreign-endpoint", default_value = Config::DEFAULT_FOREIGN_ENDPOINT, env)]
    pub foreign_endpoint: url::Url,

    /// Account on the foreign chain that submits the proofs.
    #[clap(long = "foreign-account", env)]
    pub foreign_account: String,

    /// Timeout of a single submission request.
    #[clap(long = "foreign-request-timeout", default_value = "30s", env)]
    pub request_timeout: humantime::Duration,
}

impl From<&Opt> for Config {
    fn from(opt: &Opt) -> Self {
        let RelayArgs {
            bridge_account,
            token_contract,
            data_dir,
            purge_history,
            ledger_capacity,
            dispatch_interval,
        } = opt.relay.clone();
        Config {
            foreign_endpoint: opt.foreign.foreign_endpoint.to_string(),
            foreign_account: opt.foreign.foreign_account.clone(),
            bridge_account,
            token_contract,
            data_dir,
            purge_history,
            ledger_capacity,
            dispatch_interval: dispatch_interval.into(),
        }
    }
}

pub fn init_logging() -> anyhow::Result<()> {
    let filter = match env::var_os(LOG_FILTER) {
        Some(_) => EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid `{LOG_FILTER}` provided: {e}"))?,
        None => EnvFilter::new("info"),
    };

    let human_logging = match env::var(HUMAN_LOGGING) {
        Ok(value) => bool::from_str(&value).map_err(|_| {
            anyhow::anyhow!("Expected `true` or `false` to be provided for `{HUMAN_LOGGING}`")
        })?,
        Err(_) => true,
    };

    let layer = tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr);

    let fmt = if human_logging {
        layer
            .with_ansi(true)
            .with_level(true)
            .with_line_number(true)
            .boxed()
    } else {
        layer
            .with_ansi(false)
            .with_level(true)
            .with_line_number(true)
            .json()
            .boxed()
    };

    let subscriber = registry::Registry::default().with(filter).with(fmt);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    init_logging()?;
    let opt = Opt::parse();
    exec(opt).await
}

pub async fn exec(opt: Opt) -> anyhow::Result<()> {
    let config = Config::from(&opt);
    let host = match &opt.host_feed {
        Some(path) => NdjsonFeed::file(path.clone()),
        None => NdjsonFeed::stdin(),
    };
    let foreign_chain = JsonRpcForeignChain::new(opt.foreign.request_timeout.into())?;

    tracing::info!(
        "Relaying deposits into {} to {} as {}",
        config.bridge_account,
        config.foreign_endpoint,
        config.foreign_account,
    );
    let service = bridge_relay::new_service(host, foreign_chain, config);

    tokio::select! {
        result = service.start_and_await() => {
            result?;
        }
        _ = shutdown_signal() => {
            service.stop();
        }
    }

    tokio::select! {
        result = service.await_stop() => {
            result?;
        }
        _ = shutdown_signal() => {}
    }

    service.stop_and_await().await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{
            SignalKind,
            signal,
        };
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Failed to install signal handlers: {e}");
                return std::future::pending().await
            }
        };
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("sigterm received"),
            _ = sigint.recv() => tracing::info!("sigint received"),
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C signal handler: {e}");
            return std::future::pending().await
        }
        tracing::info!("CTRL+C received");
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn opt__minimal_arguments__uses_defaults() {
        // Given
        let args = [
            "bridge-relay",
            "--bridge-account",
            "bridge",
            "--foreign-account",
            "relayer",
        ];

        // When
        let opt = Opt::try_parse_from(args).unwrap();
        let config = Config::from(&opt);

        // Then
        assert_eq!(config.bridge_account, Name::from_str("bridge").unwrap());
        assert_eq!(config.token_contract, Config::DEFAULT_TOKEN_CONTRACT);
        assert_eq!(config.foreign_account, "relayer");
        assert_eq!(config.dispatch_interval, Config::DEFAULT_DISPATCH_INTERVAL);
        assert_eq!(config.ledger_capacity, Config::DEFAULT_LEDGER_CAPACITY);
        assert!(!config.purge_history);
        assert_eq!(opt.host_feed, None);
    }

    #[test]
    fn opt__all_arguments__mapped_into_config() {
        // Given
        let args = [
            "bridge-relay",
            "--bridge-account",
            "bridge",
            "--token-contract",
            "bos.token",
            "--data-dir",
            "/var/lib/relay",
            "--purge-history",
            "--ledger-capacity",
            "64",
            "--dispatch-interval",
            "250ms",
            "--foreign-endpoint",
            "http://foreign:9944",
            "--foreign-account",
            "relayer",
            "--host-feed",
            "notifications.ndjson",
        ];

        // When
        let opt = Opt::try_parse_from(args).unwrap();
        let config = Config::from(&opt);

        // Then
        assert_eq!(config.token_contract, Name::from_str("bos.token").unwrap());
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/relay"));
        assert!(config.purge_history);
        assert_eq!(config.ledger_capacity, 64);
        assert_eq!(config.dispatch_interval, Duration::from_millis(250));
        assert_eq!(config.foreign_endpoint, "http://foreign:9944/");
        assert_eq!(opt.host_feed, Some(PathBuf::from("notifications.ndjson")));
    }

    #[test]
    fn opt__invalid_account_name__is_rejected() {
        let args = [
            "bridge-relay",
            "--bridge-account",
            "Bridge!",
            "--foreign-account",
            "relayer",
        ];

        let result = Opt::try_parse_from(args);

        assert!(result.is_err());
    }
}

//! FlashStore demo
//!
//! Installs the storage plugin over in-memory namespaces, writes a few
//! items, lets some of them expire under the background sweeper and prints
//! the resulting statistics. Set `RUST_LOG=flashstore=debug` to watch the
//! engine work.

use flashstore::{
    listener, EventKind, ExpiryConfig, Namespaces, SetOptions, StorageOptions, StoragePlugin,
    Value,
};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo configuration
struct Config {
    /// Prefix for both engines
    prefix: String,
    /// Obfuscate persistent items
    obfuscate: bool,
    /// Lifetime of the short-lived demo items
    ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: "demo:".to_string(),
            obfuscate: false,
            ttl: Duration::from_millis(300),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--prefix" | "-p" => {
                    config.prefix = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--prefix requires a value"))?;
                }
                "--ttl-ms" | "-t" => {
                    let raw = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--ttl-ms requires a value"))?;
                    config.ttl = Duration::from_millis(raw.parse()?);
                }
                "--obfuscate" | "-o" => config.obfuscate = true,
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("FlashStore version {}", flashstore::VERSION);
                    std::process::exit(0);
                }
                other => anyhow::bail!("unknown argument: {}", other),
            }
        }

        Ok(config)
    }
}

fn print_help() {
    println!(
        r#"
FlashStore demo - typed key-value persistence with expiry

USAGE:
    flashstore [OPTIONS]

OPTIONS:
    -p, --prefix <PREFIX>    Key prefix for both engines (default: demo:)
    -t, --ttl-ms <MILLIS>    Lifetime of short-lived items (default: 300)
    -o, --obfuscate          Obfuscate persistent items
    -v, --version            Print version information
        --help               Print this help message
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let storages = StoragePlugin::new()
        .with_local(
            StorageOptions::default()
                .with_prefix(config.prefix.clone())
                .with_obfuscation(config.obfuscate),
        )
        .with_session(StorageOptions::default().with_prefix(config.prefix.clone()))
        .install(&Namespaces::in_memory());

    let log_event = listener(|event| {
        info!(kind = %event.kind(), key = ?event.key(), "Storage event");
        Ok(())
    });
    for kind in [EventKind::Set, EventKind::Remove, EventKind::Expired] {
        storages.local().on(kind, log_event.clone());
        storages.session().on(kind, log_event.clone());
    }

    let sweep = ExpiryConfig {
        base_interval: config.ttl / 2,
        min_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let _sweepers = storages.start_sweepers(sweep);

    let visits = storages.bind_local("visits", Some(Value::from(0)));
    visits.update(|v| Value::from(v.and_then(|v| v.as_i64()).unwrap_or(0) + 1));

    storages.set_local(
        "profile",
        Value::object([("name", Value::from("Ariz")), ("plan", Value::from("pro"))]),
        SetOptions::default(),
    );
    storages.set_local("banner", "sale!", SetOptions::expires_in(config.ttl));
    storages.set_session("token", "abc123", SetOptions::expires_in(config.ttl));

    info!(stats = ?storages.local().get_stats(), "Local storage before expiry");

    tokio::time::sleep(config.ttl * 3).await;

    info!(stats = ?storages.local().get_stats(), "Local storage after expiry");
    info!(stats = ?storages.session().get_stats(), "Session storage after expiry");
    info!(keys = ?storages.local().keys(), visits = ?visits.get(), "Remaining local keys");

    visits.teardown();
    Ok(())
}

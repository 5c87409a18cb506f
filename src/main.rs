mod cli;

use tambayan_relay::license::{drm::DrmConfig, KeyStore};
use tambayan_relay::{config, policy::AllowListPolicy, relay::target, server};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Tambayan relay");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tambayan_relay=trace,tower_http=debug".to_string()
        } else {
            "tambayan_relay=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::CheckHost { url } => check_host(&url, cli.config.as_deref()),
        Commands::PlayerDrm {
            channel,
            widevine,
            playready,
            relay_base,
        } => {
            let drm = match (widevine, playready) {
                (Some(license_uri), _) => DrmConfig::Widevine { license_uri },
                (None, Some(license_uri)) => DrmConfig::PlayReady { license_uri },
                (None, None) => clear_key_drm(channel.as_deref(), cli.config.as_deref())?,
            };
            player_drm(drm, relay_base.as_deref())
        }
        Commands::Version => {
            println!("tambayan-relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  /api prefix: {}", config.server.api_prefix);
    println!("  Allowed hosts: {}", config.relay.allowed_hosts.join(", "));
    println!(
        "  Timeouts: connect {}s, read {}s",
        config.relay.connect_timeout_secs, config.relay.read_timeout_secs
    );
    println!("  Max attempts: {}", config.relay.max_attempts);
    println!("  PLDT route: {}", config.pldt.enabled);
    println!(
        "  License: {} declared channels, {} static keys",
        config.license.channels.len(),
        config.license.static_keys.len()
    );

    Ok(())
}

fn check_host(url: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let policy = AllowListPolicy::parse(&config.relay.allowed_hosts).map_err(anyhow::Error::msg)?;

    let decoded = target::percent_decode(url).unwrap_or_else(|| url.to_string());
    let target = target::parse_target(&decoded)?;
    let host = target.host_str().unwrap_or_default();

    if policy.is_allowed(host) {
        println!("✓ {} is allowed", host);
        Ok(())
    } else {
        anyhow::bail!("{} is not covered by the allow-list", host)
    }
}

fn clear_key_drm(channel: Option<&str>, config_path: Option<&std::path::Path>) -> Result<DrmConfig> {
    let config = config::load_config_or_default(config_path)?;
    let keys = KeyStore::from_process_env(&config.license);

    let set = match channel {
        Some(id) => keys
            .lookup(id)
            .ok_or_else(|| anyhow::anyhow!("No clear-key pair for channel '{}'", id))?,
        None => keys
            .default_key()
            .ok_or_else(|| anyhow::anyhow!("No default clear-key pair configured"))?,
    };

    Ok(DrmConfig::from(set))
}

fn player_drm(drm: DrmConfig, relay_base: Option<&str>) -> Result<()> {
    let drm = match relay_base {
        Some(base) => drm.relayed(base),
        None => drm,
    };

    println!("{}", serde_json::to_string_pretty(&drm.player_config())?);
    Ok(())
}

//! Deposit Poller CLI
//!
//! Creates a deposit intent against the wallet backend and watches it until
//! it is approved, rejected or expires.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin pix-poller -- --config pix-poller.toml deposit --amount 150.00
//! cargo run --bin pix-poller -- status 1234567890
//! cargo run --bin pix-poller -- balance
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! PIX_POLLER_CONFIG_PATH=pix-poller.toml cargo run --bin pix-poller -- deposit --amount 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pix_poller::{
    AccountCache, AnchoredClock, CacheKey, PaymentMethod, PaymentPoller, PollerConfig, PollerError,
    PollerSettings, TracingNotifier, WalletClient,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pix-poller")]
#[command(about = "Creates deposit intents and watches them until they settle")]
struct Args {
    /// Path to configuration file (default: config/pix-poller.toml or PIX_POLLER_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a deposit intent and watch it until it settles
    Deposit {
        /// Amount to deposit (e.g. 150.00)
        #[arg(short, long)]
        amount: Decimal,
        /// Payment method
        #[arg(short, long, value_enum, default_value_t = MethodArg::Pix)]
        method: MethodArg,
        /// Write the QR code PNG to this file when the backend provides one
        #[arg(long)]
        qr_out: Option<PathBuf>,
    },
    /// Fetch the current status of a payment once
    Status {
        /// Payment identifier returned at creation
        payment_id: String,
    },
    /// Show the wallet balance
    Balance,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MethodArg {
    Pix,
    Card,
}

impl From<MethodArg> for PaymentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Pix => PaymentMethod::Pix,
            MethodArg::Card => PaymentMethod::Card,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first (before initializing logging)
    let args = Args::parse();

    // Initialize structured logging
    tracing_subscriber::fmt::init();

    // Priority: CLI arg > env var > default
    let config = PollerConfig::load_from_path(args.config.as_deref())?;
    info!("Wallet backend: {}", config.service.backend_url);

    let client = Arc::new(
        WalletClient::from_config(&config).context("Failed to create wallet backend client")?,
    );
    let cache = Arc::new(AccountCache::new());
    let settings = PollerSettings::from_config(&config.polling);

    let poller = PaymentPoller::new(
        client.clone(),
        cache.clone(),
        Arc::new(TracingNotifier),
        // Expiry is measured on the monotonic clock from here on
        Arc::new(AnchoredClock::start()),
        settings,
    );
    info!(
        "Polling every {:?}, minimum amount {}",
        poller.settings().poll_interval,
        poller.settings().min_amount
    );

    match args.command {
        Command::Deposit {
            amount,
            method,
            qr_out,
        } => deposit(&poller, &client, &cache, amount, method.into(), qr_out).await,
        Command::Status { payment_id } => {
            let update = poller
                .poll_status(&payment_id)
                .await
                .context("Failed to fetch payment status")?;
            println!(
                "{}: {} (raw: {}, detail: {}, final: {})",
                payment_id,
                update.resolved_status(),
                update.raw_status,
                update.status_detail.as_deref().unwrap_or("-"),
                update.is_terminal()
            );
            Ok(())
        }
        Command::Balance => {
            let balance = client.balance().await.context("Failed to fetch balance")?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
            Ok(())
        }
    }
}

async fn deposit(
    poller: &PaymentPoller,
    client: &WalletClient,
    cache: &AccountCache,
    amount: Decimal,
    method: PaymentMethod,
    qr_out: Option<PathBuf>,
) -> Result<()> {
    let intent = poller
        .create_intent(amount, method)
        .await
        .context("Failed to create deposit intent")?;

    if let Some(payload) = &intent.qr_payload {
        println!("PIX copy-paste code:\n{}\n", payload);
    }
    if let (Some(path), Some(png)) = (&qr_out, intent.qr_image_png()) {
        let png = png.context("QR image is not valid base64")?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write QR image to {}", path.display()))?;
        println!("QR code written to {}", path.display());
    }
    println!("Waiting for payment {} (expires at {})...", intent.payment_id, intent.expires_at);

    let handle = poller.watch(intent);

    // Graceful shutdown on Ctrl+C closes the intent
    let outcome = tokio::select! {
        outcome = handle.wait_terminal() => outcome,
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, closing payment...");
            Err(PollerError::Cancelled { payment_id: handle.payment_id() })
        }
    };
    handle.close().await;

    match outcome {
        Ok(intent) => {
            println!("Payment {} approved: {}", intent.payment_id, intent.amount);
            match client.balance().await {
                Ok(balance) => {
                    cache.store(CacheKey::Balance, balance.clone()).await;
                    println!("Balance: {}", serde_json::to_string_pretty(&balance)?);
                }
                Err(e) => warn!("Failed to refresh balance: {}", e),
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

//! Bazaar price display
//!
//! Renders base-currency amounts the way the storefront shows them.

use bazaar_fx::{FormattedPrice, FxConfig, PricingEngine};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bazaar price CLI
#[derive(Parser, Debug)]
#[command(name = "bazaar-price")]
#[command(about = "Convert and format base-currency prices for a storefront language")]
struct Args {
    /// Amounts in the base currency
    amounts: Vec<f64>,

    /// Storefront language, e.g. "fr" or "ar-TN"
    #[arg(short, long)]
    language: Option<String>,

    /// Refresh stale rates before formatting
    #[arg(long)]
    refresh: bool,

    /// Print supported currencies and exit
    #[arg(long)]
    list_currencies: bool,

    /// Drop cached rates before doing anything else
    #[arg(long)]
    clear_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FxConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    let engine = PricingEngine::from_config(&config)?;

    if args.list_currencies {
        for currency in engine.supported_currencies() {
            println!("{}", currency);
        }
        return Ok(());
    }

    if args.clear_cache {
        engine.clear_cache();
    }

    if let Some(language) = &args.language {
        let descriptor = engine.set_active_language(language);
        info!(language = %language, currency = %descriptor.code, "Active language set");
    }

    let active = engine.active_currency();
    info!(
        language = %engine.resolver().active_language(),
        currency = %active.code,
        "Formatting {} amount(s)",
        args.amounts.len()
    );

    for amount in &args.amounts {
        let formatted = if args.refresh {
            engine.format_async(*amount).await
        } else {
            engine.format_sync(*amount)
        };
        match formatted {
            Ok(formatted) => println!("{}", describe(*amount, &formatted)),
            Err(e) => warn!(amount = *amount, error = %e, "Could not format amount"),
        }
    }

    Ok(())
}

fn describe(amount: f64, formatted: &FormattedPrice) -> String {
    let mut line = format!("{}\t{}", amount, formatted.text);

    if let Some(origin) = formatted.price.origin {
        line.push_str(&format!("\t{}", origin));
    }
    if let Some(degradation) = &formatted.price.degradation {
        line.push_str(&format!("\t({})", degradation));
    }

    line
}

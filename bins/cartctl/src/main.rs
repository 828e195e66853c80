// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! cartctl
//!
//! Drives the cart sync engine against the storefront REST endpoint: loads the
//! cart, queues one command's worth of changes, waits for the queue to drain,
//! and prints the reconciled cart.

use anyhow::{bail, Context, Result};
use cart_config_fs::FsConfigStore;
use cart_gateway_http::HttpCartGateway;
use cart_sync_core::{CartEngine, CartEvent, CartSnapshot, ConfigService};
use clap::Parser;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Storefront cart client")]
struct Args {
    /// API root, e.g. https://shop.example/api (overrides saved prefs)
    #[arg(long)]
    base_url: Option<String>,
    /// Bearer token of the signed-in user
    #[arg(long, env = "CART_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Per-call timeout in milliseconds (overrides saved prefs)
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Print the cart as JSON instead of a table
    #[arg(long)]
    json: bool,
    /// Command to execute
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the current cart
    Show,
    /// Add units of a product already in the cart
    Inc {
        /// Product id
        product: String,
        /// Number of clicks
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Take units of a product away (the line disappears at zero)
    Dec {
        /// Product id
        product: String,
        /// Number of clicks
        #[arg(long, default_value_t = 1)]
        times: u32,
    },
    /// Jump a product to an exact quantity (>= 1)
    Set {
        /// Product id
        product: String,
        /// Target quantity
        quantity: u32,
    },
    /// Drop a product from the cart
    Remove {
        /// Product id
        product: String,
    },
    /// Empty the cart
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    // Config (best-effort)
    let stored = FsConfigStore::new()
        .map(ConfigService::new)
        .and_then(|config| config.cart_prefs());
    if let Err(err) = &stored {
        warn!(%err, "using default cart prefs");
    }

    let mut prefs = stored.unwrap_or_default();
    if let Some(url) = args.base_url {
        prefs.base_url = url;
    }
    if let Some(ms) = args.timeout_ms {
        prefs.call_timeout_ms = Some(ms);
    }

    let token = args
        .token
        .context("no credential: pass --token or set CART_TOKEN")?;
    let gateway = HttpCartGateway::from_prefs(&prefs, token).context("build cart gateway")?;
    info!(endpoint = %gateway.endpoint(), "using cart endpoint");

    let engine = CartEngine::new(gateway, prefs.engine_config());
    let mut events = engine.events();
    engine.load().await.context("load cart")?;

    match args.cmd {
        Command::Show => {}
        Command::Inc { product, times } => {
            for _ in 0..times {
                if engine.increment(product.as_str())?.is_none() {
                    bail!("product {product} is not in the cart");
                }
            }
        }
        Command::Dec { product, times } => {
            for _ in 0..times {
                if engine.decrement(product.as_str())?.is_none() {
                    break;
                }
            }
        }
        Command::Set { product, quantity } => {
            engine.set_quantity(product.as_str(), quantity)?;
        }
        Command::Remove { product } => {
            engine.remove(product.as_str())?;
        }
        Command::Clear => {
            engine.clear()?;
        }
    }
    engine.idle().await;
    engine.close();

    report_failures(&mut events);
    let view = engine.view();
    let failures = view.failed;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view.projection)?);
    } else {
        print_table(&view.projection);
    }
    if failures > 0 {
        bail!("{failures} cart change(s) failed; showing server state");
    }
    Ok(())
}

/// Log what went wrong. The exit status comes from the engine's own failure
/// count, since a long burst can outrun the event channel.
fn report_failures(events: &mut Receiver<CartEvent>) {
    loop {
        match events.try_recv() {
            Ok(CartEvent::Settled {
                mutation,
                outcome: Err(err),
            }) => {
                warn!(id = %mutation.id, op = ?mutation.op, %err, "cart change failed");
            }
            Ok(CartEvent::ReconcileFailed(err)) => {
                warn!(%err, "could not refresh cart; shown totals may be stale");
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "too many cart events to report individually");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

fn print_table(cart: &CartSnapshot) {
    if cart.is_empty() {
        println!("Cart is empty.");
        return;
    }
    println!("{:<16} {:>5} {:>10} {:>10}  TITLE", "PRODUCT", "QTY", "UNIT", "TOTAL");
    for line in &cart.lines {
        println!(
            "{:<16} {:>5} {:>10.2} {:>10.2}  {}",
            line.product, line.quantity, line.unit_price, line.line_total, line.title
        );
    }
    println!("{:<16} {:>5} {:>10} {:>10.2}", "", cart.item_count(), "", cart.total);
}

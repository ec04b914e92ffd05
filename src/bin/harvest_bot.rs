use beeharvest::{
    bot::BotRunner,
    client::HttpConnector,
    config::BotConfig,
    logging,
};
use colored::*;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::load_or_default(CONFIG_PATH)?;
    logging::init(&config.logging)?;

    println!("{}", r#"
    ╔═══════════════════════════════════════════════════════════════╗
    ║                    Auto BeeHarvest Bot                        ║
    ║      daily claim · spins · combo · mining · squad · stake     ║
    ╚═══════════════════════════════════════════════════════════════╝
    "#.cyan());

    info!("🐝 Starting BeeHarvest Bot...");
    info!("🌐 API: {}", config.api.base_url);
    info!("📄 Accounts: {}", config.accounts_path);
    info!(
        "⚙️  Spin: {} | Combo: {} | Mining: {} | Stake: {}",
        config.features.enable_spin,
        config.features.enable_combo,
        config.features.enable_mining_upgrade,
        config.features.enable_stake
    );
    if !config.drift_guard.enabled {
        warn!("Endpoint drift guard is disabled");
    }

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        // a second Ctrl+C does not wait for the in-flight call
        if !r.swap(false, Ordering::SeqCst) {
            std::process::exit(130);
        }
        println!("\n🛑 Stopping bot... (press Ctrl+C again to force)");
    })?;

    let connector = Arc::new(HttpConnector::new(config.api.clone()));
    let mut runner = BotRunner::new(config, connector).with_running_flag(Arc::clone(&running));

    match runner.run().await {
        Ok(()) => {
            if !running.load(Ordering::SeqCst) {
                warn!("Bot stopped by user");
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", format!("❌ Bot halted: {}", e).red().bold());
            Err(e.into())
        }
    }
}

//! Per-account session: authenticate, then work through every game action in
//! a fixed order.
//!
//! Each step swallows its own failures so that one broken endpoint only costs
//! that step. Two things end the session early: no token from the auth
//! exchange (this account only) and endpoint drift (the whole run).

use crate::{
    client::{ApiResponse, GameClient, Transport},
    config::{BotConfig, ComponentConfig},
    error::{BotError, Result},
    guard::EndpointGuard,
    models::{Credential, GameTask, Reward},
    utils::{pause_ms, value_as_u64},
};
use colored::*;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Spin batch sizes, largest first.
pub const SPIN_BATCHES: [u64; 3] = [5, 3, 1];

/// Number of items submitted in one combo guess.
pub const COMBO_SIZE: usize = 4;

/// How a workflow invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    AbortAccount,
    AbortRun { endpoint: String },
}

/// Greedy split of `available` spins into batch calls.
pub fn plan_spins(available: u64) -> Vec<u64> {
    let mut remaining = available;
    let mut plan = Vec::new();
    for batch in SPIN_BATCHES {
        while remaining >= batch {
            plan.push(batch);
            remaining -= batch;
        }
    }
    plan
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded(u32),
    MaxLevel,
    InsufficientFunds,
    Rejected(String),
}

/// Interpret one `next_level` response.
pub fn classify_upgrade(response: &ApiResponse) -> UpgradeOutcome {
    let message = response.message().unwrap_or_default();
    let lowered = message.to_lowercase();

    if lowered.contains("insufficient") || lowered.contains("not enough") {
        return UpgradeOutcome::InsufficientFunds;
    }
    if lowered.contains("max level") || lowered.contains("maximum level") {
        return UpgradeOutcome::MaxLevel;
    }
    if !response.is_success() {
        return UpgradeOutcome::Rejected(format!("status {}: {}", response.status, message));
    }

    match response
        .data()
        .and_then(|data| data.get("level"))
        .and_then(value_as_u64)
    {
        Some(level) => UpgradeOutcome::Upgraded(level.min(u32::MAX as u64) as u32),
        None => UpgradeOutcome::Rejected("response carries no level".to_string()),
    }
}

/// Log a failed step and carry on, unless it is run-fatal.
fn soft(tag: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_run_fatal() => Err(e),
        Err(e) => {
            warn!("{}", format!("[{}] ✗ {}", tag, e).yellow());
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

pub struct AccountWorkflow<'a> {
    config: &'a BotConfig,
    client: GameClient,
    running: Arc<AtomicBool>,
}

impl<'a> AccountWorkflow<'a> {
    pub fn new(config: &'a BotConfig, transport: Arc<dyn Transport>, guard: Arc<EndpointGuard>) -> Self {
        Self {
            config,
            client: GameClient::new(transport, guard),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share the shutdown flag. Once cleared, no further game call is started.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop_requested(&self) -> bool {
        if self.is_running() {
            return false;
        }
        info!("{}", "Stop requested - leaving account early".yellow());
        true
    }

    /// Run every step for one account. The session token is dropped with
    /// `self` when this returns.
    pub async fn run(mut self, credential: &Credential) -> Flow {
        match self
            .client
            .authenticate(credential, self.config.timing.auth_retry_secs)
            .await
        {
            Ok(Some(_)) => info!("{}", "[Auth] ✓ Token received".green()),
            Ok(None) => {
                error!("{}", "[Auth] ✗ No token received - skipping account".red());
                return Flow::AbortAccount;
            }
            Err(BotError::EndpointDrift { endpoint }) => return Flow::AbortRun { endpoint },
            Err(e) => {
                error!("{}", format!("[Auth] ✗ Failed to get token - skipping account: {}", e).red());
                return Flow::AbortAccount;
            }
        }

        match self.run_steps().await {
            Ok(()) => Flow::Continue,
            Err(BotError::EndpointDrift { endpoint }) => Flow::AbortRun { endpoint },
            Err(e) => {
                // steps only surface run-fatal errors
                error!("{}", format!("Account Error: {}", e).red());
                Flow::Continue
            }
        }
    }

    async fn run_steps(&self) -> Result<()> {
        if self.stop_requested() {
            return Ok(());
        }
        soft("Profile", self.show_profile().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Daily", self.claim_daily().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Spin", self.play_spins().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Combo", self.play_combo().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Mining", self.upgrade_mining().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Squad", self.join_squad().await)?;
        if self.stop_requested() {
            return Ok(());
        }
        soft("Task", self.process_tasks().await)?;
        if self.stop_requested() {
            return Ok(());
        }

        let in_squad = match self.client.profile().await {
            Ok(profile) => profile.in_squad(),
            Err(e) if e.is_run_fatal() => return Err(e),
            Err(e) => {
                warn!("{}", format!("[Squad] ✗ Error checking squad status: {}", e).yellow());
                false
            }
        };
        if self.stop_requested() {
            return Ok(());
        }

        soft("Stake", self.stake(in_squad).await)
    }

    async fn show_profile(&self) -> Result<()> {
        let profile = self.client.profile().await?;
        info!(
            "{}",
            format!(
                "Account: {} | Balance: {}",
                profile.username.as_deref().unwrap_or("unknown"),
                profile.balance
            )
            .cyan()
        );
        Ok(())
    }

    async fn claim_daily(&self) -> Result<()> {
        let response = self.client.claim_streak().await?;
        let message = response.message_or("Unknown response");
        if response.is_success() {
            info!("{}", format!("[Daily] ✓ {}", message).green());
        } else {
            info!("{}", format!("[Daily] {}", message).yellow());
        }
        Ok(())
    }

    async fn play_spins(&self) -> Result<()> {
        if !self.config.features.enable_spin {
            info!("{}", "[Spin] Spin feature is disabled in config".yellow());
            return Ok(());
        }

        let mut remaining = self.client.spin_count().await?;
        info!("{}", format!("[Spin] Available spins: {}", remaining).cyan());

        for batch in SPIN_BATCHES {
            while remaining >= batch {
                if !self.is_running() {
                    return Ok(());
                }
                info!("{}", format!("[Spin] Performing {}x spin", batch).cyan());
                let outcome = self.client.spin(batch).await;
                pause_ms(self.config.timing.spin_pause_ms).await;

                match outcome {
                    Ok(rewards) => {
                        log_rewards(&rewards);
                        remaining -= batch;
                    }
                    Err(e) if e.is_run_fatal() => return Err(e),
                    Err(e) => {
                        warn!("{}", format!("[Spin] ✗ {}x spin failed: {}", batch, e).yellow());
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn play_combo(&self) -> Result<()> {
        if !self.config.features.enable_combo {
            info!("{}", "[Combo] Combo feature is disabled in config".yellow());
            return Ok(());
        }

        let items = self.client.combo_items().await?;
        if items.len() < COMBO_SIZE {
            warn!(
                "{}",
                format!("[Combo] Only {} items available, need {}", items.len(), COMBO_SIZE).yellow()
            );
            return Ok(());
        }

        let picks: Vec<Value> = {
            let mut rng = rand::thread_rng();
            items.choose_multiple(&mut rng, COMBO_SIZE).cloned().collect()
        };
        debug!("[Combo] Submitting {:?}", picks);

        let response = self.client.check_combo(&picks).await?;
        let message = response.message_or("Unknown response");

        if message.to_lowercase().contains("already played") {
            info!("{}", format!("[Combo] {}", message).cyan());
        } else if response.is_success() {
            info!("{}", format!("[Combo] ✓ {}", message).green());
        } else {
            warn!("{}", format!("[Combo] ⚠ {}", message).yellow());
        }
        Ok(())
    }

    async fn upgrade_mining(&self) -> Result<()> {
        if !self.config.features.enable_mining_upgrade {
            info!("{}", "[Mining] Mining upgrades are disabled in config".yellow());
            return Ok(());
        }

        for (name, component) in self.config.mining.ordered() {
            if !self.is_running() {
                break;
            }
            if !component.enabled {
                debug!("[Mining] {} upgrades disabled", name);
                continue;
            }
            soft("Mining", self.upgrade_component(name, component).await)?;
        }
        Ok(())
    }

    /// Buy levels for one component until funds run out or it is maxed.
    async fn upgrade_component(&self, name: &str, component: &ComponentConfig) -> Result<()> {
        for attempt in 0..component.max_level {
            if attempt > 0 {
                pause_ms(self.config.timing.upgrade_pause_ms).await;
            }
            if !self.is_running() {
                return Ok(());
            }

            let response = self.client.upgrade(name).await?;
            match classify_upgrade(&response) {
                UpgradeOutcome::Upgraded(level) if level >= component.max_level => {
                    info!(
                        "{}",
                        format!("[Mining] ✓ {} reached max level {}", name, component.max_level).green()
                    );
                    return Ok(());
                }
                UpgradeOutcome::Upgraded(level) => {
                    info!("{}", format!("[Mining] ✓ {} upgraded to level {}", name, level).green());
                }
                UpgradeOutcome::MaxLevel => {
                    info!("{}", format!("[Mining] {} is already at max level", name).cyan());
                    return Ok(());
                }
                UpgradeOutcome::InsufficientFunds => {
                    info!("{}", format!("[Mining] Not enough balance to upgrade {}", name).yellow());
                    return Ok(());
                }
                UpgradeOutcome::Rejected(reason) => {
                    return Err(BotError::malformed(&response.endpoint, reason));
                }
            }
        }
        Ok(())
    }

    async fn join_squad(&self) -> Result<()> {
        let squad = &self.config.squad;
        let response = self.client.join_squad(squad.id).await?;
        info!("{}", format!("[Squad] Join Squad: {}", response.message_or("Unknown response")).green());

        if squad.donate_amount > 0.0 {
            let response = self.client.donate(squad.donate_amount).await?;
            let status = if response.is_success() { "✓" } else { "✗" };
            info!(
                "{}",
                format!(
                    "[Squad] Donated {:.5} - Status: {} {}",
                    squad.donate_amount,
                    status,
                    response.message_or("")
                )
                .green()
            );
        }
        Ok(())
    }

    async fn process_tasks(&self) -> Result<()> {
        let tasks = self.client.tasks().await?;
        if tasks.is_empty() {
            info!("[Task] No tasks available");
            return Ok(());
        }
        info!("[Task] Found {} tasks", tasks.len());

        for task in &tasks {
            if !self.is_running() {
                break;
            }
            if task.ended {
                info!("{}", format!("[Task] ⚠ {} - Task has ended", task.title).yellow());
                continue;
            }
            log_transfer(task);

            match self.client.verify_task(&task.id_string()).await {
                Ok(response) if response.is_success() => {
                    info!(
                        "{}",
                        format!("[Task] ✓ {}", response.message_or("Task completed")).green()
                    );
                }
                Ok(response) => {
                    warn!("{}", format!("[Task] ⚠ {}", response.message_or("Unknown error")).yellow());
                }
                Err(e) if e.is_run_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}", format!("[Task] ✗ {} - Verification error: {}", task.title, e).yellow());
                }
            }
        }
        Ok(())
    }

    /// Stake the whole balance, but only for confirmed squad members.
    async fn stake(&self, in_squad: bool) -> Result<()> {
        if !self.config.features.enable_stake {
            debug!("[Stake] Staking disabled in config");
            return Ok(());
        }

        let balance = self.client.profile().await?.balance;
        info!("{}", format!("[Stake] Balance: {:.5}", balance).cyan());

        if balance <= 0.0 {
            return Ok(());
        }
        if !in_squad {
            warn!(
                "{}",
                format!("[Stake] Skipping stake for {:.5} tokens - Account not in squad", balance).yellow()
            );
            return Ok(());
        }

        let response = self.client.stake(balance).await?;
        let status = if response.is_success() { "✓" } else { "✗" };
        info!("{}", format!("[Stake] Staked {:.5} tokens - Status: {}", balance, status).green());
        Ok(())
    }
}

fn log_rewards(rewards: &[Reward]) {
    for reward in rewards {
        info!(
            "{}",
            format!(
                "[Spin] Reward: {}x {} (value: {})",
                reward.count, reward.kind, reward.value
            )
            .green()
        );
    }
}

/// Transfer tasks carry their payload as JSON text; it is only logged.
fn log_transfer(task: &GameTask) {
    let Some(criterion) = task.transfer_criterion() else {
        return;
    };
    let Some(description) = criterion.description.as_deref() else {
        return;
    };

    match serde_json::from_str::<Value>(description) {
        Ok(payload) => info!(
            "{}",
            format!("[Task] ℹ {} - Transfer task detected: {}", task.title, payload).cyan()
        ),
        Err(_) => warn!(
            "{}",
            format!("[Task] ✗ {} - Invalid transfer data format", task.title).red()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    const AUTH: &str = "POST /auth/validate";
    const PROFILE: &str = "GET /user/profile";
    const SPIN_INFO: &str = "GET /spinner/spin";
    const SPIN: &str = "POST /spinner/spin";
    const STAKE: &str = "POST /token_pool/";

    fn quiet_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.features.enable_spin = false;
        config.features.enable_combo = false;
        config.features.enable_stake = false;
        config.features.enable_mining_upgrade = false;
        config.timing.spin_pause_ms = 0;
        config.timing.upgrade_pause_ms = 0;
        config.timing.auth_retry_secs = 0;
        config
    }

    fn scripted_with_auth() -> Arc<ScriptedTransport> {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(AUTH, 200, json!({"data": {"token": "tok"}}));
        transport
    }

    async fn run(config: &BotConfig, transport: &Arc<ScriptedTransport>) -> Flow {
        let transport: Arc<dyn Transport> = transport.clone();
        run_on(config, transport, Arc::new(AtomicBool::new(true))).await
    }

    async fn run_on(config: &BotConfig, transport: Arc<dyn Transport>, running: Arc<AtomicBool>) -> Flow {
        let guard = Arc::new(EndpointGuard::default());
        AccountWorkflow::new(config, transport, guard)
            .with_running_flag(running)
            .run(&Credential::new("user=1"))
            .await
    }

    /// Clears the shutdown flag as soon as a request for `path_prefix` goes out.
    struct StopOnPath {
        inner: Arc<ScriptedTransport>,
        running: Arc<AtomicBool>,
        path_prefix: &'static str,
    }

    #[async_trait::async_trait]
    impl Transport for StopOnPath {
        async fn send(&self, request: &crate::client::ApiRequest) -> Result<crate::client::RawResponse> {
            if request.path.starts_with(self.path_prefix) {
                self.running.store(false, Ordering::SeqCst);
            }
            self.inner.send(request).await
        }
    }

    fn spin_sizes(transport: &ScriptedTransport) -> Vec<u64> {
        transport
            .calls_to(SPIN)
            .iter()
            .filter_map(|r| r.body.as_ref()?.get("spin_count")?.as_u64())
            .collect()
    }

    #[test]
    fn test_plan_spins() {
        assert_eq!(plan_spins(13), vec![5, 5, 3]);
        assert_eq!(plan_spins(7), vec![5, 1, 1]);
        assert_eq!(plan_spins(4), vec![3, 1]);
        assert!(plan_spins(0).is_empty());
    }

    #[tokio::test]
    async fn test_missing_token_aborts_account_only() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(AUTH, 200, json!({"data": {"user": {}}}));

        let flow = run(&quiet_config(), &transport).await;
        assert_eq!(flow, Flow::AbortAccount);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_steps_do_not_stop_the_workflow() {
        // nothing but auth is scripted, every later call fails
        let transport = scripted_with_auth();
        let flow = run(&quiet_config(), &transport).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(transport.calls_to("POST /user/streak/claim").len(), 1);
        assert_eq!(transport.calls_to("POST /user/join_squad/2637").len(), 1);
        assert_eq!(transport.calls_to("GET /tasks/user").len(), 1);
        // profile is read for display and for the squad check
        assert_eq!(transport.calls_to(PROFILE).len(), 2);
    }

    #[tokio::test]
    async fn test_spins_consume_largest_batches_first() {
        let mut config = quiet_config();
        config.features.enable_spin = true;

        let transport = scripted_with_auth();
        transport.push_json(SPIN_INFO, 200, json!({"data": {"spin_count": 13}}));
        for _ in 0..3 {
            transport.push_json(SPIN, 200, json!({"data": [{"type": "honey", "value": 5, "count": 1}]}));
        }

        assert_eq!(run(&config, &transport).await, Flow::Continue);
        assert_eq!(spin_sizes(&transport), vec![5, 5, 3]);
    }

    #[tokio::test]
    async fn test_spins_with_seven_available() {
        let mut config = quiet_config();
        config.features.enable_spin = true;

        let transport = scripted_with_auth();
        transport.push_json(SPIN_INFO, 200, json!({"data": {"spin_count": 7}}));
        for _ in 0..3 {
            transport.push_json(SPIN, 200, json!({"data": [{"type": "bee", "value": 1, "count": 2}]}));
        }

        run(&config, &transport).await;
        assert_eq!(spin_sizes(&transport), vec![5, 1, 1]);
    }

    #[tokio::test]
    async fn test_no_spins_means_no_spin_calls() {
        let mut config = quiet_config();
        config.features.enable_spin = true;

        let transport = scripted_with_auth();
        transport.push_json(SPIN_INFO, 200, json!({"data": {"spin_count": 0}}));

        run(&config, &transport).await;
        assert!(transport.calls_to(SPIN).is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_moves_to_next_tier() {
        let mut config = quiet_config();
        config.features.enable_spin = true;

        let transport = scripted_with_auth();
        transport.push_json(SPIN_INFO, 200, json!({"data": {"spin_count": 6}}));

        run(&config, &transport).await;
        // no spin call is scripted: each tier fails once and is abandoned
        assert_eq!(spin_sizes(&transport), vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn test_upgrade_stops_at_max_level() {
        let mut config = quiet_config();
        config.features.enable_mining_upgrade = true;
        config.mining.upgrade_sequence = vec!["farmer".to_string()];

        let transport = scripted_with_auth();
        transport.push_json(
            "POST /user/boost/farmer/next_level",
            200,
            json!({"message": "Upgraded", "data": {"level": 10}}),
        );

        run(&config, &transport).await;
        assert_eq!(transport.calls_to("POST /user/boost/farmer/next_level").len(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_stops_on_insufficient_funds() {
        let mut config = quiet_config();
        config.features.enable_mining_upgrade = true;
        config.mining.upgrade_sequence = vec!["honey".to_string()];

        let transport = scripted_with_auth();
        transport.push_json(
            "POST /user/boost/honey/next_level",
            400,
            json!({"message": "Insufficient balance"}),
        );

        run(&config, &transport).await;
        assert_eq!(transport.calls_to("POST /user/boost/honey/next_level").len(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_exhausts_components_in_order() {
        let mut config = quiet_config();
        config.features.enable_mining_upgrade = true;
        config.mining.components.get_mut("beehive").unwrap().enabled = false;

        let transport = scripted_with_auth();
        let farmer = "POST /user/boost/farmer/next_level";
        transport.push_json(farmer, 200, json!({"message": "ok", "data": {"level": 4}}));
        transport.push_json(farmer, 200, json!({"message": "ok", "data": {"level": 5}}));
        transport.push_json(farmer, 200, json!({"message": "Not enough honey", "data": {"level": 5}}));
        transport.push_json(
            "POST /user/boost/bee/next_level",
            200,
            json!({"message": "Max level reached", "data": {"level": 20}}),
        );
        transport.push_json(
            "POST /user/boost/honey/next_level",
            200,
            json!({"message": "ok", "data": {"level": 50}}),
        );

        run(&config, &transport).await;

        let order: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.path.clone())
            .filter(|p| p.starts_with("/user/boost/"))
            .collect();
        assert_eq!(
            order,
            vec![
                "/user/boost/farmer/next_level",
                "/user/boost/farmer/next_level",
                "/user/boost/farmer/next_level",
                "/user/boost/bee/next_level",
                "/user/boost/honey/next_level",
            ]
        );
    }

    #[tokio::test]
    async fn test_upgrade_never_exceeds_max_level_attempts() {
        let mut config = quiet_config();
        config.features.enable_mining_upgrade = true;
        config.mining.upgrade_sequence = vec!["farmer".to_string()];
        config.mining.components.get_mut("farmer").unwrap().max_level = 3;

        let transport = scripted_with_auth();
        for _ in 0..5 {
            // level never advances
            transport.push_json(
                "POST /user/boost/farmer/next_level",
                200,
                json!({"message": "ok", "data": {"level": 1}}),
            );
        }

        run(&config, &transport).await;
        assert_eq!(transport.calls_to("POST /user/boost/farmer/next_level").len(), 3);
    }

    #[tokio::test]
    async fn test_combo_submits_four_distinct_items() {
        let mut config = quiet_config();
        config.features.enable_combo = true;

        let transport = scripted_with_auth();
        transport.push_json("GET /combo/items", 200, json!({"data": [1, 2, 3, 4, 5, 6]}));
        transport.push_json("POST /combo/check", 400, json!({"message": "You have ALREADY PLAYED today"}));

        assert_eq!(run(&config, &transport).await, Flow::Continue);

        let calls = transport.calls_to("POST /combo/check");
        assert_eq!(calls.len(), 1);
        let mut picked: Vec<u64> = calls[0].body.as_ref().unwrap()["combo"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), COMBO_SIZE);
        assert!(picked.iter().all(|id| (1..=6).contains(id)));
    }

    #[tokio::test]
    async fn test_combo_skipped_with_too_few_items() {
        let mut config = quiet_config();
        config.features.enable_combo = true;

        let transport = scripted_with_auth();
        transport.push_json("GET /combo/items", 200, json!({"data": [1, 2]}));

        run(&config, &transport).await;
        assert!(transport.calls_to("POST /combo/check").is_empty());
    }

    #[tokio::test]
    async fn test_tasks_skip_ended_and_verify_once() {
        let transport = scripted_with_auth();
        transport.push_json(
            "GET /tasks/user",
            200,
            json!({"data": [
                {"id": 1, "title": "Join channel", "type": "telegram", "ended": false},
                {"id": 2, "title": "Old", "type": "telegram", "ended": true},
                {"id": 3, "title": "Send", "type": "other", "criterions": [
                    {"type": "transfer", "description": "{\"amount\": 1}"},
                    {"type": "transfer", "description": "not json"}
                ]}
            ]}),
        );
        transport.push_json("POST /tasks/check_tg_task/1", 200, json!({"message": "done"}));
        transport.push_json("POST /tasks/check_tg_task/3", 400, json!({"message": "not yet"}));

        run(&quiet_config(), &transport).await;

        assert_eq!(transport.calls_to("POST /tasks/check_tg_task/1").len(), 1);
        assert!(transport.calls_to("POST /tasks/check_tg_task/2").is_empty());
        assert_eq!(transport.calls_to("POST /tasks/check_tg_task/3").len(), 1);
    }

    fn stake_config() -> BotConfig {
        let mut config = quiet_config();
        config.features.enable_stake = true;
        config
    }

    fn script_profiles(transport: &ScriptedTransport, balance: f64, squad_id: Option<i64>) {
        // display, squad check, stake balance
        for _ in 0..3 {
            transport.push_json(
                PROFILE,
                200,
                json!({"data": {"tg_username": "bee", "balance": balance, "squad_id": squad_id}}),
            );
        }
    }

    #[tokio::test]
    async fn test_stake_full_balance_for_squad_member() {
        let transport = scripted_with_auth();
        script_profiles(&transport, 42.5, Some(2637));
        transport.push_json(STAKE, 200, json!({"message": "ok"}));

        run(&stake_config(), &transport).await;

        let calls = transport.calls_to(STAKE);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body, Some(json!({"amount": 42.5})));
    }

    #[tokio::test]
    async fn test_no_stake_without_squad() {
        let transport = scripted_with_auth();
        script_profiles(&transport, 42.5, None);

        run(&stake_config(), &transport).await;
        assert!(transport.calls_to(STAKE).is_empty());
    }

    #[tokio::test]
    async fn test_no_stake_with_zero_balance() {
        let transport = scripted_with_auth();
        script_profiles(&transport, 0.0, Some(2637));

        run(&stake_config(), &transport).await;
        assert!(transport.calls_to(STAKE).is_empty());
    }

    #[tokio::test]
    async fn test_no_stake_with_nan_balance() {
        let transport = scripted_with_auth();
        for _ in 0..3 {
            transport.push_json(
                PROFILE,
                200,
                json!({"data": {"tg_username": "bee", "balance": "NaN", "squad_id": 2637}}),
            );
        }

        run(&stake_config(), &transport).await;
        assert!(transport.calls_to(STAKE).is_empty());
    }

    #[tokio::test]
    async fn test_drift_aborts_run() {
        let transport = scripted_with_auth();
        transport.push_json(PROFILE, 200, json!({"data": {"tg_username": "bee", "balance": 1}}));
        transport.push_json(PROFILE, 200, json!({"data": {"name": "bee"}}));

        let flow = run(&quiet_config(), &transport).await;
        assert_eq!(
            flow,
            Flow::AbortRun {
                endpoint: PROFILE.to_string()
            }
        );
        // nothing after the squad check is attempted
        assert!(transport.calls_to(STAKE).is_empty());
    }

    #[tokio::test]
    async fn test_stop_flag_ends_upgrade_loop_early() {
        let mut config = quiet_config();
        config.features.enable_mining_upgrade = true;
        config.features.enable_stake = true;

        let transport = scripted_with_auth();
        for _ in 0..5 {
            transport.push_json(
                "POST /user/boost/farmer/next_level",
                200,
                json!({"message": "ok", "data": {"level": 1}}),
            );
        }
        let running = Arc::new(AtomicBool::new(true));
        let stopper = Arc::new(StopOnPath {
            inner: transport.clone(),
            running: running.clone(),
            path_prefix: "/user/boost/",
        });

        let flow = run_on(&config, stopper, running).await;

        assert_eq!(flow, Flow::Continue);
        let upgrades: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.path.starts_with("/user/boost/"))
            .collect();
        assert_eq!(upgrades.len(), 1);
        // later steps are skipped too
        assert!(transport.calls_to("POST /user/join_squad/2637").is_empty());
        assert!(transport.calls_to("GET /tasks/user").is_empty());
        assert!(transport.calls_to(STAKE).is_empty());
    }

    #[tokio::test]
    async fn test_stop_flag_ends_spin_loop_early() {
        let mut config = quiet_config();
        config.features.enable_spin = true;

        let transport = scripted_with_auth();
        transport.push_json(SPIN_INFO, 200, json!({"data": {"spin_count": 13}}));
        for _ in 0..3 {
            transport.push_json(SPIN, 200, json!({"data": []}));
        }
        let running = Arc::new(AtomicBool::new(true));
        let stopper = Arc::new(StopOnPath {
            inner: transport.clone(),
            running: running.clone(),
            path_prefix: "/spinner/spin",
        });

        run_on(&config, stopper, running).await;

        // the spin-count read already clears the flag
        assert!(spin_sizes(&transport).is_empty());
        assert_eq!(transport.calls_to("POST /user/streak/claim").len(), 1);
    }

    #[tokio::test]
    async fn test_cleared_flag_skips_every_step_after_auth() {
        let transport = scripted_with_auth();
        let dyn_transport: Arc<dyn Transport> = transport.clone();

        let flow = run_on(&quiet_config(), dyn_transport, Arc::new(AtomicBool::new(false))).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(transport.requests().len(), 1);
    }
}

use crate::{
    accounts::load_accounts,
    client::Connector,
    config::BotConfig,
    error::{BotError, Result},
    guard::EndpointGuard,
    models::Credential,
    utils::{countdown, interruptible_sleep},
    workflow::{AccountWorkflow, Flow},
};
use colored::*;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    Idle,
    Running,
    Stopped,
    Error,
}

/// Tally of one pass over the account list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs every account in file order, cycle after cycle.
pub struct BotRunner {
    config: Arc<BotConfig>,
    connector: Arc<dyn Connector>,
    guard: Arc<EndpointGuard>,
    running: Arc<AtomicBool>,
    status: BotStatus,
    cycle: u64,
    cycle_limit: Option<u64>,
}

impl BotRunner {
    pub fn new(config: BotConfig, connector: Arc<dyn Connector>) -> Self {
        let guard = Arc::new(EndpointGuard::new(config.drift_guard.enabled));
        Self {
            config: Arc::new(config),
            connector,
            guard,
            running: Arc::new(AtomicBool::new(true)),
            status: BotStatus::Idle,
            cycle: 0,
            cycle_limit: None,
        }
    }

    /// Share a flag that, once cleared, stops the runner at the next pause.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Stop after this many cycle attempts instead of running forever.
    pub fn with_cycle_limit(mut self, limit: u64) -> Self {
        self.cycle_limit = Some(limit);
        self
    }

    pub fn status(&self) -> BotStatus {
        self.status
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycle
    }

    pub fn guard(&self) -> &EndpointGuard {
        &self.guard
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run cycles until interrupted or a run-ending error occurs.
    ///
    /// Account-source problems and endpoint drift end the run with an error;
    /// anything else that breaks a cycle is retried after a backoff pause.
    pub async fn run(&mut self) -> Result<()> {
        self.status = BotStatus::Running;
        let timing = self.config.timing.clone();

        loop {
            if !self.is_running() || self.cycle_limit.is_some_and(|limit| self.cycle >= limit) {
                break;
            }

            self.cycle += 1;
            info!("{}", format!("Starting Cycle #{}", self.cycle).cyan().bold());

            match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        "{}",
                        format!(
                            "Cycle #{} completed ({} done, {} skipped, {} failed). Signatures tracked: {}",
                            self.cycle,
                            report.completed,
                            report.skipped,
                            report.failed,
                            self.guard.len()
                        )
                        .green()
                    );

                    if self.cycle_limit.is_some_and(|limit| self.cycle >= limit) {
                        break;
                    }
                    info!("Waiting {} seconds before next cycle...", timing.cycle_delay_secs);
                    if !countdown(timing.cycle_delay_secs, &self.running).await {
                        break;
                    }
                }
                Err(e) if e.is_run_fatal() || matches!(e, BotError::Accounts(_)) => {
                    error!("{}", format!("{}", e).red().bold());
                    self.status = BotStatus::Error;
                    return Err(e);
                }
                Err(e) => {
                    error!("{}", format!("Error: {}", e).red());
                    warn!("Waiting {} seconds before retry...", timing.retry_backoff_secs);
                    if !interruptible_sleep(timing.retry_backoff_secs, &self.running).await {
                        break;
                    }
                }
            }
        }

        info!("Stopping bot after {} cycle(s)", self.cycle);
        self.status = BotStatus::Stopped;
        Ok(())
    }

    /// One pass over the account list.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let accounts = load_accounts(&self.config.accounts_path)?;
        info!("Found {} accounts", accounts.len());

        let mut report = CycleReport::default();
        for (i, credential) in accounts.iter().enumerate() {
            if !self.is_running() {
                break;
            }

            info!("{}", format!("Processing account {}/{}", i + 1, accounts.len()).cyan());
            match self.process_account(credential).await {
                Ok(Flow::Continue) => report.completed += 1,
                Ok(Flow::AbortAccount) => report.skipped += 1,
                Ok(Flow::AbortRun { endpoint }) => {
                    return Err(BotError::EndpointDrift { endpoint });
                }
                Err(e) => {
                    error!("{}", format!("Account {} failed: {}", i + 1, e).red());
                    report.failed += 1;
                }
            }

            if i + 1 < accounts.len() {
                info!(
                    "{}",
                    format!("Waiting {} seconds before next account...", self.config.timing.account_delay_secs)
                        .yellow()
                );
                interruptible_sleep(self.config.timing.account_delay_secs, &self.running).await;
            }
        }

        Ok(report)
    }

    async fn process_account(&self, credential: &Credential) -> Result<Flow> {
        let transport = self.connector.connect()?;
        let workflow = AccountWorkflow::new(&self.config, transport, Arc::clone(&self.guard))
            .with_running_flag(Arc::clone(&self.running));
        Ok(workflow.run(credential).await)
    }
}

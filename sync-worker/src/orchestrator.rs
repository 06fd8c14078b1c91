//! Runs one sync pass over every connected account.

use crate::backoff::Backoff;
use crate::client::CrmClient;
use crate::queue::ActionQueue;
use crate::refresh::OAuthApp;
use crate::session::AccountSession;
use crate::synchronizers::{self, CompaniesSync, ContactsSync, MeetingsSync, Synchronizer};
use anyhow::{Context, Result};
use hubsync::config::{PaginationConfig, SyncConfig};
use hubsync::sink::ActionSink;
use hubsync::{Account, AccountStore, Resource};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Engine knobs taken from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub backoff: Backoff,
    pub pagination: PaginationConfig,
    pub flush_threshold: usize,
    pub dry_run: bool,
}

impl EngineSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            backoff: Backoff::from_config(&config.backoff),
            pagination: config.pagination.clone(),
            flush_threshold: config.queue.flush_threshold,
            dry_run: config.dry_run,
        }
    }
}

/// Isolated unit of work within an account run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Refresh,
    Sync(Resource),
    Drain,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Refresh => f.write_str("refresh"),
            Stage::Sync(resource) => f.write_str(resource.as_str()),
            Stage::Drain => f.write_str("drain"),
            Stage::Persist => f.write_str("persist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Failed(String),
    Skipped,
}

/// Stage outcomes for one account.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub domain_id: String,
    pub hub_id: String,
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl AccountReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.stages.push((stage, outcome));
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    pub fn failed_stages(&self) -> usize {
        self.accounts
            .iter()
            .flat_map(|a| a.stages.iter())
            .filter(|(_, outcome)| matches!(outcome, StageOutcome::Failed(_)))
            .count()
    }
}

/// Sequentially syncs every account: refresh, Companies, Contacts, Meetings,
/// drain, persist. A failing stage is logged and recorded; the remaining
/// stages and accounts still run.
pub struct Orchestrator {
    store: Arc<dyn AccountStore>,
    client: Arc<dyn CrmClient>,
    sink: Arc<dyn ActionSink>,
    app: Arc<OAuthApp>,
    settings: EngineSettings,
    synchronizers: Vec<Box<dyn Synchronizer>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AccountStore>,
        client: Arc<dyn CrmClient>,
        sink: Arc<dyn ActionSink>,
        app: OAuthApp,
        config: &SyncConfig,
    ) -> Self {
        let properties = &config.properties;
        let synchronizers: Vec<Box<dyn Synchronizer>> = vec![
            Box::new(CompaniesSync::new(properties.companies.clone())),
            Box::new(ContactsSync::new(properties.contacts.clone())),
            Box::new(MeetingsSync::new(properties.meetings.clone())),
        ];

        Self {
            store,
            client,
            sink,
            app: Arc::new(app),
            settings: EngineSettings::from_config(config),
            synchronizers,
        }
    }

    /// Only a failure to list accounts aborts the run.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::now_v7();
        info!(run_id = %run_id, "Start pulling data from HubSpot");

        let accounts = self
            .store
            .find_accounts()
            .context("Failed to list accounts")?;

        let mut summary = RunSummary {
            run_id,
            accounts: Vec::with_capacity(accounts.len()),
        };
        for account in accounts {
            summary.accounts.push(self.sync_account(account).await);
        }

        info!(
            run_id = %run_id,
            accounts = summary.accounts.len(),
            failed_stages = summary.failed_stages(),
            "Finished pulling data from HubSpot"
        );
        Ok(summary)
    }

    async fn sync_account(&self, account: Account) -> AccountReport {
        let mut report = AccountReport {
            domain_id: account.domain_id.clone(),
            hub_id: account.hub_id.clone(),
            stages: Vec::new(),
        };
        info!(domain_id = %report.domain_id, hub_id = %report.hub_id, "Start processing account");

        let mut session = AccountSession::new(
            account,
            Arc::clone(&self.client),
            Arc::clone(&self.app),
            self.settings.backoff,
        );

        let refreshed = session.refresh_credentials().await;
        report.record(Stage::Refresh, self.outcome(&report, Stage::Refresh, refreshed));

        let mut queue = ActionQueue::new(Arc::clone(&self.sink), self.settings.flush_threshold);
        for sync in &self.synchronizers {
            let stage = Stage::Sync(sync.resource());
            let result = synchronizers::run(
                sync.as_ref(),
                &mut session,
                &mut queue,
                &self.settings.pagination,
            )
            .await
            .map(|_| ());
            report.record(stage, self.outcome(&report, stage, result));
        }

        let drained = queue.drain().await;
        report.record(Stage::Drain, self.outcome(&report, Stage::Drain, drained));

        let persisted = if self.settings.dry_run {
            info!(hub_id = %report.hub_id, "Dry run, account state not persisted");
            StageOutcome::Skipped
        } else {
            let result = self.store.persist(&session.into_account());
            self.outcome(&report, Stage::Persist, result)
        };
        report.record(Stage::Persist, persisted);

        info!(domain_id = %report.domain_id, hub_id = %report.hub_id, "Finish processing account");
        report
    }

    fn outcome<E: fmt::Display>(
        &self,
        report: &AccountReport,
        stage: Stage,
        result: Result<(), E>,
    ) -> StageOutcome {
        match result {
            Ok(()) => StageOutcome::Succeeded,
            Err(e) => {
                error!(
                    domain_id = %report.domain_id,
                    hub_id = %report.hub_id,
                    operation = %stage,
                    error = %e,
                    "Stage failed"
                );
                StageOutcome::Failed(e.to_string())
            }
        }
    }
}

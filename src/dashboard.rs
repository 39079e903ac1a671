use crate::config::AppConfig;
use crate::db::{connect_with_fallback, BackendKind, StorageHandle};
use crate::errors::AppResult;
use crate::metrics;
use crate::models::{
    ConversationFilter, ConversationMetrics, ConversationRecord, CustomerSummary, DailyRevenue, InteractionRecord,
    Notice, OrderFilter, OrderMetrics, OrderRecord, OverviewMetrics, StatusCount, StatusRevenue,
};
use crate::pipeline::{CrewDefinition, Pipeline, PipelineRun, RunLog, StageStatus, UnconfiguredHandler};
use crate::settings::{self, CredentialGroup, NOT_CONFIGURED};
use crate::sources;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewView {
    pub metrics: OverviewMetrics,
    pub daily_revenue: Vec<DailyRevenue>,
    pub conversation_statuses: Vec<StatusCount>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrdersView {
    pub metrics: OrderMetrics,
    pub revenue_by_status: Vec<StatusRevenue>,
    pub orders: Vec<OrderRecord>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomersView {
    pub customers: Vec<CustomerSummary>,
    pub top_by_spent: Vec<CustomerSummary>,
    pub top_by_order_count: Vec<CustomerSummary>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationsView {
    pub metrics: ConversationMetrics,
    pub statuses: Vec<StatusCount>,
    pub conversations: Vec<ConversationRecord>,
    pub interactions: Vec<InteractionRecord>,
    pub interaction_channels: Vec<StatusCount>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsRow {
    pub label: &'static str,
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsGroupView {
    pub group: CredentialGroup,
    pub status: String,
    pub rows: Vec<SettingsRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub groups: Vec<SettingsGroupView>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewView {
    pub run: PipelineRun,
    pub notices: Vec<Notice>,
}

/// One invocation's view of the shop: chosen storage, resolved settings and
/// the notices raised while setting them up.
pub struct DashboardCore {
    config: AppConfig,
    storage: StorageHandle,
    startup_notices: Vec<Notice>,
}

impl DashboardCore {
    pub fn new(config: AppConfig) -> Self {
        let storage = connect_with_fallback(
            config.settings.get("REDIS_URL"),
            config.settings.get("REDIS_PASSWORD"),
            config.redis_timeout,
        );
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: AppConfig, storage: StorageHandle) -> Self {
        let mut startup_notices: Vec<Notice> = storage
            .notices
            .iter()
            .map(|message| match storage.kind {
                BackendKind::Redis => Notice::info(message.clone()),
                BackendKind::Memory => Notice::warning(message.clone()),
            })
            .collect();

        if storage.kind == BackendKind::Memory {
            match sources::seed_demo_interactions(storage.store.as_ref()) {
                Ok(0) => {}
                Ok(_) => startup_notices.push(Notice::info("Showing demo CRM interactions")),
                Err(error) => {
                    tracing::warn!(error = %error, "failed to seed demo interactions");
                }
            }
        }

        Self {
            config,
            storage,
            startup_notices,
        }
    }

    fn interactions(&self, notices: &mut Vec<Notice>) -> Vec<InteractionRecord> {
        match sources::load_interactions(self.storage.store.as_ref()) {
            Ok(load) => {
                if !load.skipped.is_empty() {
                    notices.push(Notice::warning(format!(
                        "Skipped {} unreadable CRM interaction record(s)",
                        load.skipped.len()
                    )));
                }
                if load.records.is_empty() {
                    notices.push(Notice::info("No CRM interactions recorded yet"));
                }
                load.records
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to list interactions");
                let message = if error.is_connectivity() {
                    "Lost the connection to Redis while loading CRM interactions".to_string()
                } else {
                    format!("Could not load CRM interactions: {}", error)
                };
                notices.push(Notice::warning(message));
                Vec::new()
            }
        }
    }

    pub fn overview(&self) -> OverviewView {
        let mut notices = self.startup_notices.clone();
        let orders = sources::demo_orders();
        let conversations = sources::demo_conversations();
        let interactions = self.interactions(&mut notices);

        OverviewView {
            metrics: metrics::overview(&orders, &conversations, &interactions),
            daily_revenue: metrics::daily_revenue(&orders),
            conversation_statuses: metrics::conversation_status_counts(&conversations),
            notices,
        }
    }

    pub fn orders(&self, filter: &OrderFilter) -> OrdersView {
        let mut notices = self.startup_notices.clone();
        let orders = metrics::filter_orders(&sources::demo_orders(), filter);
        if orders.is_empty() {
            notices.push(Notice::info("No orders match the selected filters"));
        }

        OrdersView {
            metrics: metrics::order_metrics(&orders),
            revenue_by_status: metrics::revenue_by_status(&orders),
            orders,
            notices,
        }
    }

    pub fn customers(&self) -> CustomersView {
        let mut notices = self.startup_notices.clone();
        let customers = metrics::customer_summaries(&sources::demo_orders(), &sources::demo_conversations());
        if customers.is_empty() {
            notices.push(Notice::info("No customers yet"));
        }

        CustomersView {
            top_by_spent: metrics::top_by_spent(&customers, metrics::TOP_CUSTOMERS),
            top_by_order_count: metrics::top_by_order_count(&customers, metrics::TOP_CUSTOMERS),
            customers,
            notices,
        }
    }

    pub fn conversations(&self, filter: &ConversationFilter) -> ConversationsView {
        let mut notices = self.startup_notices.clone();
        let conversations = metrics::filter_conversations(&sources::demo_conversations(), filter);
        if conversations.is_empty() {
            notices.push(Notice::info("No conversations match the selected filters"));
        }
        let interactions = self.interactions(&mut notices);

        ConversationsView {
            metrics: metrics::conversation_metrics(&conversations),
            statuses: metrics::conversation_status_counts(&conversations),
            interaction_channels: metrics::interaction_channel_counts(&interactions),
            conversations,
            interactions,
            notices,
        }
    }

    fn group_status(&self, group: CredentialGroup) -> String {
        match group {
            CredentialGroup::Redis => self.storage.kind.label().to_string(),
            _ if self.config.settings.is_configured(group) => "Configured".to_string(),
            _ => NOT_CONFIGURED.to_string(),
        }
    }

    pub fn settings_view(&self) -> SettingsView {
        let groups = CredentialGroup::ALL
            .into_iter()
            .map(|group| SettingsGroupView {
                group,
                status: self.group_status(group),
                rows: self
                    .config
                    .settings
                    .masked_rows(group)
                    .into_iter()
                    .map(|(label, key, value)| SettingsRow { label, key, value })
                    .collect(),
            })
            .collect();

        SettingsView {
            groups,
            notices: self.startup_notices.clone(),
        }
    }

    /// Writes one settings form. Fields not supplied keep their current value.
    pub fn save_settings(&mut self, group: CredentialGroup, assignments: &[String]) -> AppResult<SettingsView> {
        let supplied = settings::parse_assignments(assignments)?;
        let values = settings::form_values(group, &supplied, &self.config.settings)?;
        settings::save_group(&self.config.env_file, group, &values)?;
        self.config.reload_settings()?;

        let mut view = self.settings_view();
        view.notices.push(Notice::info(format!(
            "Saved {} settings to {}",
            group.title(),
            self.config.env_file.to_string_lossy()
        )));
        if group == CredentialGroup::Redis {
            view.notices
                .push(Notice::info("The new Redis connection is used from the next command"));
        }
        Ok(view)
    }

    /// Kickoff inputs: settings that fill crew placeholders, overridden by
    /// explicit `KEY=VALUE` inputs.
    fn crew_inputs(&self, definition: &CrewDefinition, explicit: &[String]) -> AppResult<BTreeMap<String, String>> {
        let mut inputs: BTreeMap<String, String> = definition
            .placeholders()
            .into_iter()
            .filter_map(|key| {
                let value = self.config.settings.get(&key)?.to_string();
                Some((key, value))
            })
            .collect();
        inputs.extend(settings::parse_assignments(explicit)?);
        Ok(inputs)
    }

    pub fn crew_run(&self, explicit_inputs: &[String], definition_path: Option<&Path>) -> AppResult<CrewView> {
        let definition = CrewDefinition::load(definition_path)?;
        let inputs = self.crew_inputs(&definition, explicit_inputs)?;
        let pipeline = Pipeline::new(definition, UnconfiguredHandler)?;
        let run = pipeline.kickoff(inputs)?;
        self.record_run(run)
    }

    pub fn crew_replay(&self, task: &str, definition_path: Option<&Path>) -> AppResult<CrewView> {
        let log = RunLog::new(&self.config.data_dir);
        let previous = log.load_last()?;
        let pipeline = Pipeline::new(CrewDefinition::load(definition_path)?, UnconfiguredHandler)?;
        let run = pipeline.replay(&previous, task)?;
        self.record_run(run)
    }

    fn record_run(&self, run: PipelineRun) -> AppResult<CrewView> {
        RunLog::new(&self.config.data_dir).save(&run)?;

        let mut notices = Vec::new();
        if run.stages.iter().all(|stage| stage.status == StageStatus::Skipped) {
            notices.push(Notice::info("No agent tools are configured; every stage was skipped"));
        }
        if !run.succeeded() {
            notices.push(Notice::error("The crew run stopped at a failed stage"));
        }
        Ok(CrewView { run, notices })
    }
}

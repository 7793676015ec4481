//! Harvest orchestration.
//!
//! A run has two phases:
//!
//! 1. **Members**: one randomly chosen token pages through `users.list`;
//!    members are redacted, grouped by team and flushed to disk per team.
//! 2. **Conversations**: every token resolves its team with `auth.test`
//!    and pages through its conversations. Each channel not yet recorded for
//!    that team gets its metadata written immediately, then its whole history
//!    paged, redacted and written in one file before the next channel starts,
//!    so at most one channel's history is held in memory.
//!
//! Channels visible to several tokens are harvested once. Any API failure
//! aborts the run; files already written stay on disk.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use rand::seq::IteratorRandom;
use serde_json::Value;
use tracing::{debug, info};

use snapshotter_slack::{
    AccessToken, DEFAULT_PAGE_DELAY, Record, SlackClient, TokenSet, TokenStore, paginate,
};

use crate::error::{HarvestError, Result};
use crate::redact::sanitize;
use crate::snapshot::SnapshotWriter;

/// Conversation kinds requested from `users.conversations`.
pub const CONVERSATION_TYPES: &str = "public_channel,private_channel,im,mpim";

/// Harvester configuration.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root of the snapshot tree.
    pub output_dir: PathBuf,
    /// Delay between consecutive page requests.
    pub page_delay: Duration,
    /// Value of the `types` parameter for `users.conversations`.
    pub conversation_types: String,
}

impl HarvestConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            page_delay: DEFAULT_PAGE_DELAY,
            conversation_types: CONVERSATION_TYPES.to_string(),
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }
}

/// Counts of what a run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub teams: usize,
    pub members: usize,
    pub channels: usize,
    /// Channels skipped because another token already harvested them.
    pub skipped_channels: usize,
    pub messages: usize,
}

/// Builds a redacted snapshot from a set of user tokens.
#[derive(Debug, Clone)]
pub struct Harvester {
    client: SlackClient,
    config: HarvestConfig,
    writer: SnapshotWriter,
}

impl Harvester {
    pub fn new(client: SlackClient, config: HarvestConfig) -> Self {
        let writer = SnapshotWriter::new(config.output_dir.clone());
        Self {
            client,
            config,
            writer,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Load tokens from `store` and run.
    ///
    /// A missing or empty store is an error; nothing is fetched.
    pub async fn run_from_store(&self, store: &TokenStore) -> Result<HarvestReport> {
        let tokens = store.load()?;
        self.run(&tokens).await
    }

    /// Harvest members and conversations with `tokens`.
    pub async fn run(&self, tokens: &TokenSet) -> Result<HarvestReport> {
        let member_token = tokens
            .iter()
            .choose(&mut rand::rng())
            .ok_or(HarvestError::NoTokens)?;

        info!(
            tokens = tokens.len(),
            output = %self.config.output_dir.display(),
            "Starting harvest"
        );

        let mut report = HarvestReport::default();
        let mut teams: BTreeSet<String> = self.harvest_members(&member_token, &mut report).await?;

        let mut recorded: HashMap<String, HashSet<String>> = HashMap::new();
        for token in tokens.iter() {
            let team_id = self
                .harvest_conversations(&token, &mut recorded, &mut report)
                .await?;
            teams.insert(team_id);
        }

        report.teams = teams.len();
        info!(
            teams = report.teams,
            members = report.members,
            channels = report.channels,
            messages = report.messages,
            "Harvest complete"
        );
        Ok(report)
    }

    /// Page through `users.list`, then write one members file per team.
    async fn harvest_members(
        &self,
        token: &AccessToken,
        report: &mut HarvestReport,
    ) -> Result<BTreeSet<String>> {
        let mut by_team: BTreeMap<String, Record> = BTreeMap::new();

        let mut pages = paginate(self.client.users_list(&token.secret), self.config.page_delay);
        while let Some(page) = pages.next().await {
            for member in page?.items {
                let member = into_record(member, "member")?;
                let team_id = string_field(&member, "member", "team_id")?;
                let member_id = string_field(&member, "member", "id")?;
                by_team
                    .entry(team_id)
                    .or_default()
                    .insert(member_id, Value::Object(sanitize(&member)));
            }
        }

        for (team_id, members) in &by_team {
            self.writer.write_members(team_id, members).await?;
            report.members += members.len();
            info!(team = %team_id, members = members.len(), "Members written");
        }

        Ok(by_team.into_keys().collect())
    }

    /// Harvest every conversation visible to `token` that is not yet recorded.
    ///
    /// Returns the token's team ID.
    async fn harvest_conversations(
        &self,
        token: &AccessToken,
        recorded: &mut HashMap<String, HashSet<String>>,
        report: &mut HarvestReport,
    ) -> Result<String> {
        let team_id = self.client.auth_test(&token.secret).await?.team_id;
        let recorded = recorded.entry(team_id.clone()).or_default();
        debug!(owner = %token.owner_id, team = %team_id, "Listing conversations");

        let method = self
            .client
            .users_conversations(&token.secret, &self.config.conversation_types);
        let mut pages = paginate(method, self.config.page_delay);

        while let Some(page) = pages.next().await {
            for channel in page?.items {
                let channel = into_record(channel, "channel")?;
                let channel_id = string_field(&channel, "channel", "id")?;

                if !recorded.insert(channel_id.clone()) {
                    report.skipped_channels += 1;
                    debug!(team = %team_id, channel = %channel_id, "Channel already harvested");
                    continue;
                }

                self.writer
                    .write_channel(&team_id, &channel_id, &sanitize(&channel))
                    .await?;

                let messages = self.harvest_history(token, &team_id, &channel_id).await?;
                report.channels += 1;
                report.messages += messages;
                info!(team = %team_id, channel = %channel_id, messages, "Channel written");
            }
        }

        Ok(team_id)
    }

    /// Page through one channel's history and write it. Returns the message count.
    async fn harvest_history(
        &self,
        token: &AccessToken,
        team_id: &str,
        channel_id: &str,
    ) -> Result<usize> {
        let mut messages = Vec::new();

        let method = self.client.conversations_history(&token.secret, channel_id);
        let mut pages = paginate(method, self.config.page_delay);
        while let Some(page) = pages.next().await {
            for message in page?.items {
                let message = into_record(message, "message")?;
                messages.push(Value::Object(sanitize(&message)));
            }
        }

        self.writer
            .write_messages(team_id, channel_id, &messages)
            .await?;
        Ok(messages.len())
    }
}

fn into_record(value: Value, kind: &'static str) -> Result<Record> {
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(HarvestError::NotAnObject { kind }),
    }
}

fn string_field(record: &Record, kind: &'static str, field: &'static str) -> Result<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(HarvestError::MissingField { kind, field })
}

// Antinuke service - the incident pipeline and the configuration API.
//
// Pipeline per (event, module):
//   classify -> rule lookup -> bot perms -> attribution -> eligibility
//   -> compensate (per event) -> threshold gate -> debounce gate
//   -> punish -> log
//
// Each stage can short-circuit; a short-circuit before compensation leaves
// no side effects at all. NO Discord dependencies here - collaborators come
// in through the port traits below.

use super::antinuke_models::{
    AbandonReason, Action, ActionError, ActorRef, AuditActionKind, AuditEntry, ConfigError,
    EventContext, GuildAntinukeConfig, GuildEvent, IncidentReport, ModuleKind, ModuleRule,
    Outcome, PunishmentKind,
};
use super::classifier::{self, ActorResolution};
use super::debounce::DebounceGate;
use super::decider;
use super::guard::{HierarchyGuard, Ineligibility};
use super::threshold::ThresholdCounter;
use async_trait::async_trait;

/// Default minimum account age when `new accounts` is turned on through the
/// bulk enable path without an explicit age.
const DEFAULT_NEW_ACCOUNT_AGE_SECS: u32 = 86_400;

// ============================================================================
// PORTS
// ============================================================================

/// Persistence for guild configs and module rules. `delete_guild_config`
/// removes the guild row and every module rule with it.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_guild_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<GuildAntinukeConfig>, ConfigError>;

    async fn save_guild_config(&self, config: &GuildAntinukeConfig) -> Result<(), ConfigError>;

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), ConfigError>;

    async fn get_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<Option<ModuleRule>, ConfigError>;

    async fn save_module_rule(&self, guild_id: u64, rule: &ModuleRule)
        -> Result<(), ConfigError>;

    /// Returns whether a rule existed.
    async fn delete_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<bool, ConfigError>;

    async fn list_module_rules(&self, guild_id: u64) -> Result<Vec<ModuleRule>, ConfigError>;
}

/// Single-entry audit log lookup - the attribution mechanism. Best-effort:
/// the most recent matching entry, nothing more.
#[async_trait]
pub trait AuditLogReader: Send + Sync {
    async fn latest_entry(
        &self,
        guild_id: u64,
        kind: AuditActionKind,
    ) -> Result<Option<AuditEntry>, ActionError>;
}

/// The action surface the engine calls into. Fire-and-forget: failures are
/// reported but never retried.
#[async_trait]
pub trait GuildActions: Send + Sync {
    async fn apply(&self, guild_id: u64, action: &Action) -> Result<(), ActionError>;
}

/// Best-effort audit embed posting.
#[async_trait]
pub trait ModerationLog: Send + Sync {
    async fn post(
        &self,
        guild_id: u64,
        channel_id: u64,
        report: &IncidentReport,
    ) -> Result<(), ActionError>;
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct AntinukeService<C, A, G, L>
where
    C: ConfigStore,
    A: AuditLogReader,
    G: GuildActions,
    L: ModerationLog,
{
    config: C,
    audit: A,
    actions: G,
    log: L,
    guard: HierarchyGuard,
    thresholds: ThresholdCounter,
    debounce: DebounceGate,
}

impl<C, A, G, L> AntinukeService<C, A, G, L>
where
    C: ConfigStore,
    A: AuditLogReader,
    G: GuildActions,
    L: ModerationLog,
{
    pub fn new(config: C, audit: A, actions: G, log: L) -> Self {
        Self {
            config,
            audit,
            actions,
            log,
            guard: HierarchyGuard::new([]),
            thresholds: ThresholdCounter::new(),
            debounce: DebounceGate::new(),
        }
    }

    /// Users no guild may ever punish (the bot operator's accounts).
    pub fn with_global_owners(mut self, owners: impl IntoIterator<Item = u64>) -> Self {
        self.guard = HierarchyGuard::new(owners);
        self
    }

    /// Swap in gates with custom windows, for tests.
    pub fn with_gates(mut self, thresholds: ThresholdCounter, debounce: DebounceGate) -> Self {
        self.thresholds = thresholds;
        self.debounce = debounce;
        self
    }

    // ------------------------------------------------------------------
    // EVENT PIPELINE
    // ------------------------------------------------------------------

    /// Run the full pipeline for one gateway event. A member join fans out
    /// to every join-screening module, so this returns one outcome per
    /// candidate module.
    pub async fn handle_event(
        &self,
        ctx: &EventContext,
        event: &GuildEvent,
    ) -> Result<Vec<Outcome>, ConfigError> {
        let guild_id = ctx.guild.guild_id;

        let config = match self.config.get_guild_config(guild_id).await? {
            Some(config) if config.configured => config,
            _ => return Ok(vec![Outcome::Abandoned(AbandonReason::NotConfigured)]),
        };

        let mut outcomes = Vec::new();
        for module in classifier::candidate_modules(event) {
            outcomes.push(self.run_module(ctx, event, &config, *module).await?);
        }
        Ok(outcomes)
    }

    async fn run_module(
        &self,
        ctx: &EventContext,
        event: &GuildEvent,
        config: &GuildAntinukeConfig,
        module: ModuleKind,
    ) -> Result<Outcome, ConfigError> {
        let guild_id = ctx.guild.guild_id;

        let Some(rule) = self.config.get_module_rule(guild_id, module).await? else {
            return Ok(Outcome::Abandoned(AbandonReason::ModuleDisabled));
        };

        let Some(classification) = classifier::classify(ctx, event, &rule) else {
            return Ok(Outcome::Abandoned(AbandonReason::NotActionable));
        };

        if !self.guard.bot_operational(&ctx.guild) {
            return Ok(Outcome::Abandoned(AbandonReason::MissingBotPermissions));
        }

        // Join-screened modules exempt a whitelisted *target* too: a
        // whitelisted bot or young account may join unharmed.
        if module.join_screened() {
            if let Some(target) = classification.target_id {
                if config.whitelisted.contains(&target) {
                    return Ok(Outcome::Abandoned(AbandonReason::Whitelisted));
                }
            }
        }

        let actor = match classification.actor {
            ActorResolution::Known(actor) => Some(actor),
            ActorResolution::Unattributable => None,
            ActorResolution::FromAuditLog(kind) => {
                match self.resolve_actor(guild_id, kind, &classification.target_id, module).await {
                    Some(actor) => Some(actor),
                    None => return Ok(Outcome::Abandoned(AbandonReason::Unattributed)),
                }
            }
        };

        // Eligibility gates damage reversal and punishment together.
        if let Some(actor) = &actor {
            if let Err(why) = self.guard.eligible(actor, &ctx.guild, config) {
                let reason = match why {
                    Ineligibility::Exempt => AbandonReason::Whitelisted,
                    Ineligibility::AboveHierarchy => AbandonReason::HierarchyProtected,
                };
                return Ok(Outcome::Abandoned(reason));
            }
        }

        // Damage reversal runs once per qualifying event; only the
        // punishment cycle sits behind the threshold and debounce gates.
        let mut attempted = self.run_actions(guild_id, &classification.compensating).await;
        let compensated = attempted.len();

        if let Some(actor) = &actor {
            let threshold = if module.counts_events() {
                rule.threshold
            } else {
                None
            };
            if !self
                .thresholds
                .record_and_check(guild_id, module, actor.user_id, threshold)
            {
                return Ok(gated(module, compensated, AbandonReason::BelowThreshold));
            }
        }

        if module.collapses_duplicates() && !self.debounce.try_claim(guild_id, module) {
            return Ok(gated(module, compensated, AbandonReason::DebounceClaimed));
        }

        if let Some(actor) = &actor {
            let punitive = decider::decide(&rule, actor.user_id, &classification.reason);
            attempted.extend(
                self.run_actions(guild_id, std::slice::from_ref(&punitive))
                    .await,
            );
        }

        let report = IncidentReport {
            module,
            actor_id: actor.map(|a| a.user_id),
            reason: classification.reason,
            detected_at: ctx.observed_at,
            actions: attempted,
        };

        let logged = match config.log_channel {
            Some(channel_id) => match self.log.post(guild_id, channel_id, &report).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(guild_id, error = %e, "failed to post antinuke log");
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            guild_id,
            module = %module,
            actor = ?report.actor_id,
            reason = %report.reason,
            "antinuke incident executed"
        );

        Ok(Outcome::Executed { report, logged })
    }

    async fn resolve_actor(
        &self,
        guild_id: u64,
        kind: AuditActionKind,
        target_id: &Option<u64>,
        module: ModuleKind,
    ) -> Option<ActorRef> {
        let entry = match self.audit.latest_entry(guild_id, kind).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(guild_id, error = %e, "audit log lookup failed");
                return None;
            }
        };

        // A member leaving on their own also fires a removal event; only a
        // kick entry naming that member proves a kick happened.
        if module == ModuleKind::Kick && entry.target_id != *target_id {
            return None;
        }

        Some(entry.actor)
    }

    async fn run_actions(&self, guild_id: u64, actions: &[Action]) -> Vec<String> {
        let mut attempted = Vec::with_capacity(actions.len());
        for action in actions {
            if let Err(e) = self.actions.apply(guild_id, action).await {
                // Partial success is expected here: a ban can land while a
                // role revert races the member leaving.
                tracing::warn!(
                    guild_id,
                    error = %e,
                    "antinuke action failed: {}",
                    action.describe()
                );
            }
            attempted.push(action.describe());
        }
        attempted
    }

    // ------------------------------------------------------------------
    // CONFIGURATION API (used by the command layer)
    // ------------------------------------------------------------------

    pub async fn guild_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<GuildAntinukeConfig>, ConfigError> {
        self.config.get_guild_config(guild_id).await
    }

    pub async fn module_rules(&self, guild_id: u64) -> Result<Vec<ModuleRule>, ConfigError> {
        self.require_config(guild_id).await?;
        self.config.list_module_rules(guild_id).await
    }

    /// Enable the antinuke for a guild. Only the guild owner (or a
    /// previously recorded antinuke owner) may do this.
    pub async fn setup(
        &self,
        guild_id: u64,
        invoker_id: u64,
        guild_owner_id: u64,
    ) -> Result<(), ConfigError> {
        match self.config.get_guild_config(guild_id).await? {
            Some(existing) if existing.configured => Err(ConfigError::AlreadyConfigured),
            Some(mut existing) => {
                if invoker_id != existing.owner_id {
                    return Err(ConfigError::NotOwner);
                }
                existing.configured = true;
                self.config.save_guild_config(&existing).await
            }
            None => {
                if invoker_id != guild_owner_id {
                    return Err(ConfigError::NotOwner);
                }
                let config = GuildAntinukeConfig::new(guild_id, guild_owner_id);
                self.config.save_guild_config(&config).await
            }
        }
    }

    /// Drop the guild's config and every module rule.
    pub async fn reset(&self, guild_id: u64, invoker_id: u64) -> Result<(), ConfigError> {
        let config = self.require_config(guild_id).await?;
        if invoker_id != config.owner_id {
            return Err(ConfigError::NotOwner);
        }
        self.config.delete_guild_config(guild_id).await
    }

    pub async fn set_log_channel(
        &self,
        guild_id: u64,
        invoker_id: u64,
        channel_id: Option<u64>,
    ) -> Result<(), ConfigError> {
        let mut config = self.require_admin(guild_id, invoker_id).await?;
        config.log_channel = channel_id;
        self.config.save_guild_config(&config).await
    }

    /// Enable or reconfigure one module. Strip is rejected for modules that
    /// act on joining members (Scenario: the rule never reaches storage).
    pub async fn enable_module(
        &self,
        guild_id: u64,
        invoker_id: u64,
        module: ModuleKind,
        punishment: PunishmentKind,
        threshold: Option<u32>,
    ) -> Result<(), ConfigError> {
        self.require_admin(guild_id, invoker_id).await?;

        if punishment == PunishmentKind::Strip && !module.allows_strip() {
            return Err(ConfigError::StripNotAllowed(module));
        }

        let rule = ModuleRule {
            module,
            punishment,
            threshold,
        };
        self.config.save_module_rule(guild_id, &rule).await
    }

    pub async fn disable_module(
        &self,
        guild_id: u64,
        invoker_id: u64,
        module: ModuleKind,
    ) -> Result<(), ConfigError> {
        self.require_admin(guild_id, invoker_id).await?;
        if !self.config.delete_module_rule(guild_id, module).await? {
            return Err(ConfigError::ModuleNotEnabled(module));
        }
        Ok(())
    }

    /// Turn on every module at once. Count-threshold modules share the given
    /// threshold; `new accounts` gets a one-day default age.
    pub async fn enable_all(
        &self,
        guild_id: u64,
        invoker_id: u64,
        punishment: PunishmentKind,
        threshold: Option<u32>,
    ) -> Result<(), ConfigError> {
        self.require_admin(guild_id, invoker_id).await?;

        if punishment == PunishmentKind::Strip {
            return Err(ConfigError::StripNotAllowed(ModuleKind::Spammer));
        }

        for module in ModuleKind::ALL {
            let threshold = if module.counts_events() {
                threshold
            } else if module == ModuleKind::NewAccounts {
                Some(DEFAULT_NEW_ACCOUNT_AGE_SECS)
            } else {
                None
            };
            let rule = ModuleRule {
                module,
                punishment,
                threshold,
            };
            self.config.save_module_rule(guild_id, &rule).await?;
        }
        Ok(())
    }

    /// Returns false if the user was already whitelisted.
    pub async fn add_whitelist(
        &self,
        guild_id: u64,
        invoker_id: u64,
        user_id: u64,
    ) -> Result<bool, ConfigError> {
        let mut config = self.require_admin(guild_id, invoker_id).await?;
        let added = config.whitelisted.insert(user_id);
        if added {
            self.config.save_guild_config(&config).await?;
        }
        Ok(added)
    }

    pub async fn remove_whitelist(
        &self,
        guild_id: u64,
        invoker_id: u64,
        user_id: u64,
    ) -> Result<bool, ConfigError> {
        let mut config = self.require_admin(guild_id, invoker_id).await?;
        let removed = config.whitelisted.remove(&user_id);
        if removed {
            self.config.save_guild_config(&config).await?;
        }
        Ok(removed)
    }

    /// Owner only. Admins may toggle modules but not mint other admins.
    pub async fn add_admin(
        &self,
        guild_id: u64,
        invoker_id: u64,
        user_id: u64,
    ) -> Result<bool, ConfigError> {
        let mut config = self.require_config(guild_id).await?;
        if invoker_id != config.owner_id {
            return Err(ConfigError::NotOwner);
        }
        if user_id == config.owner_id {
            return Ok(false);
        }
        let added = config.admins.insert(user_id);
        if added {
            self.config.save_guild_config(&config).await?;
        }
        Ok(added)
    }

    pub async fn remove_admin(
        &self,
        guild_id: u64,
        invoker_id: u64,
        user_id: u64,
    ) -> Result<bool, ConfigError> {
        let mut config = self.require_config(guild_id).await?;
        if invoker_id != config.owner_id {
            return Err(ConfigError::NotOwner);
        }
        let removed = config.admins.remove(&user_id);
        if removed {
            self.config.save_guild_config(&config).await?;
        }
        Ok(removed)
    }

    /// Follow a guild ownership transfer: if the recorded antinuke owner is
    /// the outgoing guild owner, the config moves to the new owner.
    pub async fn sync_guild_owner(
        &self,
        guild_id: u64,
        old_owner_id: u64,
        new_owner_id: u64,
    ) -> Result<(), ConfigError> {
        if let Some(mut config) = self.config.get_guild_config(guild_id).await? {
            if config.owner_id == old_owner_id {
                config.owner_id = new_owner_id;
                self.config.save_guild_config(&config).await?;
            }
        }
        Ok(())
    }

    async fn require_config(&self, guild_id: u64) -> Result<GuildAntinukeConfig, ConfigError> {
        match self.config.get_guild_config(guild_id).await? {
            Some(config) if config.configured => Ok(config),
            _ => Err(ConfigError::NotConfigured),
        }
    }

    async fn require_admin(
        &self,
        guild_id: u64,
        invoker_id: u64,
    ) -> Result<GuildAntinukeConfig, ConfigError> {
        let config = self.require_config(guild_id).await?;
        if !config.is_admin(invoker_id) {
            return Err(ConfigError::NotAdmin);
        }
        Ok(config)
    }
}

fn gated(module: ModuleKind, compensated: usize, reason: AbandonReason) -> Outcome {
    if compensated == 0 {
        Outcome::Abandoned(reason)
    } else {
        Outcome::Reverted {
            module,
            compensated,
            gated_by: reason,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

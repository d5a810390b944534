// Serenity-backed implementations of the antinuke ports.
//
// These adapters are THIN: they translate core actions into HTTP calls and
// audit log rows into core types. All policy lives in the core service.

use crate::core::antinuke::{
    Action, ActionError, ActorRef, AuditActionKind, AuditEntry, AuditLogReader, ChannelKind,
    GuildActions, IncidentReport, ModerationLog,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ::serenity::model::guild::audit_log;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

fn gateway_err(e: serenity::Error) -> ActionError {
    ActionError::Gateway(e.to_string())
}

fn audit_action(kind: AuditActionKind) -> audit_log::Action {
    use audit_log::{Action as A, ChannelAction, MemberAction, RoleAction};
    match kind {
        AuditActionKind::ChannelCreate => A::Channel(ChannelAction::Create),
        AuditActionKind::ChannelDelete => A::Channel(ChannelAction::Delete),
        AuditActionKind::RoleCreate => A::Role(RoleAction::Create),
        AuditActionKind::RoleDelete => A::Role(RoleAction::Delete),
        AuditActionKind::RoleUpdate => A::Role(RoleAction::Update),
        AuditActionKind::MemberRoleUpdate => A::Member(MemberAction::RoleUpdate),
        AuditActionKind::Kick => A::Member(MemberAction::Kick),
        AuditActionKind::BanAdd => A::Member(MemberAction::BanAdd),
        AuditActionKind::BotAdd => A::Member(MemberAction::BotAdd),
    }
}

fn channel_type(kind: ChannelKind) -> serenity::ChannelType {
    match kind {
        ChannelKind::Text => serenity::ChannelType::Text,
        ChannelKind::Voice => serenity::ChannelType::Voice,
        ChannelKind::Category => serenity::ChannelType::Category,
        ChannelKind::News => serenity::ChannelType::News,
        ChannelKind::Stage => serenity::ChannelType::Stage,
        ChannelKind::Forum => serenity::ChannelType::Forum,
    }
}

/// Resolves a member's top role position from the cache, if we have them.
fn cached_top_role_position(
    cache: &serenity::Cache,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> Option<u16> {
    let guild = cache.guild(guild_id)?;
    let member = guild.members.get(&user_id)?;
    Some(
        member
            .roles
            .iter()
            .filter_map(|role_id| guild.roles.get(role_id))
            .map(|role| role.position)
            .max()
            .unwrap_or(0),
    )
}

// ============================================================================
// AUDIT LOG
// ============================================================================

pub struct SerenityAuditLogReader {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityAuditLogReader {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }
}

#[async_trait]
impl AuditLogReader for SerenityAuditLogReader {
    async fn latest_entry(
        &self,
        guild_id: u64,
        kind: AuditActionKind,
    ) -> Result<Option<AuditEntry>, ActionError> {
        let guild = serenity::GuildId::new(guild_id);
        let logs = guild
            .audit_logs(&self.http, Some(audit_action(kind)), None, None, Some(1))
            .await
            .map_err(gateway_err)?;

        let Some(entry) = logs.entries.into_iter().next() else {
            return Ok(None);
        };

        let created_at = DateTime::<Utc>::from_timestamp(entry.id.created_at().unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);
        let top_role_position = cached_top_role_position(&self.cache, guild, entry.user_id);

        Ok(Some(AuditEntry {
            actor: ActorRef {
                user_id: entry.user_id.get(),
                top_role_position,
            },
            target_id: entry.target_id.map(|id| id.get()),
            created_at,
        }))
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

pub struct SerenityGuildActions {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityGuildActions {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }

    /// Role ids the member keeps after a strip: everything without dangerous
    /// permissions. Managed roles stay regardless, we could not remove them.
    fn roles_after_strip(
        &self,
        guild_id: serenity::GuildId,
        member_roles: &[serenity::RoleId],
    ) -> Vec<serenity::RoleId> {
        let Some(guild) = self.cache.guild(guild_id) else {
            return member_roles.to_vec();
        };
        member_roles
            .iter()
            .filter(|role_id| match guild.roles.get(role_id) {
                Some(role) => {
                    role.managed
                        || !crate::core::antinuke::Permissions(role.permissions.bits())
                            .is_dangerous()
                }
                None => true,
            })
            .copied()
            .collect()
    }
}

#[async_trait]
impl GuildActions for SerenityGuildActions {
    async fn apply(&self, guild_id: u64, action: &Action) -> Result<(), ActionError> {
        let guild = serenity::GuildId::new(guild_id);
        match action {
            Action::Ban { user_id, reason } => {
                guild
                    .ban_with_reason(&self.http, serenity::UserId::new(*user_id), 0, reason)
                    .await
                    .map_err(gateway_err)?;
            }
            Action::Kick { user_id, reason } => {
                guild
                    .kick_with_reason(&self.http, serenity::UserId::new(*user_id), reason)
                    .await
                    .map_err(gateway_err)?;
            }
            Action::StripRoles { user_id, reason } => {
                let user = serenity::UserId::new(*user_id);
                let member = guild.member(&self.http, user).await.map_err(gateway_err)?;
                let keep = self.roles_after_strip(guild, &member.roles);
                guild
                    .edit_member(
                        &self.http,
                        user,
                        serenity::EditMember::new()
                            .roles(keep)
                            .audit_log_reason(reason),
                    )
                    .await
                    .map_err(gateway_err)?;
            }
            Action::SetMemberRoles {
                user_id,
                role_ids,
                reason,
            } => {
                let roles: Vec<serenity::RoleId> =
                    role_ids.iter().map(|id| serenity::RoleId::new(*id)).collect();
                guild
                    .edit_member(
                        &self.http,
                        serenity::UserId::new(*user_id),
                        serenity::EditMember::new()
                            .roles(roles)
                            .audit_log_reason(reason),
                    )
                    .await
                    .map_err(gateway_err)?;
            }
            Action::DeleteChannel { channel_id } => {
                serenity::ChannelId::new(*channel_id)
                    .delete(&self.http)
                    .await
                    .map_err(gateway_err)?;
            }
            Action::RecreateChannel { channel } => {
                let mut builder = serenity::CreateChannel::new(&channel.name)
                    .kind(channel_type(channel.kind))
                    .position(channel.position)
                    .nsfw(channel.nsfw);
                if let Some(parent_id) = channel.parent_id {
                    builder = builder.category(serenity::ChannelId::new(parent_id));
                }
                if let Some(topic) = &channel.topic {
                    builder = builder.topic(topic);
                }
                guild
                    .create_channel(&self.http, builder)
                    .await
                    .map_err(gateway_err)?;
            }
            Action::DeleteRole { role_id } => {
                guild
                    .delete_role(&self.http, serenity::RoleId::new(*role_id))
                    .await
                    .map_err(gateway_err)?;
            }
            Action::RecreateRole { role } => {
                guild
                    .create_role(
                        &self.http,
                        serenity::EditRole::new()
                            .name(&role.name)
                            .permissions(serenity::Permissions::from_bits_truncate(
                                role.permissions.bits(),
                            ))
                            .colour(role.color)
                            .hoist(role.hoist)
                            .mentionable(role.mentionable)
                            .position(role.position),
                    )
                    .await
                    .map_err(gateway_err)?;
            }
            Action::RevertRoleMentionable {
                role_id,
                mentionable,
            } => {
                guild
                    .edit_role(
                        &self.http,
                        serenity::RoleId::new(*role_id),
                        serenity::EditRole::new().mentionable(*mentionable),
                    )
                    .await
                    .map_err(gateway_err)?;
            }
            Action::RevertRolePermissions {
                role_id,
                permissions,
            } => {
                guild
                    .edit_role(
                        &self.http,
                        serenity::RoleId::new(*role_id),
                        serenity::EditRole::new().permissions(
                            serenity::Permissions::from_bits_truncate(permissions.bits()),
                        ),
                    )
                    .await
                    .map_err(gateway_err)?;
            }
            Action::DeleteWebhook { webhook_id } => {
                self.http
                    .delete_webhook(serenity::WebhookId::new(*webhook_id), None)
                    .await
                    .map_err(gateway_err)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// LOG CHANNEL
// ============================================================================

pub struct SerenityModerationLog {
    http: Arc<serenity::Http>,
}

impl SerenityModerationLog {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ModerationLog for SerenityModerationLog {
    async fn post(
        &self,
        _guild_id: u64,
        channel_id: u64,
        report: &IncidentReport,
    ) -> Result<(), ActionError> {
        let actor = match report.actor_id {
            Some(id) => format!("<@{id}>"),
            None => "unknown (webhook)".to_string(),
        };
        let actions = if report.actions.is_empty() {
            "none".to_string()
        } else {
            report
                .actions
                .iter()
                .map(|a| format!("• {a}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let embed = serenity::CreateEmbed::new()
            .title("🛡️ Antinuke triggered")
            .color(0xFF0000)
            .field("Module", report.module.to_string(), true)
            .field("User", actor, true)
            .field("Reason", report.reason.clone(), false)
            .field("Actions taken", actions, false)
            .timestamp(
                serenity::Timestamp::from_unix_timestamp(report.detected_at.timestamp())
                    .unwrap_or_else(|_| serenity::Timestamp::now()),
            );

        serenity::ChannelId::new(channel_id)
            .send_message(&self.http, serenity::CreateMessage::new().embed(embed))
            .await
            .map_err(gateway_err)?;
        Ok(())
    }
}

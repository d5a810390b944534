// Gateway event wiring for the antinuke engine.
//
// Converts serenity events into the core snapshot types. Everything here
// reads from the cache synchronously and drops the cache guards before any
// await point.

use crate::core::antinuke::{
    ChannelKind, ChannelSnapshot, EventContext, GuildEvent, GuildSnapshot, JoinedMember,
    MemberSnapshot, MessageSnapshot, Permissions, RoleMention, RoleSnapshot,
};
use crate::discord::antinuke::commands::{Data, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

/// Feed one gateway event through the engine. Ownership transfers are
/// handled here too since they mutate config rather than trigger incidents.
pub async fn dispatch(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::GuildUpdate {
        old_data_if_available,
        new_data,
    } = event
    {
        if let Some(old) = old_data_if_available {
            if old.owner_id != new_data.owner_id {
                data.antinuke
                    .sync_guild_owner(
                        new_data.id.get(),
                        old.owner_id.get(),
                        new_data.owner_id.get(),
                    )
                    .await
                    .map_err(|e| Error::from(e.to_string()))?;
            }
        }
        return Ok(());
    }

    let Some((guild_id, guild_event)) = convert(ctx, event) else {
        return Ok(());
    };
    let Some(guild) = guild_snapshot(ctx, guild_id) else {
        return Ok(());
    };

    let context = EventContext {
        guild,
        observed_at: Utc::now(),
    };
    data.antinuke
        .handle_event(&context, &guild_event)
        .await
        .map_err(|e| Error::from(e.to_string()))?;
    Ok(())
}

fn convert(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
) -> Option<(serenity::GuildId, GuildEvent)> {
    match event {
        serenity::FullEvent::ChannelCreate { channel } => Some((
            channel.guild_id,
            GuildEvent::ChannelCreated {
                channel: channel_snapshot(channel)?,
            },
        )),
        serenity::FullEvent::ChannelDelete { channel, .. } => Some((
            channel.guild_id,
            GuildEvent::ChannelDeleted {
                channel: channel_snapshot(channel)?,
            },
        )),
        serenity::FullEvent::GuildRoleCreate { new } => Some((
            new.guild_id,
            GuildEvent::RoleCreated {
                role: role_snapshot(new),
            },
        )),
        serenity::FullEvent::GuildRoleDelete {
            guild_id,
            removed_role_data_if_available,
            ..
        } => {
            let role = removed_role_data_if_available.as_ref()?;
            Some((
                *guild_id,
                GuildEvent::RoleDeleted {
                    role: role_snapshot(role),
                },
            ))
        }
        serenity::FullEvent::GuildRoleUpdate {
            old_data_if_available,
            new,
        } => {
            let before = role_snapshot(old_data_if_available.as_ref()?);
            Some((
                new.guild_id,
                GuildEvent::RoleUpdated {
                    before,
                    after: role_snapshot(new),
                },
            ))
        }
        serenity::FullEvent::GuildMemberUpdate {
            old_if_available,
            new,
            ..
        } => {
            let old = old_if_available.as_ref()?;
            let new = new.as_ref()?;
            roles_granted(ctx, old, new).map(|e| (new.guild_id, e))
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => Some((
            *guild_id,
            GuildEvent::MemberRemoved {
                user_id: user.id.get(),
            },
        )),
        serenity::FullEvent::GuildBanAddition {
            guild_id,
            banned_user,
        } => Some((
            *guild_id,
            GuildEvent::MemberBanned {
                user_id: banned_user.id.get(),
            },
        )),
        serenity::FullEvent::GuildMemberAddition { new_member } => Some((
            new_member.guild_id,
            GuildEvent::MemberJoined {
                member: JoinedMember {
                    user_id: new_member.user.id.get(),
                    is_bot: new_member.user.bot,
                    flagged_spammer: new_member
                        .user
                        .public_flags
                        .map(|flags| flags.contains(serenity::UserPublicFlags::SPAMMER))
                        .unwrap_or(false),
                    account_created_at: to_utc(new_member.user.created_at()),
                },
            },
        )),
        serenity::FullEvent::Message { new_message } => {
            let guild_id = new_message.guild_id?;
            // Only mention-bearing messages are interesting here.
            if !new_message.mention_everyone && new_message.mention_roles.is_empty() {
                return None;
            }
            Some((
                guild_id,
                GuildEvent::MessagePosted {
                    message: message_snapshot(ctx, guild_id, new_message)?,
                },
            ))
        }
        _ => None,
    }
}

fn roles_granted(
    ctx: &serenity::Context,
    old: &serenity::Member,
    new: &serenity::Member,
) -> Option<GuildEvent> {
    let granted_ids: Vec<serenity::RoleId> = new
        .roles
        .iter()
        .filter(|role_id| !old.roles.contains(role_id))
        .copied()
        .collect();
    if granted_ids.is_empty() {
        return None;
    }

    let guild = ctx.cache.guild(new.guild_id)?;
    let lookup = |ids: &[serenity::RoleId]| -> Vec<RoleSnapshot> {
        ids.iter()
            .filter_map(|role_id| guild.roles.get(role_id))
            .map(role_snapshot)
            .collect()
    };

    Some(GuildEvent::RolesGranted {
        member: MemberSnapshot {
            user_id: new.user.id.get(),
            is_bot: new.user.bot,
            top_role_position: top_role_position(&guild, &new.roles),
        },
        before: lookup(&old.roles),
        granted: lookup(&granted_ids),
    })
}

fn message_snapshot(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    message: &serenity::Message,
) -> Option<MessageSnapshot> {
    let guild = ctx.cache.guild(guild_id)?;

    let author = if message.webhook_id.is_some() {
        None
    } else {
        let top_role_position = guild
            .members
            .get(&message.author.id)
            .map(|member| top_role_position(&guild, &member.roles))
            .unwrap_or(0);
        Some(MemberSnapshot {
            user_id: message.author.id.get(),
            is_bot: message.author.bot,
            top_role_position,
        })
    };

    let role_mentions = message
        .mention_roles
        .iter()
        .map(|role_id| RoleMention {
            role_id: role_id.get(),
            member_count: guild
                .members
                .values()
                .filter(|member| member.roles.contains(role_id))
                .count() as u64,
        })
        .collect();

    Some(MessageSnapshot {
        channel_id: message.channel_id.get(),
        author,
        webhook_id: message.webhook_id.map(|id| id.get()),
        mentions_everyone: message.mention_everyone,
        role_mentions,
    })
}

fn guild_snapshot(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
) -> Option<GuildSnapshot> {
    let bot_user_id = ctx.cache.current_user().id;
    let guild = ctx.cache.guild(guild_id)?;

    let bot_member = guild.members.get(&bot_user_id);
    let bot_top_role_position = bot_member
        .map(|member| top_role_position(&guild, &member.roles))
        .unwrap_or(0);

    let bot_permissions = if guild.owner_id == bot_user_id {
        serenity::Permissions::all()
    } else {
        // The @everyone role shares the guild's id.
        let mut permissions = guild
            .roles
            .get(&serenity::RoleId::new(guild_id.get()))
            .map(|role| role.permissions)
            .unwrap_or_default();
        if let Some(member) = bot_member {
            for role_id in &member.roles {
                if let Some(role) = guild.roles.get(role_id) {
                    permissions |= role.permissions;
                }
            }
        }
        permissions
    };

    Some(GuildSnapshot {
        guild_id: guild_id.get(),
        owner_id: guild.owner_id.get(),
        member_count: guild.member_count,
        bot_user_id: bot_user_id.get(),
        bot_top_role_position,
        bot_permissions: Permissions(bot_permissions.bits()),
    })
}

fn to_utc(timestamp: serenity::Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn top_role_position(guild: &serenity::Guild, roles: &[serenity::RoleId]) -> u16 {
    roles
        .iter()
        .filter_map(|role_id| guild.roles.get(role_id))
        .map(|role| role.position)
        .max()
        .unwrap_or(0)
}

fn role_snapshot(role: &serenity::Role) -> RoleSnapshot {
    RoleSnapshot {
        role_id: role.id.get(),
        name: role.name.clone(),
        color: role.colour.0,
        hoist: role.hoist,
        managed: role.managed,
        mentionable: role.mentionable,
        permissions: Permissions(role.permissions.bits()),
        position: role.position,
    }
}

fn channel_snapshot(channel: &serenity::GuildChannel) -> Option<ChannelSnapshot> {
    let kind = match channel.kind {
        serenity::ChannelType::Text => ChannelKind::Text,
        serenity::ChannelType::Voice => ChannelKind::Voice,
        serenity::ChannelType::Category => ChannelKind::Category,
        serenity::ChannelType::News => ChannelKind::News,
        serenity::ChannelType::Stage => ChannelKind::Stage,
        serenity::ChannelType::Forum => ChannelKind::Forum,
        // Threads and other transient channels are not worth re-creating.
        _ => return None,
    };
    Some(ChannelSnapshot {
        channel_id: channel.id.get(),
        name: channel.name.clone(),
        kind,
        parent_id: channel.parent_id.map(|id| id.get()),
        topic: channel.topic.clone(),
        nsfw: channel.nsfw,
        position: channel.position,
    })
}

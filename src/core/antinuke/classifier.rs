// Event classification - decides whether a gateway event is module-worthy
// and what compensating actions undo its damage.
//
// This consolidates the per-event listener bodies into one table-driven
// dispatcher: `candidate_modules` maps an event to the modules that might
// care about it, and `classify` applies each module's policy.

use super::antinuke_models::{
    ActorRef, AuditActionKind, Action, EventContext, GuildEvent, ModuleKind, ModuleRule,
    format_timespan,
};

/// How the acting user gets resolved for an incident.
#[derive(Debug, Clone, PartialEq)]
pub enum ActorResolution {
    /// Actor known directly from the event (message author, joining member).
    Known(ActorRef),
    /// Actor must be looked up from the most recent matching audit entry.
    FromAuditLog(AuditActionKind),
    /// No punishable actor exists (webhook-authored mass mention); the
    /// incident carries compensation only.
    Unattributable,
}

/// A classified, potentially punishable event.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub module: ModuleKind,
    pub actor: ActorResolution,
    /// The damaged or targeted entity, where one exists. For join-screening
    /// modules this is the joining member.
    pub target_id: Option<u64>,
    pub reason: String,
    pub compensating: Vec<Action>,
}

/// Which modules could be interested in this event. A member join fans out to
/// all three join-screening modules; everything else maps to exactly one.
pub fn candidate_modules(event: &GuildEvent) -> &'static [ModuleKind] {
    match event {
        GuildEvent::ChannelCreated { .. } => &[ModuleKind::ChannelCreate],
        GuildEvent::ChannelDeleted { .. } => &[ModuleKind::ChannelDelete],
        GuildEvent::RoleCreated { .. } => &[ModuleKind::RoleCreate],
        GuildEvent::RoleDeleted { .. } => &[ModuleKind::RoleDelete],
        GuildEvent::RoleUpdated { .. } => &[ModuleKind::EditRole],
        GuildEvent::RolesGranted { .. } => &[ModuleKind::RoleGive],
        GuildEvent::MemberRemoved { .. } => &[ModuleKind::Kick],
        GuildEvent::MemberBanned { .. } => &[ModuleKind::Ban],
        GuildEvent::MemberJoined { .. } => &[
            ModuleKind::NewAccounts,
            ModuleKind::Spammer,
            ModuleKind::BotAdd,
        ],
        GuildEvent::MessagePosted { .. } => &[ModuleKind::MassMention],
    }
}

/// Apply one module's policy to an event. `None` means the event is not
/// actionable under that module (e.g. a harmless role rename).
pub fn classify(
    ctx: &EventContext,
    event: &GuildEvent,
    rule: &ModuleRule,
) -> Option<Classification> {
    match (rule.module, event) {
        (ModuleKind::ChannelCreate, GuildEvent::ChannelCreated { channel }) => {
            Some(Classification {
                module: rule.module,
                actor: ActorResolution::FromAuditLog(AuditActionKind::ChannelCreate),
                target_id: Some(channel.channel_id),
                reason: "Creating channels".to_string(),
                compensating: vec![Action::DeleteChannel {
                    channel_id: channel.channel_id,
                }],
            })
        }

        (ModuleKind::ChannelDelete, GuildEvent::ChannelDeleted { channel }) => {
            Some(Classification {
                module: rule.module,
                actor: ActorResolution::FromAuditLog(AuditActionKind::ChannelDelete),
                target_id: Some(channel.channel_id),
                reason: "Deleting channels".to_string(),
                compensating: vec![Action::RecreateChannel {
                    channel: channel.clone(),
                }],
            })
        }

        (ModuleKind::RoleCreate, GuildEvent::RoleCreated { role }) => Some(Classification {
            module: rule.module,
            actor: ActorResolution::FromAuditLog(AuditActionKind::RoleCreate),
            target_id: Some(role.role_id),
            reason: "Creating roles".to_string(),
            compensating: vec![Action::DeleteRole {
                role_id: role.role_id,
            }],
        }),

        (ModuleKind::RoleDelete, GuildEvent::RoleDeleted { role }) => Some(Classification {
            module: rule.module,
            actor: ActorResolution::FromAuditLog(AuditActionKind::RoleDelete),
            target_id: Some(role.role_id),
            reason: "Deleting roles".to_string(),
            compensating: vec![Action::RecreateRole { role: role.clone() }],
        }),

        (ModuleKind::EditRole, GuildEvent::RoleUpdated { before, after }) => {
            // Only two diffs are actionable: flipping a role mentionable, and
            // escalating it into the dangerous permission set.
            let compensating = if !before.mentionable && after.mentionable {
                vec![Action::RevertRoleMentionable {
                    role_id: after.role_id,
                    mentionable: before.mentionable,
                }]
            } else if !before.permissions.is_dangerous() && after.permissions.is_dangerous() {
                vec![Action::RevertRolePermissions {
                    role_id: after.role_id,
                    permissions: before.permissions,
                }]
            } else {
                return None;
            };

            Some(Classification {
                module: rule.module,
                actor: ActorResolution::FromAuditLog(AuditActionKind::RoleUpdate),
                target_id: Some(after.role_id),
                reason: "Maliciously editing roles".to_string(),
                compensating,
            })
        }

        (
            ModuleKind::RoleGive,
            GuildEvent::RolesGranted {
                member,
                before,
                granted,
            },
        ) => {
            let dangerous_grant = granted
                .iter()
                .any(|r| r.assignable_by_bot(&ctx.guild) && r.permissions.is_dangerous());
            if !dangerous_grant {
                return None;
            }

            // Reset the target to the prior roles the bot can actually assign.
            let restore: Vec<u64> = before
                .iter()
                .filter(|r| r.assignable_by_bot(&ctx.guild))
                .map(|r| r.role_id)
                .collect();

            Some(Classification {
                module: rule.module,
                actor: ActorResolution::FromAuditLog(AuditActionKind::MemberRoleUpdate),
                target_id: Some(member.user_id),
                reason: "Giving roles with dangerous permissions".to_string(),
                compensating: vec![Action::SetMemberRoles {
                    user_id: member.user_id,
                    role_ids: restore,
                    reason: "Roles being reverted".to_string(),
                }],
            })
        }

        (ModuleKind::Kick, GuildEvent::MemberRemoved { user_id }) => Some(Classification {
            module: rule.module,
            actor: ActorResolution::FromAuditLog(AuditActionKind::Kick),
            target_id: Some(*user_id),
            reason: "Kicking members".to_string(),
            compensating: vec![],
        }),

        (ModuleKind::Ban, GuildEvent::MemberBanned { user_id }) => Some(Classification {
            module: rule.module,
            actor: ActorResolution::FromAuditLog(AuditActionKind::BanAdd),
            target_id: Some(*user_id),
            reason: "Banning members".to_string(),
            compensating: vec![],
        }),

        (ModuleKind::MassMention, GuildEvent::MessagePosted { message }) => {
            let big_role = message.role_mentions.iter().any(|r| {
                ctx.guild.member_count > 0
                    && r.member_count * 100 > ctx.guild.member_count * 70
            });
            let wide_role = message.role_mentions.iter().any(|r| r.member_count > 10);
            if !(message.mentions_everyone || wide_role || big_role) {
                return None;
            }

            let mut compensating = Vec::new();
            if let Some(webhook_id) = message.webhook_id {
                compensating.push(Action::DeleteWebhook { webhook_id });
            }

            let actor = match message.author {
                Some(member) => ActorResolution::Known(member.actor()),
                // Webhook message: nothing to punish, but the webhook itself
                // gets removed.
                None if message.webhook_id.is_some() => ActorResolution::Unattributable,
                None => return None,
            };

            Some(Classification {
                module: rule.module,
                actor,
                target_id: None,
                reason: "Mass mention".to_string(),
                compensating,
            })
        }

        (ModuleKind::NewAccounts, GuildEvent::MemberJoined { member }) => {
            let min_age_secs = u64::from(rule.threshold?);
            let age = ctx
                .observed_at
                .signed_duration_since(member.account_created_at)
                .num_seconds()
                .max(0) as u64;
            if age >= min_age_secs {
                return None;
            }

            Some(Classification {
                module: rule.module,
                actor: ActorResolution::Known(ActorRef {
                    user_id: member.user_id,
                    top_role_position: Some(0),
                }),
                target_id: Some(member.user_id),
                reason: format!("Account younger than {}", format_timespan(min_age_secs)),
                compensating: vec![],
            })
        }

        (ModuleKind::Spammer, GuildEvent::MemberJoined { member }) => {
            if !member.flagged_spammer {
                return None;
            }

            Some(Classification {
                module: rule.module,
                actor: ActorResolution::Known(ActorRef {
                    user_id: member.user_id,
                    top_role_position: Some(0),
                }),
                target_id: Some(member.user_id),
                reason: "Account flagged as spammer by discord".to_string(),
                compensating: vec![],
            })
        }

        (ModuleKind::BotAdd, GuildEvent::MemberJoined { member }) => {
            if !member.is_bot {
                return None;
            }

            Some(Classification {
                module: rule.module,
                actor: ActorResolution::FromAuditLog(AuditActionKind::BotAdd),
                target_id: Some(member.user_id),
                reason: "Adding unwhitelisted bots".to_string(),
                // The joining bot itself is removed regardless of what
                // happens to whoever invited it.
                compensating: vec![Action::Ban {
                    user_id: member.user_id,
                    reason: "Unwhitelisted bot added".to_string(),
                }],
            })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antinuke::antinuke_models::{
        ChannelKind, ChannelSnapshot, GuildSnapshot, JoinedMember, MemberSnapshot,
        MessageSnapshot, Permissions, PunishmentKind, RoleMention, RoleSnapshot,
    };
    use chrono::{Duration, Utc};

    fn guild() -> GuildSnapshot {
        GuildSnapshot {
            guild_id: 1,
            owner_id: 10,
            member_count: 100,
            bot_user_id: 99,
            bot_top_role_position: 50,
            bot_permissions: Permissions(Permissions::ADMINISTRATOR),
        }
    }

    fn ctx() -> EventContext {
        EventContext {
            guild: guild(),
            observed_at: Utc::now(),
        }
    }

    fn rule(module: ModuleKind, threshold: Option<u32>) -> ModuleRule {
        ModuleRule {
            module,
            punishment: PunishmentKind::Ban,
            threshold,
        }
    }

    fn role(id: u64, position: u16, permissions: u64, mentionable: bool) -> RoleSnapshot {
        RoleSnapshot {
            role_id: id,
            name: format!("role-{id}"),
            color: 0,
            hoist: false,
            managed: false,
            mentionable,
            permissions: Permissions(permissions),
            position,
        }
    }

    #[test]
    fn role_edit_mentionable_flip_is_actionable() {
        let before = role(5, 1, 0, false);
        let after = role(5, 1, 0, true);
        let c = classify(
            &ctx(),
            &GuildEvent::RoleUpdated { before, after },
            &rule(ModuleKind::EditRole, None),
        )
        .unwrap();
        assert_eq!(
            c.compensating,
            vec![Action::RevertRoleMentionable {
                role_id: 5,
                mentionable: false
            }]
        );
    }

    #[test]
    fn role_edit_permission_escalation_is_actionable() {
        let before = role(5, 1, 0, false);
        let after = role(5, 1, Permissions::ADMINISTRATOR, false);
        let c = classify(
            &ctx(),
            &GuildEvent::RoleUpdated { before, after },
            &rule(ModuleKind::EditRole, None),
        )
        .unwrap();
        assert_eq!(
            c.compensating,
            vec![Action::RevertRolePermissions {
                role_id: 5,
                permissions: Permissions(0)
            }]
        );
    }

    #[test]
    fn role_edit_other_diffs_are_ignored() {
        // A rename, or dropping dangerous perms, is not an attack.
        let before = role(5, 1, Permissions::ADMINISTRATOR, false);
        let after = role(5, 1, 0, false);
        assert!(classify(
            &ctx(),
            &GuildEvent::RoleUpdated { before, after },
            &rule(ModuleKind::EditRole, None),
        )
        .is_none());
    }

    #[test]
    fn role_grant_requires_dangerous_assignable_role() {
        let member = MemberSnapshot {
            user_id: 7,
            is_bot: false,
            top_role_position: 1,
        };
        let harmless = GuildEvent::RolesGranted {
            member,
            before: vec![role(2, 1, 0, false)],
            granted: vec![role(3, 2, 0, false)],
        };
        assert!(classify(&ctx(), &harmless, &rule(ModuleKind::RoleGive, Some(0))).is_none());

        // Dangerous but above the bot's top role: the bot could not have
        // assigned it and cannot revert it.
        let unreachable = GuildEvent::RolesGranted {
            member,
            before: vec![],
            granted: vec![role(3, 60, Permissions::ADMINISTRATOR, false)],
        };
        assert!(classify(&ctx(), &unreachable, &rule(ModuleKind::RoleGive, Some(0))).is_none());

        let dangerous = GuildEvent::RolesGranted {
            member,
            before: vec![role(2, 1, 0, false)],
            granted: vec![role(3, 2, Permissions::ADMINISTRATOR, false)],
        };
        let c = classify(&ctx(), &dangerous, &rule(ModuleKind::RoleGive, Some(0))).unwrap();
        assert_eq!(
            c.compensating,
            vec![Action::SetMemberRoles {
                user_id: 7,
                role_ids: vec![2],
                reason: "Roles being reverted".to_string()
            }]
        );
    }

    #[test]
    fn channel_delete_compensates_with_reclone() {
        let channel = ChannelSnapshot {
            channel_id: 42,
            name: "general".to_string(),
            kind: ChannelKind::Text,
            parent_id: None,
            topic: None,
            nsfw: false,
            position: 0,
        };
        let c = classify(
            &ctx(),
            &GuildEvent::ChannelDeleted {
                channel: channel.clone(),
            },
            &rule(ModuleKind::ChannelDelete, Some(0)),
        )
        .unwrap();
        assert_eq!(c.compensating, vec![Action::RecreateChannel { channel }]);
        assert_eq!(
            c.actor,
            ActorResolution::FromAuditLog(AuditActionKind::ChannelDelete)
        );
    }

    #[test]
    fn mass_mention_everyone_triggers() {
        let msg = MessageSnapshot {
            channel_id: 1,
            author: Some(MemberSnapshot {
                user_id: 7,
                is_bot: false,
                top_role_position: 1,
            }),
            webhook_id: None,
            mentions_everyone: true,
            role_mentions: vec![],
        };
        let c = classify(
            &ctx(),
            &GuildEvent::MessagePosted { message: msg },
            &rule(ModuleKind::MassMention, None),
        )
        .unwrap();
        assert!(c.compensating.is_empty());
        assert!(matches!(c.actor, ActorResolution::Known(_)));
    }

    #[test]
    fn mass_mention_role_heuristics() {
        let base = MessageSnapshot {
            channel_id: 1,
            author: Some(MemberSnapshot {
                user_id: 7,
                is_bot: false,
                top_role_position: 1,
            }),
            webhook_id: None,
            mentions_everyone: false,
            role_mentions: vec![RoleMention {
                role_id: 3,
                member_count: 11,
            }],
        };
        // 11 members > 10 triggers
        assert!(classify(
            &ctx(),
            &GuildEvent::MessagePosted {
                message: base.clone()
            },
            &rule(ModuleKind::MassMention, None),
        )
        .is_some());

        // 8 members in a 10-member guild is 80% coverage: "big role"
        let mut small_guild = ctx();
        small_guild.guild.member_count = 10;
        let mut msg = base.clone();
        msg.role_mentions = vec![RoleMention {
            role_id: 3,
            member_count: 8,
        }];
        assert!(classify(
            &small_guild,
            &GuildEvent::MessagePosted { message: msg },
            &rule(ModuleKind::MassMention, None),
        )
        .is_some());

        // 5 members, 5% coverage: not actionable
        let mut msg = base;
        msg.role_mentions = vec![RoleMention {
            role_id: 3,
            member_count: 5,
        }];
        assert!(classify(
            &ctx(),
            &GuildEvent::MessagePosted { message: msg },
            &rule(ModuleKind::MassMention, None),
        )
        .is_none());
    }

    #[test]
    fn webhook_mass_mention_is_unattributable_but_compensated() {
        let msg = MessageSnapshot {
            channel_id: 1,
            author: None,
            webhook_id: Some(500),
            mentions_everyone: true,
            role_mentions: vec![],
        };
        let c = classify(
            &ctx(),
            &GuildEvent::MessagePosted { message: msg },
            &rule(ModuleKind::MassMention, None),
        )
        .unwrap();
        assert_eq!(c.actor, ActorResolution::Unattributable);
        assert_eq!(c.compensating, vec![Action::DeleteWebhook { webhook_id: 500 }]);
    }

    #[test]
    fn new_account_age_gate() {
        let now = Utc::now();
        let member = |age_secs: i64| JoinedMember {
            user_id: 7,
            is_bot: false,
            flagged_spammer: false,
            account_created_at: now - Duration::seconds(age_secs),
        };
        let mut c = ctx();
        c.observed_at = now;
        let day_rule = rule(ModuleKind::NewAccounts, Some(86_400));

        let young = classify(
            &c,
            &GuildEvent::MemberJoined {
                member: member(3_600),
            },
            &day_rule,
        )
        .unwrap();
        assert!(young.reason.contains("1 day"));

        assert!(classify(
            &c,
            &GuildEvent::MemberJoined {
                member: member(90_000),
            },
            &day_rule,
        )
        .is_none());
    }

    #[test]
    fn bot_add_bans_joining_bot_as_compensation() {
        let member = JoinedMember {
            user_id: 55,
            is_bot: true,
            flagged_spammer: false,
            account_created_at: Utc::now(),
        };
        let c = classify(
            &ctx(),
            &GuildEvent::MemberJoined { member },
            &rule(ModuleKind::BotAdd, None),
        )
        .unwrap();
        assert_eq!(
            c.actor,
            ActorResolution::FromAuditLog(AuditActionKind::BotAdd)
        );
        assert!(matches!(
            c.compensating.as_slice(),
            [Action::Ban { user_id: 55, .. }]
        ));
    }

    #[test]
    fn member_join_fans_out_to_all_screen_modules() {
        let event = GuildEvent::MemberJoined {
            member: JoinedMember {
                user_id: 55,
                is_bot: false,
                flagged_spammer: false,
                account_created_at: Utc::now(),
            },
        };
        assert_eq!(
            candidate_modules(&event),
            &[
                ModuleKind::NewAccounts,
                ModuleKind::Spammer,
                ModuleKind::BotAdd
            ]
        );
    }
}

// Punishment decision - configured punishment string to concrete action.
//
// Strip validity for join-screening modules is enforced at configuration
// time (see AntinukeService::enable_module), never here.

use super::antinuke_models::{Action, ModuleRule, PunishmentKind};

pub fn decide(rule: &ModuleRule, actor_id: u64, reason: &str) -> Action {
    match rule.punishment {
        PunishmentKind::Ban => Action::Ban {
            user_id: actor_id,
            reason: reason.to_string(),
        },
        PunishmentKind::Kick => Action::Kick {
            user_id: actor_id,
            reason: reason.to_string(),
        },
        PunishmentKind::Strip => Action::StripRoles {
            user_id: actor_id,
            reason: reason.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antinuke::antinuke_models::ModuleKind;

    fn rule(punishment: PunishmentKind) -> ModuleRule {
        ModuleRule {
            module: ModuleKind::ChannelDelete,
            punishment,
            threshold: Some(0),
        }
    }

    #[test]
    fn punishment_maps_to_matching_action() {
        assert!(matches!(
            decide(&rule(PunishmentKind::Ban), 7, "r"),
            Action::Ban { user_id: 7, .. }
        ));
        assert!(matches!(
            decide(&rule(PunishmentKind::Kick), 7, "r"),
            Action::Kick { user_id: 7, .. }
        ));
        assert!(matches!(
            decide(&rule(PunishmentKind::Strip), 7, "r"),
            Action::StripRoles { user_id: 7, .. }
        ));
    }

    #[test]
    fn reason_is_carried_through() {
        let action = decide(&rule(PunishmentKind::Ban), 7, "Deleting channels");
        assert_eq!(
            action,
            Action::Ban {
                user_id: 7,
                reason: "Deleting channels".to_string()
            }
        );
    }
}

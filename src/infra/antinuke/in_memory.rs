// In-memory implementation of ConfigStore.
//
// Used by the service tests and handy for running the bot without a
// database; state disappears on restart.

use crate::core::antinuke::{ConfigError, ConfigStore, GuildAntinukeConfig, ModuleKind, ModuleRule};
use async_trait::async_trait;
use dashmap::DashMap;

pub struct InMemoryConfigStore {
    configs: DashMap<u64, GuildAntinukeConfig>,
    rules: DashMap<(u64, ModuleKind), ModuleRule>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            rules: DashMap::new(),
        }
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_guild_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<GuildAntinukeConfig>, ConfigError> {
        Ok(self.configs.get(&guild_id).map(|c| c.clone()))
    }

    async fn save_guild_config(&self, config: &GuildAntinukeConfig) -> Result<(), ConfigError> {
        self.configs.insert(config.guild_id, config.clone());
        Ok(())
    }

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), ConfigError> {
        self.configs.remove(&guild_id);
        self.rules.retain(|(gid, _), _| *gid != guild_id);
        Ok(())
    }

    async fn get_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<Option<ModuleRule>, ConfigError> {
        Ok(self.rules.get(&(guild_id, module)).map(|r| r.clone()))
    }

    async fn save_module_rule(
        &self,
        guild_id: u64,
        rule: &ModuleRule,
    ) -> Result<(), ConfigError> {
        self.rules.insert((guild_id, rule.module), rule.clone());
        Ok(())
    }

    async fn delete_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<bool, ConfigError> {
        Ok(self.rules.remove(&(guild_id, module)).is_some())
    }

    async fn list_module_rules(&self, guild_id: u64) -> Result<Vec<ModuleRule>, ConfigError> {
        // Stable order so status listings don't shuffle between calls.
        let mut rules = Vec::new();
        for module in ModuleKind::ALL {
            if let Some(rule) = self.rules.get(&(guild_id, module)) {
                rules.push(rule.clone());
            }
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::antinuke::PunishmentKind;

    #[tokio::test]
    async fn config_round_trip() {
        let store = InMemoryConfigStore::new();
        assert!(store.get_guild_config(1).await.unwrap().is_none());

        let mut config = GuildAntinukeConfig::new(1, 10);
        config.whitelisted.insert(42);
        store.save_guild_config(&config).await.unwrap();

        let loaded = store.get_guild_config(1).await.unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn delete_guild_removes_rules_too() {
        let store = InMemoryConfigStore::new();
        store
            .save_guild_config(&GuildAntinukeConfig::new(1, 10))
            .await
            .unwrap();
        store
            .save_module_rule(
                1,
                &ModuleRule {
                    module: ModuleKind::Ban,
                    punishment: PunishmentKind::Ban,
                    threshold: Some(2),
                },
            )
            .await
            .unwrap();

        store.delete_guild_config(1).await.unwrap();
        assert!(store.get_guild_config(1).await.unwrap().is_none());
        assert!(store
            .get_module_rule(1, ModuleKind::Ban)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rules_are_listed_in_module_order() {
        let store = InMemoryConfigStore::new();
        for module in [ModuleKind::Kick, ModuleKind::ChannelDelete] {
            store
                .save_module_rule(
                    1,
                    &ModuleRule {
                        module,
                        punishment: PunishmentKind::Ban,
                        threshold: None,
                    },
                )
                .await
                .unwrap();
        }

        let rules = store.list_module_rules(1).await.unwrap();
        assert_eq!(
            rules.iter().map(|r| r.module).collect::<Vec<_>>(),
            vec![ModuleKind::ChannelDelete, ModuleKind::Kick]
        );
        assert!(store.delete_module_rule(1, ModuleKind::Kick).await.unwrap());
        assert!(!store.delete_module_rule(1, ModuleKind::Kick).await.unwrap());
    }
}

// SQLite-backed antinuke config store.
//
// Tables:
// - antinuke: Per-guild antinuke state (owner, admins, whitelist, log channel)
// - antinuke_modules: One row per enabled module rule
//
// Admin and whitelist sets are stored as JSON arrays; they are small and
// only ever read as a whole.

use crate::core::antinuke::{
    ConfigError, ConfigStore, GuildAntinukeConfig, ModuleKind, ModuleRule, PunishmentKind,
};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeSet;

pub struct SqliteConfigStore {
    pool: Pool<Sqlite>,
}

impl SqliteConfigStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ConfigError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS antinuke (
                guild_id INTEGER PRIMARY KEY,
                configured BOOLEAN NOT NULL DEFAULT 1,
                owner_id INTEGER NOT NULL,
                admins TEXT NOT NULL DEFAULT '[]',
                whitelisted TEXT NOT NULL DEFAULT '[]',
                log_channel INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS antinuke_modules (
                guild_id INTEGER NOT NULL,
                module TEXT NOT NULL,
                punishment TEXT NOT NULL,
                threshold INTEGER,
                PRIMARY KEY (guild_id, module)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;

        Ok(())
    }
}

fn decode_id_set(json: &str) -> Result<BTreeSet<u64>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Storage(e.to_string()))
}

fn encode_id_set(set: &BTreeSet<u64>) -> Result<String, ConfigError> {
    serde_json::to_string(set).map_err(|e| ConfigError::Storage(e.to_string()))
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get_guild_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<GuildAntinukeConfig>, ConfigError> {
        let row = sqlx::query("SELECT * FROM antinuke WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ConfigError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let admins: String = row.get("admins");
        let whitelisted: String = row.get("whitelisted");
        Ok(Some(GuildAntinukeConfig {
            guild_id,
            configured: row.get("configured"),
            owner_id: row.get::<i64, _>("owner_id") as u64,
            admins: decode_id_set(&admins)?,
            whitelisted: decode_id_set(&whitelisted)?,
            log_channel: row
                .get::<Option<i64>, _>("log_channel")
                .map(|id| id as u64),
        }))
    }

    async fn save_guild_config(&self, config: &GuildAntinukeConfig) -> Result<(), ConfigError> {
        sqlx::query(
            r#"
            INSERT INTO antinuke (guild_id, configured, owner_id, admins, whitelisted, log_channel)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                configured = excluded.configured,
                owner_id = excluded.owner_id,
                admins = excluded.admins,
                whitelisted = excluded.whitelisted,
                log_channel = excluded.log_channel
            "#,
        )
        .bind(config.guild_id as i64)
        .bind(config.configured)
        .bind(config.owner_id as i64)
        .bind(encode_id_set(&config.admins)?)
        .bind(encode_id_set(&config.whitelisted)?)
        .bind(config.log_channel.map(|id| id as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), ConfigError> {
        sqlx::query("DELETE FROM antinuke WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ConfigError::Storage(e.to_string()))?;
        sqlx::query("DELETE FROM antinuke_modules WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| ConfigError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<Option<ModuleRule>, ConfigError> {
        let row = sqlx::query(
            "SELECT punishment, threshold FROM antinuke_modules WHERE guild_id = ? AND module = ?",
        )
        .bind(guild_id as i64)
        .bind(module.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let punishment: String = row.get("punishment");
        let punishment = PunishmentKind::parse(&punishment)
            .ok_or_else(|| ConfigError::Storage(format!("unknown punishment: {punishment}")))?;
        Ok(Some(ModuleRule {
            module,
            punishment,
            threshold: row
                .get::<Option<i64>, _>("threshold")
                .map(|t| t as u32),
        }))
    }

    async fn save_module_rule(
        &self,
        guild_id: u64,
        rule: &ModuleRule,
    ) -> Result<(), ConfigError> {
        sqlx::query(
            r#"
            INSERT INTO antinuke_modules (guild_id, module, punishment, threshold)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(guild_id, module) DO UPDATE SET
                punishment = excluded.punishment,
                threshold = excluded.threshold
            "#,
        )
        .bind(guild_id as i64)
        .bind(rule.module.as_str())
        .bind(rule.punishment.as_str())
        .bind(rule.threshold.map(|t| t as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete_module_rule(
        &self,
        guild_id: u64,
        module: ModuleKind,
    ) -> Result<bool, ConfigError> {
        let result = sqlx::query("DELETE FROM antinuke_modules WHERE guild_id = ? AND module = ?")
            .bind(guild_id as i64)
            .bind(module.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| ConfigError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_module_rules(&self, guild_id: u64) -> Result<Vec<ModuleRule>, ConfigError> {
        let rows = sqlx::query(
            "SELECT module, punishment, threshold FROM antinuke_modules WHERE guild_id = ?",
        )
        .bind(guild_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfigError::Storage(e.to_string()))?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let module: String = row.get("module");
            let module = ModuleKind::parse(&module)
                .ok_or_else(|| ConfigError::Storage(format!("unknown module: {module}")))?;
            let punishment: String = row.get("punishment");
            let punishment = PunishmentKind::parse(&punishment)
                .ok_or_else(|| ConfigError::Storage(format!("unknown punishment: {punishment}")))?;
            rules.push(ModuleRule {
                module,
                punishment,
                threshold: row
                    .get::<Option<i64>, _>("threshold")
                    .map(|t| t as u32),
            });
        }
        // Same ordering as the in-memory store, so module listings do not
        // depend on the backend.
        rules.sort_by_key(|rule| ModuleKind::ALL.iter().position(|m| *m == rule.module));
        Ok(rules)
    }
}

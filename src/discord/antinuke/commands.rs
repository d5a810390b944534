// Antinuke slash commands.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call the core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation. Permission
// checks (owner vs admin) live in the core service so they are enforced
// no matter who calls it.

use crate::core::antinuke::{
    format_timespan, AntinukeService, ConfigError, ModuleKind, PunishmentKind,
};
use crate::discord::antinuke::gateway::{
    SerenityAuditLogReader, SerenityGuildActions, SerenityModerationLog,
};
use crate::infra::antinuke::SqliteConfigStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The fully wired engine: SQLite config, live gateway adapters.
pub type Engine = AntinukeService<
    SqliteConfigStore,
    SerenityAuditLogReader,
    SerenityGuildActions,
    SerenityModerationLog,
>;

pub struct Data {
    pub antinuke: Arc<Engine>,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ModuleChoice {
    #[name = "channel delete"]
    ChannelDelete,
    #[name = "channel create"]
    ChannelCreate,
    #[name = "role giving"]
    RoleGive,
    #[name = "role delete"]
    RoleDelete,
    #[name = "role create"]
    RoleCreate,
    #[name = "kick"]
    Kick,
    #[name = "ban"]
    Ban,
    #[name = "edit role"]
    EditRole,
    #[name = "mass mention"]
    MassMention,
    #[name = "spammer"]
    Spammer,
    #[name = "new accounts"]
    NewAccounts,
    #[name = "bot add"]
    BotAdd,
}

impl From<ModuleChoice> for ModuleKind {
    fn from(choice: ModuleChoice) -> Self {
        match choice {
            ModuleChoice::ChannelDelete => ModuleKind::ChannelDelete,
            ModuleChoice::ChannelCreate => ModuleKind::ChannelCreate,
            ModuleChoice::RoleGive => ModuleKind::RoleGive,
            ModuleChoice::RoleDelete => ModuleKind::RoleDelete,
            ModuleChoice::RoleCreate => ModuleKind::RoleCreate,
            ModuleChoice::Kick => ModuleKind::Kick,
            ModuleChoice::Ban => ModuleKind::Ban,
            ModuleChoice::EditRole => ModuleKind::EditRole,
            ModuleChoice::MassMention => ModuleKind::MassMention,
            ModuleChoice::Spammer => ModuleKind::Spammer,
            ModuleChoice::NewAccounts => ModuleKind::NewAccounts,
            ModuleChoice::BotAdd => ModuleKind::BotAdd,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PunishmentChoice {
    #[name = "ban"]
    Ban,
    #[name = "kick"]
    Kick,
    #[name = "strip roles"]
    Strip,
}

impl From<PunishmentChoice> for PunishmentKind {
    fn from(choice: PunishmentChoice) -> Self {
        match choice {
            PunishmentChoice::Ban => PunishmentKind::Ban,
            PunishmentChoice::Kick => PunishmentKind::Kick,
            PunishmentChoice::Strip => PunishmentKind::Strip,
        }
    }
}

/// Parse "30", "10m", "1d2h" style inputs into seconds.
pub fn parse_timespan(input: &str) -> Option<u64> {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return None;
    }
    if let Ok(seconds) = input.parse::<u64>() {
        return Some(seconds);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

/// A minimum account age as stored in a module rule. Rejects timespans that
/// do not fit the stored `u32` seconds field.
fn parse_account_age(input: &str) -> Option<u32> {
    u32::try_from(parse_timespan(input)?).ok()
}

fn user_message(error: &ConfigError) -> String {
    match error {
        ConfigError::NotConfigured => {
            "Antinuke is not set up here. Run `/antinuke setup` first.".to_string()
        }
        ConfigError::AlreadyConfigured => "Antinuke is already set up here.".to_string(),
        ConfigError::NotOwner => "Only the antinuke owner can do that.".to_string(),
        ConfigError::NotAdmin => "Only antinuke admins can do that.".to_string(),
        ConfigError::StripNotAllowed(module) => {
            format!("Strip roles makes no sense for the **{module}** module - the offender has no roles to strip. Pick ban or kick.")
        }
        ConfigError::ModuleNotEnabled(module) => {
            format!("The **{module}** module is not enabled.")
        }
        ConfigError::Storage(e) => format!("Storage error: {e}"),
    }
}

/// Replies with a friendly message for user errors, propagates storage
/// failures to the framework error handler.
async fn respond(
    ctx: Context<'_>,
    result: Result<(), ConfigError>,
    success: &str,
) -> Result<(), Error> {
    match result {
        Ok(()) => {
            ctx.say(success).await?;
            Ok(())
        }
        Err(ConfigError::Storage(e)) => Err(Error::from(e)),
        Err(e) => {
            ctx.say(user_message(&e)).await?;
            Ok(())
        }
    }
}

fn guild_context(ctx: &Context<'_>) -> Result<(u64, u64, u64), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;
    let owner_id = ctx
        .guild()
        .map(|g| g.owner_id.get())
        .ok_or("Guild not in cache")?;
    Ok((guild_id.get(), ctx.author().id.get(), owner_id))
}

/// Antinuke protection commands.
#[poise::command(
    slash_command,
    guild_only,
    subcommands(
        "setup",
        "reset",
        "status",
        "logs",
        "enable",
        "disable",
        "enableall",
        "whitelist",
        "unwhitelist",
        "whitelisted",
        "admin_add",
        "admin_remove",
        "admins"
    )
)]
pub async fn antinuke(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Turn on antinuke for this server (server owner only).
#[poise::command(slash_command, guild_only)]
pub async fn setup(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, invoker_id, owner_id) = guild_context(&ctx)?;
    let result = ctx.data().antinuke.setup(guild_id, invoker_id, owner_id).await;
    respond(
        ctx,
        result,
        "🛡️ Antinuke is now active. Enable modules with `/antinuke enable`.",
    )
    .await
}

/// Wipe the antinuke configuration for this server (antinuke owner only).
#[poise::command(slash_command, guild_only)]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    let result = ctx.data().antinuke.reset(guild_id, invoker_id).await;
    respond(ctx, result, "Antinuke configuration wiped.").await
}

/// Show the antinuke configuration and enabled modules.
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, _, _) = guild_context(&ctx)?;
    let data = ctx.data();

    let config = match data.antinuke.guild_config(guild_id).await {
        Ok(Some(config)) if config.configured => config,
        Ok(_) => {
            ctx.say(user_message(&ConfigError::NotConfigured)).await?;
            return Ok(());
        }
        Err(e) => return Err(Error::from(e.to_string())),
    };
    let rules = data
        .antinuke
        .module_rules(guild_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let modules = if rules.is_empty() {
        "none enabled".to_string()
    } else {
        rules
            .iter()
            .map(|rule| {
                let detail = match rule.threshold {
                    Some(t) if rule.module == ModuleKind::NewAccounts => {
                        format!("minimum age {}", format_timespan(t as u64))
                    }
                    Some(t) if t > 0 => format!("threshold {t}/60s"),
                    _ => "every offense".to_string(),
                };
                format!("**{}** → {} ({})", rule.module, rule.punishment, detail)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Antinuke Status")
        .color(0x00FF00)
        .field("Owner", format!("<@{}>", config.owner_id), true)
        .field(
            "Log channel",
            config
                .log_channel
                .map(|id| format!("<#{id}>"))
                .unwrap_or_else(|| "not set".to_string()),
            true,
        )
        .field("Admins", format!("{}", config.admins.len()), true)
        .field("Whitelisted", format!("{}", config.whitelisted.len()), true)
        .field("Modules", modules, false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set or clear the channel where incidents are logged.
#[poise::command(slash_command, guild_only)]
pub async fn logs(
    ctx: Context<'_>,
    #[description = "Channel for incident logs (omit to disable)"] channel: Option<
        serenity::Channel,
    >,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    let channel_id = channel.as_ref().map(|c| c.id().get());
    let result = ctx
        .data()
        .antinuke
        .set_log_channel(guild_id, invoker_id, channel_id)
        .await;
    let success = match channel_id {
        Some(id) => format!("Incident logs will go to <#{id}>."),
        None => "Incident logging disabled.".to_string(),
    };
    respond(ctx, result, &success).await
}

/// Enable a protection module.
#[poise::command(slash_command, guild_only)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "Module to enable"] module: ModuleChoice,
    #[description = "What happens to offenders"] punishment: PunishmentChoice,
    #[description = "Offenses per minute before punishing; minimum account age for new accounts (e.g. 3 or 1d)"]
    threshold: Option<String>,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    let module = ModuleKind::from(module);

    let threshold = match &threshold {
        None => None,
        Some(raw) if module == ModuleKind::NewAccounts => {
            let Some(seconds) = parse_account_age(raw) else {
                ctx.say(format!("Could not parse `{raw}` as an account age (try `1d` or `3600`)."))
                    .await?;
                return Ok(());
            };
            Some(seconds)
        }
        Some(raw) => match raw.parse::<u32>() {
            Ok(count) => Some(count),
            Err(_) => {
                ctx.say(format!("Could not parse `{raw}` as an offense count."))
                    .await?;
                return Ok(());
            }
        },
    };

    let result = ctx
        .data()
        .antinuke
        .enable_module(guild_id, invoker_id, module, punishment.into(), threshold)
        .await;
    respond(ctx, result, &format!("✅ Module **{module}** enabled.")).await
}

/// Disable a protection module.
#[poise::command(slash_command, guild_only)]
pub async fn disable(
    ctx: Context<'_>,
    #[description = "Module to disable"] module: ModuleChoice,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    let module = ModuleKind::from(module);
    let result = ctx
        .data()
        .antinuke
        .disable_module(guild_id, invoker_id, module)
        .await;
    respond(ctx, result, &format!("❌ Module **{module}** disabled.")).await
}

/// Enable every protection module at once.
#[poise::command(slash_command, guild_only)]
pub async fn enableall(
    ctx: Context<'_>,
    #[description = "What happens to offenders"] punishment: PunishmentChoice,
    #[description = "Offenses per minute before punishing"] threshold: Option<u32>,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    let result = ctx
        .data()
        .antinuke
        .enable_all(guild_id, invoker_id, punishment.into(), threshold)
        .await;
    respond(ctx, result, "✅ All protection modules enabled.").await
}

/// Exempt a user from every protection module.
#[poise::command(slash_command, guild_only)]
pub async fn whitelist(
    ctx: Context<'_>,
    #[description = "User to whitelist"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    match ctx
        .data()
        .antinuke
        .add_whitelist(guild_id, invoker_id, user.id.get())
        .await
    {
        Ok(true) => ctx.say(format!("**{}** is now whitelisted.", user.name)).await?,
        Ok(false) => {
            ctx.say(format!("**{}** is already whitelisted.", user.name))
                .await?
        }
        Err(ConfigError::Storage(e)) => return Err(Error::from(e)),
        Err(e) => ctx.say(user_message(&e)).await?,
    };
    Ok(())
}

/// Remove a user from the whitelist.
#[poise::command(slash_command, guild_only)]
pub async fn unwhitelist(
    ctx: Context<'_>,
    #[description = "User to remove"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    match ctx
        .data()
        .antinuke
        .remove_whitelist(guild_id, invoker_id, user.id.get())
        .await
    {
        Ok(true) => {
            ctx.say(format!("**{}** is no longer whitelisted.", user.name))
                .await?
        }
        Ok(false) => ctx.say(format!("**{}** was not whitelisted.", user.name)).await?,
        Err(ConfigError::Storage(e)) => return Err(Error::from(e)),
        Err(e) => ctx.say(user_message(&e)).await?,
    };
    Ok(())
}

/// List whitelisted users.
#[poise::command(slash_command, guild_only)]
pub async fn whitelisted(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, _, _) = guild_context(&ctx)?;
    let config = match ctx.data().antinuke.guild_config(guild_id).await {
        Ok(Some(config)) if config.configured => config,
        Ok(_) => {
            ctx.say(user_message(&ConfigError::NotConfigured)).await?;
            return Ok(());
        }
        Err(e) => return Err(Error::from(e.to_string())),
    };

    if config.whitelisted.is_empty() {
        ctx.say("Nobody is whitelisted.").await?;
    } else {
        let list = config
            .whitelisted
            .iter()
            .map(|id| format!("<@{id}>"))
            .collect::<Vec<_>>()
            .join(", ");
        ctx.say(format!("Whitelisted: {list}")).await?;
    }
    Ok(())
}

/// Make a user an antinuke admin (antinuke owner only).
#[poise::command(slash_command, guild_only, rename = "admin-add")]
pub async fn admin_add(
    ctx: Context<'_>,
    #[description = "User to promote"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    if user.bot {
        ctx.say("Bots cannot be antinuke admins.").await?;
        return Ok(());
    }
    match ctx
        .data()
        .antinuke
        .add_admin(guild_id, invoker_id, user.id.get())
        .await
    {
        Ok(true) => {
            ctx.say(format!("**{}** is now an antinuke admin.", user.name))
                .await?
        }
        Ok(false) => {
            ctx.say(format!("**{}** is already an antinuke admin.", user.name))
                .await?
        }
        Err(ConfigError::Storage(e)) => return Err(Error::from(e)),
        Err(e) => ctx.say(user_message(&e)).await?,
    };
    Ok(())
}

/// Demote an antinuke admin (antinuke owner only).
#[poise::command(slash_command, guild_only, rename = "admin-remove")]
pub async fn admin_remove(
    ctx: Context<'_>,
    #[description = "User to demote"] user: serenity::User,
) -> Result<(), Error> {
    let (guild_id, invoker_id, _) = guild_context(&ctx)?;
    match ctx
        .data()
        .antinuke
        .remove_admin(guild_id, invoker_id, user.id.get())
        .await
    {
        Ok(true) => {
            ctx.say(format!("**{}** is no longer an antinuke admin.", user.name))
                .await?
        }
        Ok(false) => {
            ctx.say(format!("**{}** was not an antinuke admin.", user.name))
                .await?
        }
        Err(ConfigError::Storage(e)) => return Err(Error::from(e)),
        Err(e) => ctx.say(user_message(&e)).await?,
    };
    Ok(())
}

/// List antinuke admins.
#[poise::command(slash_command, guild_only)]
pub async fn admins(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, _, _) = guild_context(&ctx)?;
    let config = match ctx.data().antinuke.guild_config(guild_id).await {
        Ok(Some(config)) if config.configured => config,
        Ok(_) => {
            ctx.say(user_message(&ConfigError::NotConfigured)).await?;
            return Ok(());
        }
        Err(e) => return Err(Error::from(e.to_string())),
    };

    let mut lines = vec![format!("Owner: <@{}>", config.owner_id)];
    for admin in &config.admins {
        lines.push(format!("Admin: <@{admin}>"));
    }
    ctx.say(lines.join("\n")).await?;
    Ok(())
}

use anyhow::Context;
use chrono::{FixedOffset, NaiveDateTime, Utc};
use spa_core::{OpeningHours, SlotGrid, TimeSlot};

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub hours: OpeningHours,
    /// The spa's wall-clock zone.
    pub utc_offset: FixedOffset,
    /// Telegram chat for notifications, if both token and chat id are set.
    pub telegram: Option<(String, i64)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let port = get("PORT", "3000")
            .parse()
            .context("PORT must be a port number")?;
        let open: TimeSlot = get("OPEN_TIME", "08:00")
            .parse()
            .context("OPEN_TIME must be HH:MM")?;
        let close: TimeSlot = get("CLOSE_TIME", "18:00")
            .parse()
            .context("CLOSE_TIME must be HH:MM")?;
        let step_minutes = get("SLOT_STEP_MINUTES", "30")
            .parse()
            .context("SLOT_STEP_MINUTES must be a positive number")?;
        let utc_offset_hours: i32 = get("UTC_OFFSET_HOURS", "3")
            .parse()
            .context("UTC_OFFSET_HOURS must be a number")?;
        let utc_offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .with_context(|| format!("UTC_OFFSET_HOURS out of range: {}", utc_offset_hours))?;

        let bot_token = var("BOT_TOKEN").filter(|t| !t.is_empty());
        let admin_tg_id = var("ADMIN_TG_ID")
            .map(|id| id.parse::<i64>())
            .transpose()
            .context("ADMIN_TG_ID must be a number")?;

        Ok(Self {
            database_url: get("DATABASE_URL", "sqlite:spa.db?mode=rwc"),
            host: get("HOST", "0.0.0.0"),
            port,
            hours: OpeningHours {
                open,
                close,
                step_minutes,
            },
            utc_offset,
            telegram: bot_token.zip(admin_tg_id),
        })
    }

    /// Validated slot grid for the configured opening hours.
    pub fn grid(&self) -> spa_core::Result<SlotGrid> {
        SlotGrid::generate(self.hours)
    }
}

/// Wall-clock "now" in the spa's zone.
pub fn local_now(offset: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&offset).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.database_url, "sqlite:spa.db?mode=rwc");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.hours.open.to_string(), "08:00");
        assert_eq!(cfg.hours.close.to_string(), "18:00");
        assert_eq!(cfg.hours.step_minutes, 30);
        assert_eq!(cfg.utc_offset.local_minus_utc(), 3 * 3600);
        assert!(cfg.telegram.is_none());
        assert_eq!(cfg.grid().unwrap().slots().len(), 20);
    }

    #[test]
    fn test_telegram_needs_both_values() {
        assert!(config(&[("BOT_TOKEN", "abc")]).unwrap().telegram.is_none());
        let cfg = config(&[("BOT_TOKEN", "abc"), ("ADMIN_TG_ID", "42")]).unwrap();
        assert_eq!(cfg.telegram, Some(("abc".to_string(), 42)));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(config(&[("OPEN_TIME", "8am")]).is_err());
        assert!(config(&[("ADMIN_TG_ID", "me")]).is_err());
        assert!(config(&[("UTC_OFFSET_HOURS", "30")]).is_err());
    }

    #[test]
    fn test_inverted_hours_fail_grid() {
        let cfg = config(&[("OPEN_TIME", "18:00"), ("CLOSE_TIME", "08:00")]).unwrap();
        assert!(matches!(
            cfg.grid(),
            Err(spa_core::BookingError::InvalidConfiguration(_))
        ));
    }
}

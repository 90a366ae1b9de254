//! Fire-and-forget notifications after appointment and voucher writes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Appointment, AppointmentStatus, RedemptionDelta, VoucherRedemption};

#[derive(Debug, Clone)]
pub enum Notification {
    AppointmentCreated(Appointment),
    AppointmentStatusChanged {
        appointment: Appointment,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    VoucherRedeemed(VoucherRedemption),
}

impl Notification {
    /// Human-readable text (Telegram HTML subset).
    pub fn render(&self) -> String {
        match self {
            Notification::AppointmentCreated(a) => format!(
                "🆕 Новая запись\n\n👤 {}\n💆 услуга #{} · мастер #{}\n📅 {} в {} ({} мин){}",
                a.client,
                a.service_id,
                a.therapist_id,
                a.date,
                a.start_time,
                a.duration_min,
                a.voucher_code
                    .as_deref()
                    .map(|c| format!("\n🎁 сертификат <code>{}</code>", c))
                    .unwrap_or_default(),
            ),
            Notification::AppointmentStatusChanged {
                appointment: a,
                from,
                to,
            } => {
                let icon = match to {
                    AppointmentStatus::Cancelled => "❌",
                    AppointmentStatus::Completed => "✅",
                    _ => "🔄",
                };
                format!(
                    "{} Запись #{}: {} → {}\n\n👤 {}\n📅 {} в {}",
                    icon, a.id, from, to, a.client, a.date, a.start_time
                )
            }
            Notification::VoucherRedeemed(r) => {
                let amount = match r.delta {
                    RedemptionDelta::Value(v) => format!("{} ₽", v),
                    RedemptionDelta::Sessions(s) => format!("{} сеанс(ов)", s),
                };
                format!(
                    "🎁 Списание по сертификату <code>{}</code>: {}",
                    r.voucher_code, amount
                )
            }
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Sends notifications to an admin chat via the Telegram Bot API.
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: i64,
    http: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot_token,
            chat_id,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        self.http
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": notification.render(),
                "parse_mode": "HTML"
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Writes notifications to the log only. Used when no chat is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(text = %notification.render(), "notification");
        Ok(())
    }
}

/// Deliver in the background. Failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::error!("Failed to send notification: {}", e);
        }
    });
}

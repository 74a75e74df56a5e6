//! Webhook 通知 (HTTP POST JSON)

use std::env;
use std::time::Duration;

use serde_json::json;

use super::{Callback, RateLimiter};
use crate::config::WebhookConfig;

/// 未配置 url 时读取的环境变量
pub const WEBHOOK_URL_ENV: &str = "MOTION_WEBHOOK_URL";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    agent: ureq::Agent,
    url: String,
    message: String,
    limiter: RateLimiter,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, message: impl Into<String>, cooldown: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            url: url.into(),
            message: message.into(),
            limiter: RateLimiter::new(cooldown),
        }
    }

    /// 配置中的 url 优先, 其次是环境变量; 都没有则返回 None
    pub fn from_config(config: &WebhookConfig) -> Option<Self> {
        let url = config
            .url
            .clone()
            .or_else(|| env::var(WEBHOOK_URL_ENV).ok())
            .filter(|u| !u.trim().is_empty())?;
        Some(Self::new(
            url,
            config.message.clone(),
            Duration::from_secs(config.cooldown_secs),
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts one notification unless the cooldown is still running.
    ///
    /// Returns `Ok(false)` when the call was suppressed by the rate limiter.
    pub fn notify(&self) -> anyhow::Result<bool> {
        if !self.limiter.try_acquire() {
            log::debug!("通知冷却中, 跳过");
            return Ok(false);
        }
        let body = payload(&self.message, &crate::gen_time_string("-"));
        self.agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())?;
        log::info!("已发送运动通知 → {}", self.url);
        Ok(true)
    }

    /// Wraps the notifier as a detection callback; send failures are logged, not raised.
    pub fn into_callback(self) -> Callback {
        Box::new(move || {
            if let Err(e) = self.notify() {
                log::warn!("运动通知发送失败: {:#}", e);
            }
        })
    }
}

fn payload(message: &str, timestamp: &str) -> serde_json::Value {
    json!({
        "event": "motion",
        "message": message,
        "timestamp": timestamp,
    })
}

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::ChannelCacheRegistry;

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub services: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub message: Option<String>,
}

pub struct HealthChecker {
    discord_ready: Arc<Mutex<bool>>,
    backfill_done: Arc<Mutex<bool>>,
    registry: Arc<ChannelCacheRegistry>,
}

impl HealthChecker {
    pub fn new(registry: Arc<ChannelCacheRegistry>) -> Self {
        Self {
            discord_ready: Arc::new(Mutex::new(false)),
            backfill_done: Arc::new(Mutex::new(false)),
            registry,
        }
    }

    pub async fn mark_discord_ready(&self, ready: bool) {
        *self.discord_ready.lock().await = ready;
    }

    pub async fn mark_backfill_done(&self) {
        *self.backfill_done.lock().await = true;
    }

    pub async fn check_discord(&self) -> ServiceHealth {
        if *self.discord_ready.lock().await {
            ServiceHealth {
                status: "healthy".to_string(),
                message: Some("Gateway connected".to_string()),
            }
        } else {
            ServiceHealth {
                status: "unhealthy".to_string(),
                message: Some("Waiting for gateway ready".to_string()),
            }
        }
    }

    pub async fn check_cache(&self) -> ServiceHealth {
        let stats = self.registry.stats().await;
        let message = Some(format!(
            "{} channels, {} messages cached",
            stats.channels, stats.messages
        ));

        // Quotes still work off live fetches until the backfill lands.
        let status = if *self.backfill_done.lock().await {
            "healthy"
        } else {
            "warming"
        };
        ServiceHealth {
            status: status.to_string(),
            message,
        }
    }

    pub async fn get_overall_health(&self) -> HealthStatus {
        let mut services = HashMap::new();
        services.insert("discord".to_string(), self.check_discord().await);
        services.insert("cache".to_string(), self.check_cache().await);

        let all_healthy = services.values().all(|service| service.status == "healthy");
        let overall_status = if all_healthy { "healthy" } else { "degraded" };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
        }
    }
}

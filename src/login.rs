use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{EventBus, StatusEvent};
use crate::models::LoginResult;
use crate::utils::{truncate, unix_now, unix_now_millis};

/// Sentinel status for attempts that never produced an HTTP response.
pub const STATUS_NO_RESPONSE: i32 = -1;

const USER_AGENT: &str = "Mozilla/5.0";
const BODY_KEEP: usize = 1024;
const MESSAGE_KEEP: usize = 256;
const URL_LOG_KEEP: usize = 150;

/// One authentication attempt against the portal.
#[async_trait]
pub trait Login: Send + Sync {
    async fn login(&self, cfg: &Config) -> LoginResult;
}

pub struct LoginClient {
    http: Client,
    bus: EventBus,
}

impl LoginClient {
    pub fn new(bus: EventBus) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, bus })
    }

    fn build_url(cfg: &Config) -> String {
        let scheme = if cfg.use_https { "https" } else { "http" };
        format!("{}://{}{}", scheme, cfg.login_ip, cfg.login_path)
    }
}

#[async_trait]
impl Login for LoginClient {
    async fn login(&self, cfg: &Config) -> LoginResult {
        let url = Self::build_url(cfg);
        let mut params = cfg.params.clone();
        // cache-buster the portal's own login page appends
        params.insert("v".into(), (unix_now_millis() % 10_000).to_string());

        let request = if cfg.method.eq_ignore_ascii_case("GET") {
            self.http.get(&url).query(&params)
        } else {
            self.http.post(&url).form(&params)
        };
        info!(
            "login attempt: {} {} with {} parameters",
            cfg.method.to_uppercase(),
            truncate(&url, URL_LOG_KEEP),
            params.len()
        );

        let result = match request
            .timeout(Duration::from_secs(cfg.login_timeout_sec))
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16() as i32;
                // a 2xx only counts once the whole body made it over the wire
                match response.text().await {
                    Ok(body) => {
                        let success = (200..=299).contains(&status)
                            && cfg
                                .success_marker()
                                .map_or(true, |marker| body.contains(marker));
                        LoginResult {
                            success,
                            status,
                            body: Some(truncate(&body, BODY_KEEP).to_string()),
                            error: None,
                        }
                    }
                    Err(e) => transport_failure(e),
                }
            }
            Err(e) => transport_failure(e),
        };

        let message = match (&result.error, &result.body) {
            (Some(e), _) => truncate(e, MESSAGE_KEEP).to_string(),
            (None, Some(b)) => truncate(b, MESSAGE_KEEP).to_string(),
            (None, None) => String::new(),
        };
        self.bus.emit(StatusEvent::LoginStatus {
            success: result.success,
            status: result.status,
            message,
            timestamp: unix_now(),
        });

        if result.success {
            info!(status = result.status, "login succeeded");
        } else {
            warn!(
                status = result.status,
                error = result.error.as_deref().unwrap_or(""),
                "login failed"
            );
        }
        result
    }
}

fn transport_failure(e: reqwest::Error) -> LoginResult {
    let error = if e.is_timeout() {
        "timeout".to_string()
    } else {
        e.to_string()
    };
    LoginResult {
        success: false,
        status: STATUS_NO_RESPONSE,
        body: None,
        error: Some(error),
    }
}

//! Terminal-management API client.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use punchsync_core::TerminalGateway;
use punchsync_domain::constants::DEVICE_PAGE_SIZE;
use punchsync_domain::{DeviceLookup, PunchSyncError, RemoteDevice, Result, TerminalConfig};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::session::TerminalSession;
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Dates in terminal API query strings are month-first.
const TERMINAL_DATE_FORMAT: &str = "%m/%d/%Y";

/// Authenticated client for the terminal-management platform.
pub struct TerminalClient {
    http: HttpClient,
    base_url: String,
    email: String,
    password: String,
    session: TerminalSession,
}

impl TerminalClient {
    pub fn new(config: &TerminalConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            password: config.password.clone(),
            session: TerminalSession::new(Duration::from_secs(config.session_ttl_secs)),
        }
    }

    async fn login(&self) -> Result<String> {
        let body = json!({ "email": self.email, "password": self.password });
        let request =
            self.http.request(Method::POST, format!("{}/login", self.base_url)).json(&body);

        let response = self.http.send(request).await?;
        if !response.status().is_success() {
            return Err(PunchSyncError::Auth(format!(
                "terminal login failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        let login: LoginResponse = response.json().await.map_err(map_http_error)?;
        debug!("terminal login succeeded");
        Ok(login.access_token)
    }

    async fn bearer_token(&self) -> Result<String> {
        self.session.ensure(|| self.login()).await
    }

    /// Send an authenticated GET; a 401 drops the cached session.
    async fn get_authed(&self, url: String) -> Result<reqwest::Response> {
        let token = self.bearer_token().await?;
        let request = self.http.request(Method::GET, &url).bearer_auth(&token);
        let response = self.http.send(request).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
            return Err(PunchSyncError::Auth(
                "terminal session was rejected, re-authentication required".into(),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl TerminalGateway for TerminalClient {
    async fn ensure_session(&self) -> Result<()> {
        self.bearer_token().await.map(|_| ())
    }

    async fn find_devices(&self, device_ids: &[i64]) -> Result<DeviceLookup> {
        if device_ids.is_empty() {
            return Ok(DeviceLookup::default());
        }

        let targets: HashSet<i64> = device_ids.iter().copied().collect();
        let mut found: HashSet<i64> = HashSet::new();
        let mut lookup = DeviceLookup::default();
        let mut start = 0usize;

        loop {
            let url = format!(
                "{}/device?start={}&length={}",
                self.base_url, start, DEVICE_PAGE_SIZE
            );
            let response = self
                .get_authed(url)
                .await?
                .error_for_status()
                .map_err(map_http_error)?;
            let page: DevicePage = response.json().await.map_err(map_http_error)?;

            let page_len = page.records.len();
            debug!(start, page_len, total = page.total_records, "device page fetched");

            for device in page.records {
                if targets.contains(&device.id) && found.insert(device.id) {
                    if device.is_healthy() {
                        lookup.healthy.push(device);
                    } else {
                        warn!(
                            device_id = device.id,
                            device_name = %device.name,
                            status = %device.status,
                            "device reported unhealthy by the terminal platform"
                        );
                        lookup.unhealthy.push(device);
                    }
                }
            }

            if found.len() == targets.len() || page_len == 0 {
                break;
            }
            start += page_len;
            if start >= page.total_records {
                break;
            }
        }

        for missing in targets.difference(&found) {
            warn!(device_id = missing, "device never appeared in the remote catalog");
        }

        Ok(lookup)
    }

    async fn download_afd(&self, device_id: i64, date: NaiveDate) -> Result<String> {
        let bound = date.format(TERMINAL_DATE_FORMAT).to_string();
        let url = format!(
            "{}/report/afd/download?idEquipamento={}&dataIni={}&dataFinal={}",
            self.base_url, device_id, bound, bound
        );

        let response = self
            .get_authed(url)
            .await?
            .error_for_status()
            .map_err(map_http_error)?;
        response.text().await.map_err(map_http_error)
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DevicePage {
    records: Vec<RemoteDevice>,
    #[serde(rename = "totalRecords")]
    total_records: usize,
}

fn map_http_error(err: reqwest::Error) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}

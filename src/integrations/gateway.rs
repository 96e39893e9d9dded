//! Matchmaking directory over an HTTP gateway.
//!
//! The gateway wraps the game's matchmaking SDK:
//! - `GET  {url}/lobbies?appId=..&distance=worldwide&maxResults=..&filter=maxP>1`
//! - `POST {url}/lobbies/{id}/join` returns the member list
//! - `POST {url}/lobbies/{id}/leave`

use crate::config::DirectoryConfig;
use crate::directory::{Directory, LobbyFilter, LobbyMember, RawLobby};
use crate::integrations::HTTP_CLIENT;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpDirectory {
    base_url: String,
    app_id: u32,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            app_id: config.app_id,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn lobby_url(&self, lobby_id: &str, action: &str) -> String {
        format!(
            "{}/lobbies/{}/{}",
            self.base_url,
            urlencoding::encode(lobby_id),
            action
        )
    }
}

/// Query parameters for a filter, in the gateway's `key<op>value` form
pub fn filter_params(app_id: u32, filter: &LobbyFilter) -> Vec<(String, String)> {
    let mut params = vec![
        ("appId".to_string(), app_id.to_string()),
        ("maxResults".to_string(), filter.max_results.to_string()),
    ];
    if filter.worldwide {
        params.push(("distance".to_string(), "worldwide".to_string()));
    }
    for condition in &filter.conditions {
        params.push((
            "filter".to_string(),
            format!(
                "{}{}{}",
                condition.key,
                condition.comparison.symbol(),
                condition.value
            ),
        ));
    }
    params
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn query(&self, filter: &LobbyFilter) -> Result<Vec<RawLobby>> {
        let response = HTTP_CLIENT
            .get(format!("{}/lobbies", self.base_url))
            .query(&filter_params(self.app_id, filter))
            .timeout(self.timeout)
            .send()
            .await
            .context("Directory query failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Directory query returned {}", response.status());
        }

        let mut lobbies: Vec<RawLobby> = response
            .json()
            .await
            .context("Failed to parse directory response")?;
        lobbies.truncate(filter.max_results);
        Ok(lobbies)
    }

    async fn join(&self, lobby_id: &str) -> Result<Vec<LobbyMember>> {
        let response = HTTP_CLIENT
            .post(self.lobby_url(lobby_id, "join"))
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to join lobby {}", lobby_id))?;

        if !response.status().is_success() {
            anyhow::bail!("Joining lobby {} returned {}", lobby_id, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse members of lobby {}", lobby_id))
    }

    async fn leave(&self, lobby_id: &str) -> Result<()> {
        let response = HTTP_CLIENT
            .post(self.lobby_url(lobby_id, "leave"))
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to leave lobby {}", lobby_id))?;

        if !response.status().is_success() {
            anyhow::bail!("Leaving lobby {} returned {}", lobby_id, response.status());
        }
        Ok(())
    }
}

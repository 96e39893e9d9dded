//! Chat surface over a Discord-compatible REST API.
//!
//! Views and notices are sent as single-embed messages. Status codes map to
//! [`SurfaceError`]: 404 and 403 mean the target is gone, everything else is
//! transient.

use crate::config::SurfaceConfig;
use crate::data::MessageLocator;
use crate::integrations::HTTP_CLIENT;
use crate::surface::{ChatSurface, Notice, RenderedView, SurfaceError, SurfaceResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

const EMBED_COLOR: u32 = 0x2b6cb0;

pub struct DiscordSurface {
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
    channel_id: String,
}

impl DiscordSurface {
    pub fn new(config: &SurfaceConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        HTTP_CLIENT
            .request(method, format!("{}{}", self.api_url, path))
            .header("Authorization", format!("Bot {}", self.token))
            .header("User-Agent", "lobby-relay")
    }

    async fn send(&self, request: reqwest::RequestBuilder, target: &str) -> SurfaceResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| SurfaceError::Transient(format!("{}: {}", target, e)))?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            403 | 404 => Err(SurfaceError::NotFound(format!("{} ({})", target, status))),
            _ => Err(SurfaceError::Transient(format!("{} returned {}", target, status))),
        }
    }
}

/// Embed payload for a rendered view
pub fn view_embed(view: &RenderedView) -> Value {
    let fields: Vec<Value> = view
        .blocks
        .iter()
        .map(|b| json!({ "name": b.heading, "value": b.body, "inline": false }))
        .collect();

    json!({
        "title": view.title,
        "color": EMBED_COLOR,
        "fields": fields,
        "footer": { "text": view.footer },
    })
}

fn notice_embed(notice: &Notice) -> Value {
    json!({
        "title": notice.title,
        "description": notice.body,
        "color": EMBED_COLOR,
    })
}

#[async_trait]
impl ChatSurface for DiscordSurface {
    async fn resolve_scope(&self, scope_id: &str) -> SurfaceResult<()> {
        let path = format!("/guilds/{}", scope_id);
        self.send(self.request(reqwest::Method::GET, &path), &format!("guild {}", scope_id))
            .await?;
        Ok(())
    }

    async fn create_view(
        &self,
        destination_id: &str,
        view: &RenderedView,
    ) -> SurfaceResult<MessageLocator> {
        let path = format!("/channels/{}/messages", destination_id);
        let request = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "embeds": [view_embed(view)] }));

        let response = self
            .send(request, &format!("channel {}", destination_id))
            .await?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| SurfaceError::Transient(format!("bad create response: {}", e)))?;

        Ok(MessageLocator {
            channel_id: created.channel_id,
            message_id: created.id,
        })
    }

    async fn edit_view(&self, locator: &MessageLocator, view: &RenderedView) -> SurfaceResult<()> {
        let path = format!(
            "/channels/{}/messages/{}",
            locator.channel_id, locator.message_id
        );
        let request = self
            .request(reqwest::Method::PATCH, &path)
            .json(&json!({ "embeds": [view_embed(view)] }));

        self.send(request, &format!("message {}", locator.message_id))
            .await?;
        Ok(())
    }

    async fn send_notice(&self, destination_id: &str, notice: &Notice) -> SurfaceResult<()> {
        let path = format!("/channels/{}/messages", destination_id);
        let request = self
            .request(reqwest::Method::POST, &path)
            .json(&json!({ "embeds": [notice_embed(notice)] }));

        self.send(request, &format!("channel {}", destination_id))
            .await?;
        Ok(())
    }
}

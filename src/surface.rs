//! The external chat surface displays and notices are delivered to.
//!
//! Implementations only translate these calls to their API; all repair
//! decisions (clearing stale locators, dropping orphaned bindings) are made by
//! the callers based on [`SurfaceError`].

use crate::data::{MessageLocator, PresenceSighting};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The target (scope, channel or message) no longer resolves
    #[error("not found: {0}")]
    NotFound(String),
    /// Anything that may succeed on a later attempt
    #[error("transient failure: {0}")]
    Transient(String),
}

pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

/// One per-session block of a rendered view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewBlock {
    pub heading: String,
    pub body: String,
}

/// A rendered live status view for one version track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub title: String,
    pub blocks: Vec<ViewBlock>,
    pub footer: String,
}

/// A one-shot notice, e.g. a presence alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn arrival(sighting: &PresenceSighting) -> Self {
        let session = if sighting.session_name.trim().is_empty() {
            crate::data::ANONYMOUS_LOBBY
        } else {
            &sighting.session_name
        };
        Self {
            title: format!("{} is online", sighting.display_name),
            body: format!(
                "{} joined **{}** flying {}",
                sighting.display_name, session, sighting.scenario_name
            ),
        }
    }
}

#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Check that the owning scope (guild/workspace) still exists
    async fn resolve_scope(&self, scope_id: &str) -> SurfaceResult<()>;

    async fn create_view(
        &self,
        destination_id: &str,
        view: &RenderedView,
    ) -> SurfaceResult<MessageLocator>;

    /// Edit a previously created view in place
    async fn edit_view(&self, locator: &MessageLocator, view: &RenderedView) -> SurfaceResult<()>;

    async fn send_notice(&self, destination_id: &str, notice: &Notice) -> SurfaceResult<()>;
}

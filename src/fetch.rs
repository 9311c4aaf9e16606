//! Delivery of archived media to a chat.
//!
//! Stored media-reference tokens expire or get invalidated, so delivery walks
//! a fixed chain: send the stored token, re-resolve it and send again, copy
//! the original post from its source chat, forward that post. The first
//! strategy that succeeds ends the walk. A failing strategy is logged and the
//! next one is tried; only running out of strategies is reported.

use async_trait::async_trait;
use log::{debug, warn};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};

pub use crate::catalog::MediaKind;
use crate::catalog::Video;
use crate::error::GatewayError;

const TOKEN_PREVIEW_CHARS: usize = 20;
const CAPTION_LIMIT: usize = 1024;

/// The chat-platform calls delivery depends on.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    async fn send_by_reference(
        &self,
        chat: ChatId,
        file_id: &str,
        kind: MediaKind,
        caption: &str,
    ) -> Result<(), GatewayError>;

    /// Ask the platform for the current file info of a token. Returns the
    /// token the platform reports back.
    async fn resolve_file(&self, file_id: &str) -> Result<String, GatewayError>;

    async fn copy_from_source(
        &self,
        chat: ChatId,
        from_chat: ChatId,
        message: MessageId,
        caption: &str,
    ) -> Result<(), GatewayError>;

    async fn forward_from_source(
        &self,
        chat: ChatId,
        from_chat: ChatId,
        message: MessageId,
    ) -> Result<(), GatewayError>;
}

/// [`MediaGateway`] backed by the Bot API.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MediaGateway for TelegramGateway {
    async fn send_by_reference(
        &self,
        chat: ChatId,
        file_id: &str,
        kind: MediaKind,
        caption: &str,
    ) -> Result<(), GatewayError> {
        let file = InputFile::file_id(file_id.to_string());
        match kind {
            MediaKind::Video => {
                self.bot.send_video(chat, file).caption(caption).await?;
            }
            MediaKind::Document => {
                self.bot.send_document(chat, file).caption(caption).await?;
            }
        }
        Ok(())
    }

    async fn resolve_file(&self, file_id: &str) -> Result<String, GatewayError> {
        let file = self.bot.get_file(file_id.to_string()).await?;
        Ok(file.meta.id.to_string())
    }

    async fn copy_from_source(
        &self,
        chat: ChatId,
        from_chat: ChatId,
        message: MessageId,
        caption: &str,
    ) -> Result<(), GatewayError> {
        self.bot
            .copy_message(chat, from_chat, message)
            .caption(caption)
            .await?;
        Ok(())
    }

    async fn forward_from_source(
        &self,
        chat: ChatId,
        from_chat: ChatId,
        message: MessageId,
    ) -> Result<(), GatewayError> {
        self.bot.forward_message(chat, from_chat, message).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    StoredReference,
    ResolvedReference,
    CopySource,
    ForwardSource,
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::StoredReference => "stored reference",
            Strategy::ResolvedReference => "resolved reference",
            Strategy::CopySource => "copy from source",
            Strategy::ForwardSource => "forward from source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Delivered(Strategy),
    /// Every applicable strategy failed. `attempts` lists the ones tried.
    Exhausted { attempts: Vec<Strategy> },
}

impl FetchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FetchOutcome::Delivered(_))
    }
}

pub struct FetchResolver<G> {
    gateway: G,
    fallback_source_chat: Option<ChatId>,
}

impl<G: MediaGateway> FetchResolver<G> {
    /// `fallback_source_chat` stands in for records that carry no source chat.
    pub fn new(gateway: G, fallback_source_chat: Option<ChatId>) -> Self {
        Self {
            gateway,
            fallback_source_chat,
        }
    }

    pub async fn deliver(&self, video: &Video, chat: ChatId) -> FetchOutcome {
        let caption = delivery_caption(video);
        let mut attempts = Vec::new();

        if let Some(file_id) = video.file_id.as_deref().filter(|id| !id.is_empty()) {
            let kind = video.media_kind;

            attempts.push(Strategy::StoredReference);
            match self.gateway.send_by_reference(chat, file_id, kind, &caption).await {
                Ok(()) => return self.delivered(video, Strategy::StoredReference),
                Err(e) => warn!("Video {}: stored reference failed: {e}", video.id),
            }

            attempts.push(Strategy::ResolvedReference);
            let resolved = match self.gateway.resolve_file(file_id).await {
                Ok(resolved) => self.gateway.send_by_reference(chat, &resolved, kind, &caption).await,
                Err(e) => Err(e),
            };
            match resolved {
                Ok(()) => return self.delivered(video, Strategy::ResolvedReference),
                Err(e) => warn!("Video {}: resolved reference failed: {e}", video.id),
            }
        }

        if let Some((from_chat, message)) = self.source_of(video) {
            attempts.push(Strategy::CopySource);
            match self.gateway.copy_from_source(chat, from_chat, message, &caption).await {
                Ok(()) => return self.delivered(video, Strategy::CopySource),
                Err(e) => warn!("Video {}: copy from {from_chat} failed: {e}", video.id),
            }

            attempts.push(Strategy::ForwardSource);
            match self.gateway.forward_from_source(chat, from_chat, message).await {
                Ok(()) => return self.delivered(video, Strategy::ForwardSource),
                Err(e) => warn!("Video {}: forward from {from_chat} failed: {e}", video.id),
            }
        }

        warn!(
            "Video {}: delivery exhausted after {} attempt(s)",
            video.id,
            attempts.len()
        );
        FetchOutcome::Exhausted { attempts }
    }

    fn delivered(&self, video: &Video, strategy: Strategy) -> FetchOutcome {
        debug!("Video {} delivered via {}", video.id, strategy.label());
        FetchOutcome::Delivered(strategy)
    }

    /// Source chat and message of the original post, when both are usable.
    fn source_of(&self, video: &Video) -> Option<(ChatId, MessageId)> {
        let message = video
            .message_id
            .filter(|id| *id > 0)
            .and_then(|id| i32::try_from(id).ok())?;
        let chat = video
            .chat_id
            .filter(|id| *id != 0)
            .map(ChatId)
            .or(self.fallback_source_chat)?;
        Some((chat, MessageId(message)))
    }
}

fn delivery_caption(video: &Video) -> String {
    let mut caption = format!("🎬 {}", video.display_title());
    if let Some(path) = &video.category_path {
        caption.push_str(&format!("\n📁 {path}"));
    }
    caption.chars().take(CAPTION_LIMIT).collect()
}

/// Text shown to a user when nothing could be delivered.
pub fn failure_notice() -> &'static str {
    "❌ Sorry, this video is not available right now. Please try again later."
}

/// Details for administrators investigating a failed delivery.
pub fn admin_diagnostic(video: &Video, outcome: &FetchOutcome) -> String {
    let token = match video.file_id.as_deref() {
        Some(token) if token.chars().count() > TOKEN_PREVIEW_CHARS => {
            let preview: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
            format!("{preview}...")
        }
        Some(token) if !token.is_empty() => token.to_string(),
        _ => "none".to_string(),
    };
    let tried = match outcome {
        FetchOutcome::Exhausted { attempts } if !attempts.is_empty() => attempts
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", "),
        FetchOutcome::Exhausted { .. } => "nothing applicable".to_string(),
        FetchOutcome::Delivered(strategy) => strategy.label().to_string(),
    };

    format!(
        "🔧 Delivery diagnostic\n\
         Record: {}\n\
         Source chat: {}\n\
         Source message: {}\n\
         Token: {token}\n\
         Tried: {tried}",
        video.id,
        video.chat_id.map_or("none".to_string(), |id| id.to_string()),
        video.message_id.map_or("none".to_string(), |id| id.to_string()),
    )
}

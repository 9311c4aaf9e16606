//! Telegram surface: commands, callback buttons, text input and archiving.

pub mod admin;
pub mod keyboards;
pub mod user;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, MessageId, UpdateKind, User};
use teloxide::utils::command::BotCommands;

use crate::catalog::{self, Catalog};
use crate::config::Config;
use crate::rate_limit::{RateLimiter, Verdict};

pub use keyboards::CallbackAction;

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;
pub type SessionDialogue = Dialogue<SessionState, InMemStorage<SessionState>>;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "open the main menu.")]
    Start,
    #[command(description = "display this help message.")]
    Help,
    #[command(description = "search the archive, e.g. /search dragon")]
    Search(String),
    #[command(description = "cancel the current input.")]
    Cancel,
    #[command(description = "open the admin panel.")]
    Admin,
    #[command(description = "admin: /assign <category_id> <video_id>...")]
    Assign(String),
    #[command(description = "admin: /purge <video_id>...")]
    Purge(String),
}

/// What the next plain text message of a chat means.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingSearch {
        category_id: Option<i64>,
    },
    AwaitingCategoryName {
        parent_id: Option<i64>,
    },
    AwaitingCategoryRename {
        category_id: i64,
    },
    AwaitingBroadcast,
}

/// Text plus keyboard, shown either as a new message or in place of an old one.
pub struct Screen {
    pub text: String,
    pub keyboard: InlineKeyboardMarkup,
}

impl Screen {
    pub fn new(text: impl Into<String>, keyboard: InlineKeyboardMarkup) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Target {
    New(ChatId),
    Edit(ChatId, MessageId),
}

impl Target {
    pub fn chat(self) -> ChatId {
        match self {
            Target::New(chat) | Target::Edit(chat, _) => chat,
        }
    }
}

pub async fn show(bot: &Bot, target: Target, screen: Screen) -> HandlerResult {
    if let Target::Edit(chat, message) = target {
        match bot
            .edit_message_text(chat, message, screen.text.clone())
            .reply_markup(screen.keyboard.clone())
            .await
        {
            Ok(_) => return Ok(()),
            // Media messages and unchanged texts cannot be edited.
            Err(e) => debug!("Edit of message {} in {chat} failed, sending anew: {e}", message.0),
        }
    }

    bot.send_message(target.chat(), screen.text)
        .reply_markup(screen.keyboard)
        .await?;
    Ok(())
}

/// Log a failed catalog call and carry on with an empty value.
pub(crate) fn degrade<T: Default>(result: catalog::Result<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        error!("Catalog call {what} failed: {e}");
        T::default()
    })
}

/// Integers in `text`, in order. Anything that is not a number is skipped.
pub(crate) fn parse_ids(text: &str) -> Vec<i64> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|part| part.parse().ok())
        .collect()
}

pub fn schema() -> UpdateHandler<Box<dyn Error + Send + Sync + 'static>> {
    let command_handler = teloxide::filter_command::<Command, _>().endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.video().is_some() || msg.document().is_some())
                .endpoint(admin::archive_media),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text));

    let callback_handler = Update::filter_callback_query().endpoint(handle_callback);

    dptree::entry()
        .branch(dptree::filter_map_async(throttled).endpoint(reject_throttled))
        .branch(
            dptree::entry()
                .inspect_async(track_user)
                .branch(
                    dialogue::enter::<Update, InMemStorage<SessionState>, SessionState, _>()
                        .branch(message_handler)
                        .branch(callback_handler),
                )
                .branch(Update::filter_inline_query().endpoint(user::handle_inline_query)),
        )
}

/// Set for an update whose sender has used up their budget.
#[derive(Debug, Clone, Copy)]
struct Throttled {
    retry_after: Duration,
}

async fn throttled(upd: Update, limiter: RateLimiter) -> Option<Throttled> {
    let user = upd.from()?;
    match limiter.check(user.id).await {
        Verdict::Throttled { retry_after } => {
            debug!("Dropping update from throttled user {}", user.id);
            Some(Throttled { retry_after })
        }
        Verdict::Allowed | Verdict::Exempt => None,
    }
}

/// Throttled updates are dropped. A button press still gets an answer so
/// the client stops waiting on it.
async fn reject_throttled(bot: Bot, upd: Update, throttled: Throttled) -> HandlerResult {
    if let UpdateKind::CallbackQuery(q) = &upd.kind {
        let seconds = throttled.retry_after.as_secs().max(1);
        bot.answer_callback_query(&q.id)
            .text(format!("⏳ Slow down, try again in {seconds} s."))
            .show_alert(true)
            .await?;
    }
    Ok(())
}

async fn track_user(upd: Update, catalog: Catalog) {
    let Some(user) = upd.from() else {
        return;
    };
    if let Err(e) = catalog
        .upsert_user(
            user_key(user),
            user.username.as_deref(),
            Some(user.first_name.as_str()),
            user.last_name.as_deref(),
        )
        .await
    {
        warn!("Could not record user {}: {e}", user.id);
    }
}

/// Telegram user ids fit comfortably in an SQLite integer.
pub(crate) fn user_key(user: &User) -> i64 {
    user.id.0 as i64
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: SessionDialogue,
    catalog: Catalog,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let target = Target::New(msg.chat.id);
    let is_admin = config.is_admin(user.id);

    match cmd {
        Command::Start => {
            dialogue.reset().await?;
            show(&bot, target, user::welcome_screen(&user, is_admin)).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Search(query) => {
            dialogue.reset().await?;
            if query.trim().is_empty() {
                dialogue.update(SessionState::AwaitingSearch { category_id: None }).await?;
                show(&bot, target, user::search_prompt(None)).await?;
            } else {
                show(&bot, target, user::search_screen(&catalog, &query, None).await).await?;
            }
        }
        Command::Cancel => {
            dialogue.reset().await?;
            show(&bot, target, user::cancelled_screen(is_admin)).await?;
        }
        Command::Admin => {
            if !is_admin {
                bot.send_message(msg.chat.id, admin::DENIED).await?;
                return Ok(());
            }
            show(&bot, target, admin::panel_screen(&catalog).await).await?;
        }
        Command::Assign(args) => {
            if !is_admin {
                bot.send_message(msg.chat.id, admin::DENIED).await?;
                return Ok(());
            }
            let reply = admin::assign_command(&bot, &catalog, &config, &user, &args).await;
            bot.send_message(msg.chat.id, reply).await?;
        }
        Command::Purge(args) => {
            if !is_admin {
                bot.send_message(msg.chat.id, admin::DENIED).await?;
                return Ok(());
            }
            let reply = admin::purge_command(&bot, &catalog, &config, &user, &args).await;
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    dialogue: SessionDialogue,
    state: SessionState,
    catalog: Catalog,
    config: Arc<Config>,
) -> HandlerResult {
    let (Some(user), Some(text)) = (msg.from.clone(), msg.text()) else {
        return Ok(());
    };
    let target = Target::New(msg.chat.id);
    let is_admin = config.is_admin(user.id);

    match state {
        SessionState::Idle => {
            show(&bot, target, user::quick_search(&catalog, text, is_admin).await).await?;
        }
        SessionState::AwaitingSearch { category_id } => {
            dialogue.reset().await?;
            show(&bot, target, user::search_screen(&catalog, text, category_id).await).await?;
        }
        // Admin inputs. The state can only be entered by an admin, but the
        // admin list may have changed since.
        _ if !is_admin => {
            dialogue.reset().await?;
            bot.send_message(msg.chat.id, admin::DENIED).await?;
        }
        SessionState::AwaitingCategoryName { parent_id } => {
            dialogue.reset().await?;
            let screen = admin::create_category(&bot, &catalog, &config, &user, text, parent_id).await;
            show(&bot, target, screen).await?;
        }
        SessionState::AwaitingCategoryRename { category_id } => {
            dialogue.reset().await?;
            let screen = admin::rename_category(&bot, &catalog, &config, &user, category_id, text).await;
            show(&bot, target, screen).await?;
        }
        SessionState::AwaitingBroadcast => {
            dialogue.reset().await?;
            bot.send_message(msg.chat.id, "📣 Broadcasting...").await?;
            let screen = admin::broadcast(&bot, &catalog, &config, &user, text).await;
            show(&bot, target, screen).await?;
        }
    }
    Ok(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: SessionDialogue,
    catalog: Catalog,
    config: Arc<Config>,
) -> HandlerResult {
    let Some(data) = q.data.as_deref() else {
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };
    let action: CallbackAction = match data.parse() {
        Ok(action) => action,
        Err(e) => {
            warn!("{e} from user {}", q.from.id);
            bot.answer_callback_query(&q.id).text("This button has expired.").await?;
            return Ok(());
        }
    };

    let is_admin = config.is_admin(q.from.id);
    if action.is_admin_only() && !is_admin {
        bot.answer_callback_query(&q.id)
            .text(admin::DENIED)
            .show_alert(true)
            .await?;
        return Ok(());
    }

    bot.answer_callback_query(&q.id).await?;

    // Pending text input only survives the button that asked for it.
    if !action.awaits_input() {
        dialogue.reset().await?;
    }

    let target = match &q.message {
        Some(message) => Target::Edit(message.chat().id, message.id()),
        None => Target::New(ChatId::from(q.from.id)),
    };

    if action.is_admin_only() {
        admin::handle_action(&bot, action, target, &dialogue, &catalog, &config, &q.from).await
    } else {
        user::handle_action(&bot, action, target, &dialogue, &catalog, &config, &q.from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MediaKind, NewVideo, ParentScope};
    use teloxide::dptree::deps;
    use teloxide::types::UserId;
    use teloxide_tests::{
        MockBot, MockCallbackQuery, MockMessageText, MockMessageVideo, MockUser, MockVideo,
    };

    /// Everything the schema is dispatched with, kept around for inspection.
    struct Harness {
        catalog: Catalog,
        config: Config,
        limiter: RateLimiter,
    }

    impl Harness {
        async fn new(config: Config) -> Self {
            Self {
                catalog: Catalog::in_memory().await.unwrap(),
                limiter: RateLimiter::from_config(&config),
                config,
            }
        }

        /// The mock user is an admin.
        async fn admin() -> Self {
            Self::new(Config {
                admin_ids: vec![UserId(MockUser::ID)],
                ..Config::default()
            })
            .await
        }

        fn deps(&self) -> teloxide::dptree::di::DependencyMap {
            deps![
                self.catalog.clone(),
                Arc::new(self.config.clone()),
                InMemStorage::<SessionState>::new(),
                self.limiter.clone()
            ]
        }

        async fn use_up_budget(&self) {
            while self.limiter.check(UserId(MockUser::ID)).await == Verdict::Allowed {}
        }
    }

    fn stranger() -> teloxide::types::User {
        MockUser::new().id(555).first_name("Stranger").build()
    }

    #[tokio::test]
    async fn start_shows_the_menu() {
        let harness = Harness::new(Config::default()).await;
        let bot = MockBot::new(MockMessageText::new().text("/start"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        let responses = bot.get_responses();
        let message = responses.sent_messages.last().unwrap();
        assert!(message.text().unwrap().contains("video archive"));
        assert!(harness.catalog.get_user(MockUser::ID as i64).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn admin_panel_is_denied_to_users() {
        let harness = Harness::new(Config::default()).await;
        let bot = MockBot::new(MockMessageText::new().text("/admin"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        let responses = bot.get_responses();
        let message = responses.sent_messages.last().unwrap();
        assert_eq!(message.text(), Some(admin::DENIED));
    }

    #[tokio::test]
    async fn admin_video_is_archived_uncategorized() {
        let harness = Harness::admin().await;
        let post = MockMessageVideo::new()
            .caption("مسلسل Night Shift الموسم 2 الحلقة 4")
            .video(MockVideo::new().file_name("night.shift.mp4").build());
        let bot = MockBot::new(post, schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        let stored = harness.catalog.recent_videos(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        let video = &stored[0];
        assert_eq!(video.category_id, None);
        assert_eq!(video.chat_id, Some(MockUser::ID as i64));
        assert!(video.message_id.is_some());
        assert_eq!(video.file_id.as_deref(), Some(MockVideo::FILE_ID));
        assert_eq!(video.media_kind, MediaKind::Video);
        assert_eq!(video.grouping_key.as_deref(), Some("series-night-shift-s2"));

        let responses = bot.get_responses();
        let reply = responses.sent_messages.last().unwrap();
        assert!(reply.text().unwrap().starts_with("✅ Archived as #"));
    }

    #[tokio::test]
    async fn media_from_users_is_ignored() {
        let harness = Harness::admin().await;
        let bot = MockBot::new(MockMessageVideo::new().from(stranger()), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        assert!(harness.catalog.recent_videos(10).await.unwrap().is_empty());
        assert!(bot.get_responses().sent_messages.is_empty());
    }

    #[tokio::test]
    async fn throttled_messages_are_dropped() {
        let harness = Harness::new(Config {
            rate_limit_requests: 1,
            ..Config::default()
        })
        .await;
        harness.use_up_budget().await;
        let bot = MockBot::new(MockMessageText::new().text("/help"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        assert!(bot.get_responses().sent_messages.is_empty());
    }

    #[tokio::test]
    async fn admins_are_not_throttled() {
        let harness = Harness::new(Config {
            admin_ids: vec![UserId(MockUser::ID)],
            rate_limit_requests: 1,
            ..Config::default()
        })
        .await;
        harness.use_up_budget().await;
        let bot = MockBot::new(MockMessageText::new().text("/help"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        assert_eq!(bot.get_responses().sent_messages.len(), 1);
    }

    #[tokio::test]
    async fn throttled_button_press_is_answered() {
        let harness = Harness::new(Config {
            rate_limit_requests: 1,
            ..Config::default()
        })
        .await;
        harness.use_up_budget().await;
        let bot = MockBot::new(MockCallbackQuery::new().data("menu"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        let responses = bot.get_responses();
        let answer = responses.answered_callback_queries.last().unwrap();
        assert_eq!(answer.show_alert, Some(true));
        assert!(answer.text.as_deref().unwrap().contains("Slow down"));
        assert!(responses.edited_messages_text.is_empty());
    }

    #[tokio::test]
    async fn awaited_search_runs_once() {
        let harness = Harness::new(Config::default()).await;
        harness
            .catalog
            .add_video(&NewVideo {
                title: "Night Shift".to_string(),
                file_id: Some("BAAC".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let bot = MockBot::new(MockMessageText::new().text("night"), schema());
        bot.dependencies(harness.deps());
        bot.set_state(SessionState::AwaitingSearch { category_id: None }).await;

        bot.dispatch().await;

        let responses = bot.get_responses();
        let reply = responses.sent_messages.last().unwrap();
        assert!(reply.text().unwrap().contains("1 result(s)"));
        let state: SessionState = bot.get_state().await;
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn awaited_category_name_creates_a_category() {
        let harness = Harness::admin().await;
        let bot = MockBot::new(MockMessageText::new().text("Anime"), schema());
        bot.dependencies(harness.deps());
        bot.set_state(SessionState::AwaitingCategoryName { parent_id: None }).await;

        bot.dispatch().await;

        let roots = harness.catalog.list_categories(ParentScope::Root, None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].name, "Anime");
        let state: SessionState = bot.get_state().await;
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn category_name_from_a_demoted_admin_is_refused() {
        let harness = Harness::new(Config::default()).await;
        let bot = MockBot::new(MockMessageText::new().text("Anime"), schema());
        bot.dependencies(harness.deps());
        bot.set_state(SessionState::AwaitingCategoryName { parent_id: None }).await;

        bot.dispatch().await;

        assert_eq!(harness.catalog.count_categories(ParentScope::All).await.unwrap(), 0);
        let responses = bot.get_responses();
        assert_eq!(responses.sent_messages.last().unwrap().text(), Some(admin::DENIED));
        let state: SessionState = bot.get_state().await;
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn navigating_away_drops_pending_input() {
        let harness = Harness::admin().await;
        let bot = MockBot::new(MockCallbackQuery::new().data("menu"), schema());
        bot.dependencies(harness.deps());
        bot.set_state(SessionState::AwaitingCategoryName { parent_id: None }).await;

        bot.dispatch().await;

        let state: SessionState = bot.get_state().await;
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn input_prompt_keeps_its_state() {
        let harness = Harness::new(Config::default()).await;
        let bot = MockBot::new(MockCallbackQuery::new().data("search:0"), schema());
        bot.dependencies(harness.deps());

        bot.dispatch().await;

        let state: SessionState = bot.get_state().await;
        assert_eq!(state, SessionState::AwaitingSearch { category_id: None });
    }

    #[test]
    fn ids_are_parsed_leniently() {
        assert_eq!(parse_ids("3 4,5  x 6"), vec![3, 4, 5, 6]);
        assert!(parse_ids("").is_empty());
    }

    #[test]
    fn commands_parse_arguments() {
        assert_eq!(
            Command::parse("/search dragon ball", "bot").unwrap(),
            Command::Search("dragon ball".to_string())
        );
        assert_eq!(Command::parse("/start", "bot").unwrap(), Command::Start);
    }
}

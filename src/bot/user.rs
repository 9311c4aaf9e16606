use log::{error, info, warn};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardMarkup, InlineQueryResult, InlineQueryResultCachedDocument,
    InlineQueryResultCachedVideo, User,
};

use super::keyboards::{self, pagination_row, short_label, video_rows, CallbackAction};
use super::{degrade, show, user_key, HandlerResult, Screen, SessionDialogue, SessionState, Target};
use crate::catalog::{Catalog, FavoriteToggle, MediaKind, Page, ParentScope, Video};
use crate::config::Config;
use crate::fetch::{admin_diagnostic, failure_notice, FetchResolver, TelegramGateway};

const CATEGORIES_PER_PAGE: u32 = 10;
const VIDEOS_PER_PAGE: u32 = 8;
const SEARCH_RESULTS: u32 = 10;
const LIST_LIMIT: i64 = 20;
const TOP_LIMIT: i64 = 10;
const INLINE_RESULTS: u32 = 20;
const MIN_QUERY_CHARS: usize = 2;

const HELP_TEXT: &str = "❓ How to use the archive\n\n\
    • Send any text (2+ characters) to search titles, captions and file names.\n\
    • Browse 📁 Categories to walk the catalog.\n\
    • Open a video and press 📥 Download to receive it.\n\
    • ⭐ keeps a video in your favorites, 🕘 History shows what you watched.\n\
    • Type @ and the bot name in any chat for inline search.\n\n\
    Commands: /start, /search <text>, /cancel, /help";

pub fn welcome_screen(user: &User, is_admin: bool) -> Screen {
    Screen::new(
        format!(
            "👋 Welcome, {}!\n\nThis is the video archive. Search by name or browse the categories below.",
            user.first_name
        ),
        keyboards::main_menu(is_admin),
    )
}

fn menu_screen(is_admin: bool) -> Screen {
    Screen::new("🏠 Main menu", keyboards::main_menu(is_admin))
}

pub fn cancelled_screen(is_admin: bool) -> Screen {
    Screen::new("✖ Cancelled.", keyboards::main_menu(is_admin))
}

pub fn search_prompt(scope: Option<&str>) -> Screen {
    let text = match scope {
        Some(path) => format!("🔍 Send the text to search for in {path}."),
        None => "🔍 Send the text to search for.".to_string(),
    };
    Screen::new(text, keyboards::cancel_input())
}

/// Plain text outside of any input: treat it as a search.
pub async fn quick_search(catalog: &Catalog, text: &str, is_admin: bool) -> Screen {
    if text.trim().chars().count() < MIN_QUERY_CHARS {
        return Screen::new(
            format!("Send at least {MIN_QUERY_CHARS} characters to search, or use the menu."),
            keyboards::main_menu(is_admin),
        );
    }
    search_screen(catalog, text, None).await
}

/// Best matches for `query`, anywhere or among the videos of one category.
pub async fn search_screen(catalog: &Catalog, query: &str, category_id: Option<i64>) -> Screen {
    let query = query.trim();
    let total = degrade(catalog.count_search(query, category_id).await, "count_search");
    let videos = degrade(
        catalog.search_videos(query, category_id, Page::first(SEARCH_RESULTS)).await,
        "search_videos",
    );
    info!("Search {query:?} in {category_id:?}: {total} result(s)");

    let text = if videos.is_empty() {
        format!("🔍 Nothing found for \"{query}\".\nTry fewer or different words.")
    } else if total > i64::from(SEARCH_RESULTS) {
        format!(
            "🔍 {total} results for \"{query}\", showing the best {SEARCH_RESULTS}.\nRefine the search to narrow it down."
        )
    } else {
        format!("🔍 {total} result(s) for \"{query}\":")
    };

    let mut rows = video_rows(&videos);
    rows.push(vec![
        CallbackAction::Search { category: category_id }.button("🔍 New search"),
        CallbackAction::Menu.button("🏠 Main menu"),
    ]);
    if let Some(id) = category_id {
        rows.push(vec![CallbackAction::Category { id, page: 1 }.button("📁 Back to category")]);
    }
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn categories_screen(catalog: &Catalog, page: u32) -> Screen {
    let page = Page::new(page, CATEGORIES_PER_PAGE);
    let total = degrade(catalog.count_categories(ParentScope::Root).await, "count_categories");
    let categories = degrade(
        catalog.list_categories(ParentScope::Root, Some(page)).await,
        "list_categories",
    );

    let text = if categories.is_empty() {
        "📁 There are no categories yet.".to_string()
    } else {
        format!("📁 Categories ({total})")
    };

    let mut rows: Vec<_> = categories
        .iter()
        .map(|category| {
            let label = format!("📂 {} ({})", category.name, category.video_count);
            vec![CallbackAction::Category { id: category.id, page: 1 }.button(short_label(&label))]
        })
        .collect();
    if let Some(row) = pagination_row(page.number, page.total_pages(total), |page| {
        CallbackAction::Categories { page }
    }) {
        rows.push(row);
    }
    rows.push(vec![CallbackAction::Menu.button("🏠 Main menu")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn category_screen(catalog: &Catalog, id: i64, page: u32) -> Screen {
    let Some(category) = degrade(catalog.get_category(id).await, "get_category") else {
        return Screen::new("📁 This category no longer exists.", keyboards::back_to_menu());
    };

    let page = Page::new(page, VIDEOS_PER_PAGE);
    let crumbs = degrade(catalog.breadcrumb(id).await, "breadcrumb");
    let path = if crumbs.is_empty() {
        category.full_path.clone()
    } else {
        crumbs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(" > ")
    };
    let children = degrade(
        catalog.list_categories(ParentScope::Children(id), None).await,
        "list_categories",
    );
    let videos = degrade(catalog.videos_in_category(id, page).await, "videos_in_category");

    let mut text = format!(
        "📁 {path}\n🎬 {} video(s) · 📂 {} subcategories",
        category.video_count, category.subcategory_count
    );
    if videos.is_empty() && children.is_empty() {
        text.push_str("\n\nNothing here yet.");
    }

    let mut rows: Vec<_> = children
        .iter()
        .map(|child| {
            let label = format!("📂 {} ({})", child.name, child.video_count);
            vec![CallbackAction::Category { id: child.id, page: 1 }.button(short_label(&label))]
        })
        .collect();
    rows.extend(video_rows(&videos));
    if let Some(row) = pagination_row(page.number, page.total_pages(category.video_count), |page| {
        CallbackAction::Category { id, page }
    }) {
        rows.push(row);
    }

    if category.video_count > 0 {
        rows.push(vec![
            CallbackAction::Search { category: Some(id) }.button("🔍 Search in this category")
        ]);
    }
    let back = match category.parent_id {
        Some(parent) => CallbackAction::Category { id: parent, page: 1 },
        None => CallbackAction::Categories { page: 1 },
    };
    rows.push(vec![back.button("⬅ Back"), CallbackAction::Menu.button("🏠 Main menu")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

fn format_file_size(bytes: i64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn details_text(video: &Video, is_admin: bool) -> String {
    let mut lines = vec![
        format!("🎬 {}", video.display_title()),
        format!(
            "📁 {}",
            video.category_path.as_deref().unwrap_or("Uncategorized")
        ),
        format!("👁 Views: {}", video.view_count),
        format!("📅 Added: {}", video.upload_date.format("%Y-%m-%d")),
    ];
    if let Some(size) = video.file_size {
        lines.push(format!("💾 Size: {}", format_file_size(size)));
    }
    if let Some(duration) = video.duration {
        lines.push(format!("⏱ Duration: {}", format_duration(duration)));
    }

    let metadata = video.parsed_metadata().summary_lines();
    if !metadata.is_empty() {
        lines.push(String::new());
        lines.extend(metadata);
    }

    if is_admin {
        lines.push(String::new());
        lines.push(format!(
            "🔧 Record {} · source {}/{}",
            video.id,
            video.chat_id.map_or("-".to_string(), |id| id.to_string()),
            video.message_id.map_or("-".to_string(), |id| id.to_string()),
        ));
        if let Some(key) = &video.grouping_key {
            lines.push(format!("🔑 {key}"));
        }
    }
    lines.join("\n")
}

/// Details of a video. Does not count as a view.
pub(crate) async fn video_screen(
    catalog: &Catalog,
    video_id: i64,
    user: &User,
    is_admin: bool,
) -> Screen {
    let Some(video) = degrade(catalog.get_video(video_id).await, "get_video") else {
        return Screen::new("🎬 This video no longer exists.", keyboards::back_to_menu());
    };

    let favorite = degrade(
        catalog.is_favorite(user_key(user), video_id).await,
        "is_favorite",
    );
    let favorite_label = if favorite {
        "💔 Remove from favorites"
    } else {
        "⭐ Add to favorites"
    };

    let mut rows = vec![
        vec![CallbackAction::Download(video_id).button("📥 Download")],
        vec![CallbackAction::ToggleFavorite(video_id).button(favorite_label)],
    ];
    if is_admin {
        rows.push(vec![
            CallbackAction::PickVideoCategory { video: video_id, page: 1 }.button("📂 Move"),
            CallbackAction::DeleteVideo(video_id).button("🗑 Delete"),
        ]);
    }
    let back = match video.category_id {
        Some(category) => CallbackAction::Category { id: category, page: 1 },
        None => CallbackAction::Menu,
    };
    rows.push(vec![back.button("⬅ Back"), CallbackAction::Menu.button("🏠 Main menu")]);

    Screen::new(details_text(&video, is_admin), InlineKeyboardMarkup::new(rows))
}

/// Count a view, record it in the user's history and show the details.
async fn open_video(catalog: &Catalog, video_id: i64, user: &User, is_admin: bool) -> Screen {
    if degrade(catalog.increment_views(video_id).await, "increment_views") {
        if let Err(e) = catalog.record_view(user_key(user), video_id).await {
            warn!("Could not record view of video {video_id} by {}: {e}", user.id);
        }
    }
    video_screen(catalog, video_id, user, is_admin).await
}

fn list_screen(title: &str, empty: &str, videos: &[Video]) -> Screen {
    let text = if videos.is_empty() {
        empty.to_string()
    } else {
        title.to_string()
    };
    let mut rows = video_rows(videos);
    rows.push(vec![CallbackAction::Menu.button("🏠 Main menu")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn stats_screen(catalog: &Catalog) -> Screen {
    let stats = degrade(catalog.general_stats().await, "general_stats");
    let popular = degrade(catalog.popular_categories(5).await, "popular_categories");

    let mut text = format!(
        "📊 Archive statistics\n\n\
         🎬 Videos: {}\n\
         📁 Categories: {}\n\
         👥 Users: {}\n\
         ⭐ Favorites: {}\n\
         👁 Total views: {}",
        stats.videos, stats.categories, stats.users, stats.favorites, stats.total_views
    );
    if !popular.is_empty() {
        text.push_str("\n\n🔥 Most watched categories:");
        for (i, category) in popular.iter().enumerate() {
            text.push_str(&format!(
                "\n{}. {} · {} video(s) · {} views",
                i + 1,
                category.name,
                category.videos,
                category.views
            ));
        }
    }
    Screen::new(text, keyboards::back_to_menu())
}

async fn download(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    chat: ChatId,
    video_id: i64,
    is_admin: bool,
) -> HandlerResult {
    let Some(video) = degrade(catalog.get_video(video_id).await, "get_video") else {
        bot.send_message(chat, "🎬 This video no longer exists.").await?;
        return Ok(());
    };

    let resolver = FetchResolver::new(TelegramGateway::new(bot.clone()), config.source_chat_id);
    let outcome = resolver.deliver(&video, chat).await;
    if !outcome.is_delivered() {
        bot.send_message(chat, failure_notice()).await?;
        if is_admin {
            bot.send_message(chat, admin_diagnostic(&video, &outcome)).await?;
        }
    }
    Ok(())
}

pub async fn handle_action(
    bot: &Bot,
    action: CallbackAction,
    target: Target,
    dialogue: &SessionDialogue,
    catalog: &Catalog,
    config: &Config,
    user: &User,
) -> HandlerResult {
    let is_admin = config.is_admin(user.id);
    let uid = user_key(user);

    let screen = match action {
        CallbackAction::Menu => menu_screen(is_admin),
        CallbackAction::Search { category } => {
            dialogue.update(SessionState::AwaitingSearch { category_id: category }).await?;
            let scope = match category {
                Some(id) => degrade(catalog.get_category(id).await, "get_category").map(|c| c.full_path),
                None => None,
            };
            search_prompt(scope.as_deref())
        }
        CallbackAction::CancelInput => {
            dialogue.reset().await?;
            cancelled_screen(is_admin)
        }
        CallbackAction::Categories { page } => categories_screen(catalog, page).await,
        CallbackAction::Category { id, page } => category_screen(catalog, id, page).await,
        CallbackAction::Favorites => list_screen(
            "⭐ Your favorites:",
            "⭐ You have no favorites yet.",
            &degrade(catalog.favorites(uid, LIST_LIMIT).await, "favorites"),
        ),
        CallbackAction::History => list_screen(
            "🕘 Recently watched:",
            "🕘 Your history is empty.",
            &degrade(catalog.history(uid, LIST_LIMIT).await, "history"),
        ),
        CallbackAction::Popular => list_screen(
            "🔥 Most watched videos:",
            "🔥 Nothing has been watched yet.",
            &degrade(catalog.popular_videos(TOP_LIMIT).await, "popular_videos"),
        ),
        CallbackAction::Recent => list_screen(
            "🆕 Latest additions:",
            "🆕 The archive is empty.",
            &degrade(catalog.recent_videos(TOP_LIMIT).await, "recent_videos"),
        ),
        CallbackAction::Stats => stats_screen(catalog).await,
        CallbackAction::Help => Screen::new(HELP_TEXT, keyboards::back_to_menu()),
        CallbackAction::Video(id) => open_video(catalog, id, user, is_admin).await,
        CallbackAction::ToggleFavorite(id) => {
            let toggle = catalog
                .toggle_favorite(uid, id, config.max_favorites_per_user)
                .await;
            match toggle {
                Ok(FavoriteToggle::LimitReached) => {
                    bot.send_message(
                        target.chat(),
                        format!(
                            "⭐ You already have {} favorites. Remove one first.",
                            config.max_favorites_per_user
                        ),
                    )
                    .await?;
                }
                Ok(_) => {}
                Err(e) => error!("Favorite toggle of video {id} by {uid} failed: {e}"),
            }
            video_screen(catalog, id, user, is_admin).await
        }
        CallbackAction::Download(id) => {
            return download(bot, catalog, config, target.chat(), id, is_admin).await;
        }
        other => {
            warn!("Admin action {other} reached the user handler");
            return Ok(());
        }
    };

    show(bot, target, screen).await
}

/// Inline mode: `@bot text` searches the archive, an empty query lists the
/// latest additions.
pub async fn handle_inline_query(bot: Bot, q: InlineQuery, catalog: Catalog) -> HandlerResult {
    info!("Received inline query: {:?}", q.query.trim());
    let results = inline_results(&catalog, &q.query).await;

    if let Err(e) = bot.answer_inline_query(&q.id, results).await {
        error!("Error answering inline query: {e:?}");
    }

    Ok(())
}

/// Cached results for the records that still carry a media token, sent as
/// the same kind of media the token was issued for.
pub(crate) async fn inline_results(catalog: &Catalog, query: &str) -> Vec<InlineQueryResult> {
    let query = query.trim();
    let videos = if query.is_empty() {
        degrade(catalog.recent_videos(i64::from(INLINE_RESULTS)).await, "recent_videos")
    } else {
        degrade(
            catalog.search_videos(query, None, Page::first(INLINE_RESULTS)).await,
            "search_videos",
        )
    };

    videos
        .iter()
        .filter_map(|video| {
            let file_id = video.file_id.clone().filter(|id| !id.is_empty())?;
            let title = video.display_title();
            let result = match video.media_kind {
                MediaKind::Video => InlineQueryResult::CachedVideo(
                    InlineQueryResultCachedVideo::new(video.id.to_string(), file_id, title.clone())
                        .caption(title),
                ),
                MediaKind::Document => InlineQueryResult::CachedDocument(
                    InlineQueryResultCachedDocument::new(video.id.to_string(), title.clone(), file_id)
                        .caption(title),
                ),
            };
            Some(result)
        })
        .collect()
}

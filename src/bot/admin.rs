use std::time::Duration;

use log::{error, info, warn};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, User};

use super::keyboards::{self, pagination_row, short_label, single, CallbackAction};
use super::{degrade, parse_ids, show, user_key, HandlerResult, Screen, SessionDialogue, SessionState, Target};
use crate::catalog::{Catalog, CatalogError, DeleteOutcome, MediaKind, NewVideo, Page, ParentScope};
use crate::config::Config;
use crate::grouping::{file_stem, grouping_key};
use crate::metadata::extract_metadata;

pub const DENIED: &str = "⛔ This action is reserved for administrators.";

const PICKER_PER_PAGE: u32 = 10;
const UNCATEGORIZED_LIMIT: i64 = 20;
const LOG_LIMIT: i64 = 15;
const TOP_USERS: i64 = 10;
const MAX_CATEGORY_NAME_CHARS: usize = 64;
const BROADCAST_PAUSE: Duration = Duration::from_millis(50);

/// Write an admin action to the log table and mirror it to the log channel.
async fn record_action(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    action: &str,
    details: Option<&str>,
) {
    info!("Admin {} performed {action} {details:?}", admin.id);
    if let Err(e) = catalog.log_admin_action(user_key(admin), action, details).await {
        error!("Could not log admin action {action}: {e}");
    }

    if let Some(channel) = config.admin_log_channel {
        let text = match details {
            Some(details) => format!("🛠 {} ({}): {action}\n{details}", admin.first_name, admin.id),
            None => format!("🛠 {} ({}): {action}", admin.first_name, admin.id),
        };
        if let Err(e) = bot.send_message(channel, text).await {
            warn!("Could not mirror admin action to {channel}: {e}");
        }
    }
}

fn back_to_panel() -> InlineKeyboardMarkup {
    single(CallbackAction::AdminPanel, "🛠 Admin panel")
}

pub async fn panel_screen(catalog: &Catalog) -> Screen {
    let stats = degrade(catalog.general_stats().await, "general_stats");
    let uncategorized = degrade(catalog.category_stats().await, "category_stats").uncategorized_videos;

    let text = format!(
        "🛠 Admin panel\n\n\
         🎬 {} videos ({uncategorized} uncategorized)\n\
         📁 {} categories\n\
         👥 {} users\n\
         👁 {} views",
        stats.videos, stats.categories, stats.users, stats.total_views
    );

    use CallbackAction::*;
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![AdminStats.button("📊 Statistics"), Users.button("👥 Users")],
        vec![
            AdminCategories { parent: None }.button("📁 Categories"),
            Uncategorized.button("📥 Uncategorized"),
        ],
        vec![Broadcast.button("📣 Broadcast"), Cleanup.button("🧹 Cleanup")],
        vec![Logs.button("📜 Action log")],
        vec![Menu.button("🏠 Main menu")],
    ]);
    Screen::new(text, keyboard)
}

async fn stats_screen(catalog: &Catalog) -> Screen {
    let videos = degrade(catalog.video_stats().await, "video_stats");
    let categories = degrade(catalog.category_stats().await, "category_stats");
    let users = degrade(catalog.user_stats().await, "user_stats");
    let favorites = degrade(catalog.general_stats().await, "general_stats").favorites;
    let popular = degrade(catalog.popular_categories(5).await, "popular_categories");
    let database = if catalog.ping().await { "✅ reachable" } else { "❌ unreachable" };

    let mut text = format!(
        "📊 Detailed statistics\n\n\
         🗄 Database: {database}\n\
         🎬 Videos: {}\n\
         👁 Views: {} (avg {:.2} per video)\n\
         📁 Categories: {} ({} in use)\n\
         📂 Categorized: {} · Uncategorized: {}\n\
         👥 Users: {} (+{} this week, +{} this month)\n\
         ⭐ Favorites: {favorites}",
        videos.total_videos,
        videos.total_views,
        videos.avg_views,
        categories.total_categories,
        videos.categories_used,
        categories.categorized_videos,
        categories.uncategorized_videos,
        users.total_users,
        users.new_this_week,
        users.new_this_month,
    );
    if !popular.is_empty() {
        text.push_str("\n\n🔥 Top categories:");
        for category in &popular {
            text.push_str(&format!(
                "\n• {}: {} video(s), {} views",
                category.name, category.videos, category.views
            ));
        }
    }
    Screen::new(text, back_to_panel())
}

async fn users_screen(catalog: &Catalog) -> Screen {
    let stats = degrade(catalog.user_stats().await, "user_stats");
    let top = degrade(catalog.top_users(TOP_USERS).await, "top_users");

    let mut text = format!(
        "👥 Users\n\nTotal: {}\nJoined this week: {}\nJoined this month: {}",
        stats.total_users, stats.new_this_week, stats.new_this_month
    );
    if !top.is_empty() {
        text.push_str("\n\n🏆 Most active:");
        for (i, user) in top.iter().enumerate() {
            let name = user
                .username
                .as_deref()
                .map(|u| format!("@{u}"))
                .or_else(|| user.first_name.clone())
                .unwrap_or_else(|| user.user_id.to_string());
            text.push_str(&format!(
                "\n{}. {name} · 🕘 {} · ⭐ {}",
                i + 1,
                user.history_count,
                user.favorites_count
            ));
        }
    }
    Screen::new(text, back_to_panel())
}

async fn logs_screen(catalog: &Catalog) -> Screen {
    let logs = degrade(catalog.admin_logs(LOG_LIMIT).await, "admin_logs");
    let text = if logs.is_empty() {
        "📜 No admin actions recorded yet.".to_string()
    } else {
        let lines: Vec<String> = logs
            .iter()
            .map(|entry| {
                let mut line = format!(
                    "{} · {} · {}",
                    entry.timestamp.format("%m-%d %H:%M"),
                    entry.admin_id,
                    entry.action
                );
                if let Some(details) = &entry.details {
                    line.push_str(&format!(" · {}", short_label(details)));
                }
                line
            })
            .collect();
        format!("📜 Latest admin actions\n\n{}", lines.join("\n"))
    };
    Screen::new(text, back_to_panel())
}

async fn categories_screen(catalog: &Catalog, parent: Option<i64>) -> Screen {
    let scope = match parent {
        Some(id) => ParentScope::Children(id),
        None => ParentScope::Root,
    };
    let children = degrade(catalog.list_categories(scope, None).await, "list_categories");

    let heading = match parent {
        Some(id) => match degrade(catalog.get_category(id).await, "get_category") {
            Some(category) => format!("📁 {}", category.full_path),
            None => return Screen::new("📁 This category no longer exists.", back_to_panel()),
        },
        None => "📁 Top-level categories".to_string(),
    };
    let text = if children.is_empty() {
        format!("{heading}\n\nNo subcategories yet.")
    } else {
        format!("{heading}\n\nPick a category to manage it.")
    };

    let mut rows: Vec<_> = children
        .iter()
        .map(|child| {
            let label = format!(
                "📂 {} ({} · {})",
                child.name, child.video_count, child.subcategory_count
            );
            vec![CallbackAction::ManageCategory(child.id).button(short_label(&label))]
        })
        .collect();
    rows.push(vec![CallbackAction::CreateCategory { parent }.button("➕ New category here")]);
    let back = match parent {
        Some(id) => CallbackAction::ManageCategory(id),
        None => CallbackAction::AdminPanel,
    };
    rows.push(vec![back.button("⬅ Back")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn manage_category_screen(catalog: &Catalog, id: i64) -> Screen {
    let Some(category) = degrade(catalog.get_category(id).await, "get_category") else {
        return Screen::new("📁 This category no longer exists.", back_to_panel());
    };

    let text = format!(
        "📁 {}\n\nName: {}\nParent: {}\nVideos: {}\nSubcategories: {}",
        category.full_path,
        category.name,
        category.parent_name.as_deref().unwrap_or("none"),
        category.video_count,
        category.subcategory_count
    );

    use CallbackAction::*;
    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![
            AdminCategories { parent: Some(id) }.button("📂 Subcategories"),
            Category { id, page: 1 }.button("👁 Browse"),
        ],
        vec![
            RenameCategory(id).button("✏ Rename"),
            PickMoveTarget { from: id, page: 1 }.button("🔀 Move videos"),
        ],
        vec![DeleteCategory(id).button("🗑 Delete")],
        vec![AdminCategories { parent: category.parent_id }.button("⬅ Back")],
    ]);
    Screen::new(text, keyboard)
}

/// A page of every category, each button built by `pick`.
async fn category_picker(
    catalog: &Catalog,
    heading: String,
    page: u32,
    skip: Option<i64>,
    pick: impl Fn(i64) -> CallbackAction,
    to_page: impl Fn(u32) -> CallbackAction,
    back: CallbackAction,
) -> Screen {
    let page = Page::new(page, PICKER_PER_PAGE);
    let total = degrade(catalog.count_categories(ParentScope::All).await, "count_categories");
    let categories = degrade(
        catalog.list_categories(ParentScope::All, Some(page)).await,
        "list_categories",
    );

    let mut rows: Vec<_> = categories
        .iter()
        .filter(|category| Some(category.id) != skip)
        .map(|category| vec![pick(category.id).button(short_label(&format!("📂 {}", category.full_path)))])
        .collect();
    let text = if rows.is_empty() {
        format!("{heading}\n\nThere is no category to pick. Create one first.")
    } else {
        heading
    };
    if let Some(row) = pagination_row(page.number, page.total_pages(total), to_page) {
        rows.push(row);
    }
    rows.push(vec![back.button("⬅ Back")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn uncategorized_screen(catalog: &Catalog) -> Screen {
    let videos = degrade(
        catalog.uncategorized_videos(UNCATEGORIZED_LIMIT).await,
        "uncategorized_videos",
    );
    let text = if videos.is_empty() {
        "📥 Every video has a category.".to_string()
    } else {
        format!("📥 Uncategorized videos ({}). Pick one to assign it.", videos.len())
    };

    let mut rows: Vec<_> = videos
        .iter()
        .map(|video| {
            let label = format!("#{} {}", video.id, video.display_title());
            vec![CallbackAction::PickVideoCategory { video: video.id, page: 1 }.button(short_label(&label))]
        })
        .collect();
    rows.push(vec![CallbackAction::AdminPanel.button("🛠 Admin panel")]);
    Screen::new(text, InlineKeyboardMarkup::new(rows))
}

async fn delete_category(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    id: i64,
) -> Screen {
    let parent = degrade(catalog.get_category(id).await, "get_category").and_then(|c| c.parent_id);
    let back = single(CallbackAction::AdminCategories { parent }, "⬅ Back");

    match catalog.delete_category(id).await {
        Ok(DeleteOutcome::Deleted { uncategorized }) => {
            record_action(bot, catalog, config, admin, "delete_category", Some(&format!("category {id}"))).await;
            Screen::new(
                format!("🗑 Category deleted. {uncategorized} video(s) are now uncategorized."),
                back,
            )
        }
        Ok(DeleteOutcome::HasSubcategories(count)) => Screen::new(
            format!("⚠ This category still has {count} subcategories. Delete or move them first."),
            single(CallbackAction::ManageCategory(id), "⬅ Back"),
        ),
        Ok(DeleteOutcome::NotFound) => Screen::new("📁 This category no longer exists.", back),
        Err(e) => {
            error!("Deleting category {id} failed: {e}");
            Screen::new("❌ The category could not be deleted.", back)
        }
    }
}

async fn move_videos(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    from: i64,
    to: i64,
) -> Screen {
    match catalog.move_videos(from, to).await {
        Ok(moved) => {
            record_action(
                bot,
                catalog,
                config,
                admin,
                "move_videos",
                Some(&format!("{moved} video(s) from {from} to {to}")),
            )
            .await;
            Screen::new(
                format!("🔀 Moved {moved} video(s)."),
                single(CallbackAction::ManageCategory(to), "📁 Open target"),
            )
        }
        Err(CatalogError::NotFound) => {
            Screen::new("📁 The target category no longer exists.", back_to_panel())
        }
        Err(e) => {
            error!("Moving videos from {from} to {to} failed: {e}");
            Screen::new("❌ The videos could not be moved.", back_to_panel())
        }
    }
}

async fn assign_video(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    video: i64,
    category: i64,
) -> Screen {
    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        CallbackAction::Uncategorized.button("📥 Uncategorized"),
        CallbackAction::AdminPanel.button("🛠 Admin panel"),
    ]]);
    let Some(target) = degrade(catalog.get_category(category).await, "get_category") else {
        return Screen::new("📁 This category no longer exists.", keyboard);
    };

    if degrade(catalog.set_video_category(video, Some(category)).await, "set_video_category") {
        record_action(
            bot,
            catalog,
            config,
            admin,
            "assign_video",
            Some(&format!("video {video} to {}", target.full_path)),
        )
        .await;
        Screen::new(format!("✅ Video #{video} moved to {}.", target.full_path), keyboard)
    } else {
        Screen::new(format!("❌ Video #{video} was not found."), keyboard)
    }
}

fn confirm_screen(question: String, yes: CallbackAction, no: CallbackAction) -> Screen {
    Screen::new(
        question,
        InlineKeyboardMarkup::new(vec![vec![yes.button("✅ Yes"), no.button("✖ No")]]),
    )
}

async fn delete_video(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    id: i64,
) -> Screen {
    if degrade(catalog.delete_video(id).await, "delete_video") {
        record_action(bot, catalog, config, admin, "delete_video", Some(&format!("video {id}"))).await;
        Screen::new(format!("🗑 Video #{id} deleted."), back_to_panel())
    } else {
        Screen::new(format!("❌ Video #{id} was not found."), back_to_panel())
    }
}

async fn run_cleanup(bot: &Bot, catalog: &Catalog, config: &Config, admin: &User) -> Screen {
    match catalog.cleanup_database(config.history_retention_days).await {
        Ok(report) => {
            let summary = format!(
                "{} expired history entries, {} orphaned favorites, {} orphaned history entries",
                report.history_deleted, report.orphaned_favorites, report.orphaned_history
            );
            record_action(bot, catalog, config, admin, "cleanup_database", Some(&summary)).await;
            Screen::new(format!("🧹 Cleanup finished.\nRemoved {summary}."), back_to_panel())
        }
        Err(e) => {
            error!("Database cleanup failed: {e}");
            Screen::new("❌ Cleanup failed. See the logs.", back_to_panel())
        }
    }
}

pub async fn handle_action(
    bot: &Bot,
    action: CallbackAction,
    target: Target,
    dialogue: &SessionDialogue,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
) -> HandlerResult {
    use CallbackAction::*;

    let screen = match action {
        AdminPanel => panel_screen(catalog).await,
        AdminStats => stats_screen(catalog).await,
        Users => users_screen(catalog).await,
        Logs => logs_screen(catalog).await,
        AdminCategories { parent } => categories_screen(catalog, parent).await,
        ManageCategory(id) => manage_category_screen(catalog, id).await,
        CreateCategory { parent } => {
            let under = match parent {
                Some(id) => degrade(catalog.get_category(id).await, "get_category")
                    .map(|c| format!(" under {}", c.full_path))
                    .unwrap_or_default(),
                None => " at the top level".to_string(),
            };
            dialogue
                .update(SessionState::AwaitingCategoryName { parent_id: parent })
                .await?;
            Screen::new(
                format!("➕ Send the name of the new category{under}."),
                keyboards::cancel_input(),
            )
        }
        RenameCategory(id) => {
            dialogue
                .update(SessionState::AwaitingCategoryRename { category_id: id })
                .await?;
            Screen::new("✏ Send the new name for this category.", keyboards::cancel_input())
        }
        DeleteCategory(id) => delete_category(bot, catalog, config, admin, id).await,
        PickMoveTarget { from, page } => {
            category_picker(
                catalog,
                "🔀 Move all videos of this category to:".to_string(),
                page,
                Some(from),
                |to| MoveVideos { from, to },
                |page| PickMoveTarget { from, page },
                ManageCategory(from),
            )
            .await
        }
        MoveVideos { from, to } => move_videos(bot, catalog, config, admin, from, to).await,
        Uncategorized => uncategorized_screen(catalog).await,
        PickVideoCategory { video, page } => {
            category_picker(
                catalog,
                format!("📂 Pick a category for video #{video}:"),
                page,
                None,
                |category| AssignVideo { video, category },
                |page| PickVideoCategory { video, page },
                Uncategorized,
            )
            .await
        }
        AssignVideo { video, category } => {
            assign_video(bot, catalog, config, admin, video, category).await
        }
        DeleteVideo(id) => {
            let title = degrade(catalog.get_video(id).await, "get_video")
                .map(|v| v.display_title())
                .unwrap_or_else(|| format!("#{id}"));
            confirm_screen(
                format!("🗑 Delete \"{title}\"? This cannot be undone."),
                ConfirmDeleteVideo(id),
                AdminPanel,
            )
        }
        ConfirmDeleteVideo(id) => delete_video(bot, catalog, config, admin, id).await,
        Cleanup => confirm_screen(
            format!(
                "🧹 Remove history older than {} days and all orphaned favorites and history?",
                config.history_retention_days
            ),
            ConfirmCleanup,
            AdminPanel,
        ),
        ConfirmCleanup => run_cleanup(bot, catalog, config, admin).await,
        Broadcast => {
            dialogue.update(SessionState::AwaitingBroadcast).await?;
            Screen::new(
                "📣 Send the message to broadcast to every user.",
                keyboards::cancel_input(),
            )
        }
        other => {
            warn!("User action {other} reached the admin handler");
            return Ok(());
        }
    };

    show(bot, target, screen).await
}

fn valid_category_name(text: &str) -> Option<&str> {
    let name = text.trim();
    let length = name.chars().count();
    (length > 0 && length <= MAX_CATEGORY_NAME_CHARS).then_some(name)
}

pub async fn create_category(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    text: &str,
    parent_id: Option<i64>,
) -> Screen {
    let Some(name) = valid_category_name(text) else {
        return Screen::new(
            format!("⚠ A category name needs 1 to {MAX_CATEGORY_NAME_CHARS} characters."),
            single(CallbackAction::CreateCategory { parent: parent_id }, "➕ Try again"),
        );
    };

    match catalog.create_category(name, parent_id).await {
        Ok(category) => {
            record_action(bot, catalog, config, admin, "create_category", Some(&category.full_path)).await;
            Screen::new(
                format!("✅ Created {}.", category.full_path),
                single(CallbackAction::ManageCategory(category.id), "📁 Manage it"),
            )
        }
        Err(CatalogError::NotFound) => {
            Screen::new("📁 The parent category no longer exists.", back_to_panel())
        }
        Err(e) => {
            error!("Creating category {name:?} failed: {e}");
            Screen::new("❌ The category could not be created.", back_to_panel())
        }
    }
}

pub async fn rename_category(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    category_id: i64,
    text: &str,
) -> Screen {
    let Some(name) = valid_category_name(text) else {
        return Screen::new(
            format!("⚠ A category name needs 1 to {MAX_CATEGORY_NAME_CHARS} characters."),
            single(CallbackAction::RenameCategory(category_id), "✏ Try again"),
        );
    };

    match catalog.rename_category(category_id, name).await {
        Ok(()) => {
            record_action(
                bot,
                catalog,
                config,
                admin,
                "rename_category",
                Some(&format!("category {category_id} to {name}")),
            )
            .await;
            Screen::new(
                format!("✅ Renamed to {name}."),
                single(CallbackAction::ManageCategory(category_id), "📁 Manage it"),
            )
        }
        Err(CatalogError::NotFound) => {
            Screen::new("📁 This category no longer exists.", back_to_panel())
        }
        Err(e) => {
            error!("Renaming category {category_id} failed: {e}");
            Screen::new("❌ The category could not be renamed.", back_to_panel())
        }
    }
}

/// Send `text` to every known user, pausing between sends.
pub async fn broadcast(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    text: &str,
) -> Screen {
    let recipients = degrade(catalog.all_user_ids().await, "all_user_ids");
    let (mut sent, mut failed) = (0usize, 0usize);

    for user_id in &recipients {
        match bot.send_message(ChatId(*user_id), text).await {
            Ok(_) => sent += 1,
            Err(e) => {
                failed += 1;
                warn!("Broadcast to {user_id} failed: {e}");
            }
        }
        tokio::time::sleep(BROADCAST_PAUSE).await;
    }

    let summary = format!("{sent} delivered, {failed} failed");
    record_action(bot, catalog, config, admin, "broadcast", Some(&summary)).await;
    Screen::new(format!("📣 Broadcast finished: {summary}."), back_to_panel())
}

pub async fn assign_command(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    args: &str,
) -> String {
    let ids = parse_ids(args);
    let [category_id, videos @ ..] = ids.as_slice() else {
        return "Usage: /assign <category_id> <video_id>...".to_string();
    };
    if videos.is_empty() {
        return "Usage: /assign <category_id> <video_id>...".to_string();
    }

    let Some(category) = degrade(catalog.get_category(*category_id).await, "get_category") else {
        return format!("📁 Category {category_id} was not found.");
    };
    let assigned = degrade(
        catalog.bulk_set_category(videos, *category_id).await,
        "bulk_set_category",
    );
    record_action(
        bot,
        catalog,
        config,
        admin,
        "bulk_assign",
        Some(&format!("{assigned} video(s) to {}", category.full_path)),
    )
    .await;
    format!(
        "✅ Assigned {assigned} of {} video(s) to {}.",
        videos.len(),
        category.full_path
    )
}

pub async fn purge_command(
    bot: &Bot,
    catalog: &Catalog,
    config: &Config,
    admin: &User,
    args: &str,
) -> String {
    let ids = parse_ids(args);
    if ids.is_empty() {
        return "Usage: /purge <video_id>...".to_string();
    }

    let deleted = degrade(catalog.bulk_delete(&ids).await, "bulk_delete");
    record_action(
        bot,
        catalog,
        config,
        admin,
        "bulk_delete",
        Some(&format!("{deleted} of {} video(s)", ids.len())),
    )
    .await;
    format!("🗑 Deleted {deleted} of {} video(s).", ids.len())
}

/// The catalog row for a posted video or document.
fn archive_record(msg: &Message) -> Option<NewVideo> {
    let (media_kind, file_id, original_name, file_size, duration) = if let Some(video) = msg.video() {
        (
            MediaKind::Video,
            video.file.id.clone(),
            video.file_name.clone().unwrap_or_default(),
            i64::from(video.file.size),
            Some(i64::from(video.duration.seconds())),
        )
    } else if let Some(document) = msg.document() {
        (
            MediaKind::Document,
            document.file.id.clone(),
            document.file_name.clone().unwrap_or_default(),
            i64::from(document.file.size),
            None,
        )
    } else {
        return None;
    };

    let caption = msg.caption().unwrap_or_default();
    let metadata = extract_metadata(caption, &original_name);
    let grouping_key = grouping_key(&metadata, &original_name);
    let title = metadata.series_name.clone().unwrap_or_else(|| {
        if original_name.is_empty() {
            format!("Video {}", msg.id.0)
        } else {
            file_stem(&original_name).to_string()
        }
    });
    // Telegram often omits the name; keep unnamed files recognizable.
    let file_name = match (original_name.is_empty(), media_kind) {
        (true, MediaKind::Video) => format!("video_{}.mp4", msg.id.0),
        (true, MediaKind::Document) => format!("document_{}", msg.id.0),
        (false, _) => original_name,
    };

    Some(NewVideo {
        message_id: Some(i64::from(msg.id.0)),
        chat_id: Some(msg.chat.id.0),
        title,
        caption: caption.to_string(),
        file_name,
        file_id: Some(file_id),
        media_kind,
        metadata,
        category_id: None,
        grouping_key,
        file_size: Some(file_size),
        duration,
    })
}

/// Media posted by an admin becomes a new, uncategorized archive entry.
pub async fn archive_media(
    bot: Bot,
    msg: Message,
    catalog: Catalog,
    config: std::sync::Arc<Config>,
) -> HandlerResult {
    let Some(admin) = msg.from.as_ref() else {
        return Ok(());
    };
    if !config.is_admin(admin.id) {
        info!("Ignoring media from non-admin {}", admin.id);
        return Ok(());
    }

    let Some(record) = archive_record(&msg) else {
        return Ok(());
    };
    let summary = record.metadata.summary_lines();
    let key = record.grouping_key.clone();

    let id = match catalog.add_video(&record).await {
        Ok(id) => id,
        Err(e) => {
            error!("Archiving message {} from {} failed: {e}", msg.id.0, msg.chat.id);
            bot.send_message(msg.chat.id, "❌ Could not archive this file.").await?;
            return Ok(());
        }
    };
    record_action(&bot, &catalog, &config, admin, "archive_video", Some(&format!("video {id}: {}", record.title))).await;

    let mut text = format!("✅ Archived as #{id}: {}", record.title);
    if !summary.is_empty() {
        text.push_str(&format!("\n\n{}", summary.join("\n")));
    }
    text.push_str(&format!("\n🔑 {key}"));

    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![CallbackAction::PickVideoCategory { video: id, page: 1 }.button("📂 Assign category")],
        vec![CallbackAction::Video(id).button("🎬 Open")],
    ]);
    show(&bot, Target::New(msg.chat.id), Screen::new(text, keyboard)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide_tests::{MockMessageDocument, MockMessageVideo};

    #[test]
    fn unnamed_document_gets_a_placeholder_name() {
        let record = archive_record(&MockMessageDocument::new().id(7).build()).unwrap();
        assert_eq!(record.media_kind, MediaKind::Document);
        assert_eq!(record.file_name, "document_7");
        assert_eq!(record.title, "Video 7");
        assert_eq!(record.duration, None);
    }

    #[test]
    fn unnamed_video_keeps_kind_and_runtime() {
        let record = archive_record(&MockMessageVideo::new().id(9).build()).unwrap();
        assert_eq!(record.media_kind, MediaKind::Video);
        assert_eq!(record.file_name, "video_9.mp4");
        assert_eq!(record.duration, Some(52));
    }

    #[test]
    fn video_file_sent_as_document_stays_a_document() {
        let msg = MockMessageDocument::new().file_name("show.s01e02.mkv").build();
        let record = archive_record(&msg).unwrap();
        assert_eq!(record.media_kind, MediaKind::Document);
        assert_eq!(record.file_name, "show.s01e02.mkv");
        assert_eq!(record.metadata.season_number, Some(1));
        assert_eq!(record.metadata.episode_number, Some(2));
    }

    #[test]
    fn category_names_are_bounded() {
        assert_eq!(valid_category_name("  Anime "), Some("Anime"));
        assert_eq!(valid_category_name("   "), None);
        assert_eq!(valid_category_name(&"x".repeat(65)), None);
        assert_eq!(valid_category_name(&"ب".repeat(64)).map(|n| n.chars().count()), Some(64));
    }

    #[tokio::test]
    async fn panel_counts_uncategorized() {
        let catalog = Catalog::in_memory().await.unwrap();
        catalog.add_video(&NewVideo::default()).await.unwrap();

        let screen = panel_screen(&catalog).await;
        assert!(screen.text.contains("1 videos (1 uncategorized)"));
    }

    #[tokio::test]
    async fn picker_skips_the_source_category() {
        let catalog = Catalog::in_memory().await.unwrap();
        let from = catalog.create_category("From", None).await.unwrap();
        catalog.create_category("To", None).await.unwrap();

        let screen = category_picker(
            &catalog,
            "Move to:".to_string(),
            1,
            Some(from.id),
            |to| CallbackAction::MoveVideos { from: from.id, to },
            |page| CallbackAction::PickMoveTarget { from: from.id, page },
            CallbackAction::ManageCategory(from.id),
        )
        .await;
        // One target plus the back row.
        assert_eq!(screen.keyboard.inline_keyboard.len(), 2);
    }

    #[tokio::test]
    async fn empty_logs_say_so() {
        let catalog = Catalog::in_memory().await.unwrap();
        let screen = logs_screen(&catalog).await;
        assert!(screen.text.contains("No admin actions"));
    }
}

//! Callback data and the inline keyboards that carry it.
//!
//! Telegram caps callback data at 64 bytes, so actions travel as compact
//! `tag:arg:arg` strings. A category id of `0` in a `Option<i64>` slot means
//! "the root".

use std::fmt;
use std::str::FromStr;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use thiserror::Error;

use crate::catalog::Video;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Menu,
    /// Ask for a search text, optionally limited to one category.
    Search { category: Option<i64> },
    Categories { page: u32 },
    Category { id: i64, page: u32 },
    Favorites,
    History,
    Popular,
    Recent,
    Stats,
    Help,
    Video(i64),
    Download(i64),
    ToggleFavorite(i64),
    CancelInput,

    AdminPanel,
    AdminStats,
    AdminCategories { parent: Option<i64> },
    ManageCategory(i64),
    CreateCategory { parent: Option<i64> },
    RenameCategory(i64),
    DeleteCategory(i64),
    PickMoveTarget { from: i64, page: u32 },
    MoveVideos { from: i64, to: i64 },
    Uncategorized,
    PickVideoCategory { video: i64, page: u32 },
    AssignVideo { video: i64, category: i64 },
    DeleteVideo(i64),
    ConfirmDeleteVideo(i64),
    Cleanup,
    ConfirmCleanup,
    Broadcast,
    Logs,
    Users,
}

impl CallbackAction {
    /// Actions only administrators may trigger.
    pub fn is_admin_only(&self) -> bool {
        use CallbackAction::*;
        matches!(
            self,
            AdminPanel
                | AdminStats
                | AdminCategories { .. }
                | ManageCategory(_)
                | CreateCategory { .. }
                | RenameCategory(_)
                | DeleteCategory(_)
                | PickMoveTarget { .. }
                | MoveVideos { .. }
                | Uncategorized
                | PickVideoCategory { .. }
                | AssignVideo { .. }
                | DeleteVideo(_)
                | ConfirmDeleteVideo(_)
                | Cleanup
                | ConfirmCleanup
                | Broadcast
                | Logs
                | Users
        )
    }

    /// Actions that leave the chat waiting for a text message.
    pub fn awaits_input(&self) -> bool {
        use CallbackAction::*;
        matches!(self, Search { .. } | CreateCategory { .. } | RenameCategory(_) | Broadcast)
    }

    pub fn button(self, label: impl Into<String>) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(label, self.to_string())
    }
}

fn root_or(id: Option<i64>) -> i64 {
    id.unwrap_or(0)
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CallbackAction::*;
        match self {
            Menu => write!(f, "menu"),
            Search { category } => write!(f, "search:{}", root_or(*category)),
            Categories { page } => write!(f, "cats:{page}"),
            Category { id, page } => write!(f, "cat:{id}:{page}"),
            Favorites => write!(f, "fav"),
            History => write!(f, "hist"),
            Popular => write!(f, "pop"),
            Recent => write!(f, "new"),
            Stats => write!(f, "stats"),
            Help => write!(f, "help"),
            Video(id) => write!(f, "v:{id}"),
            Download(id) => write!(f, "dl:{id}"),
            ToggleFavorite(id) => write!(f, "tf:{id}"),
            CancelInput => write!(f, "cancel"),
            AdminPanel => write!(f, "a:panel"),
            AdminStats => write!(f, "a:stats"),
            AdminCategories { parent } => write!(f, "a:cats:{}", root_or(*parent)),
            ManageCategory(id) => write!(f, "a:cm:{id}"),
            CreateCategory { parent } => write!(f, "a:cc:{}", root_or(*parent)),
            RenameCategory(id) => write!(f, "a:cr:{id}"),
            DeleteCategory(id) => write!(f, "a:cd:{id}"),
            PickMoveTarget { from, page } => write!(f, "a:mf:{from}:{page}"),
            MoveVideos { from, to } => write!(f, "a:mt:{from}:{to}"),
            Uncategorized => write!(f, "a:unc"),
            PickVideoCategory { video, page } => write!(f, "a:vm:{video}:{page}"),
            AssignVideo { video, category } => write!(f, "a:va:{video}:{category}"),
            DeleteVideo(id) => write!(f, "a:vd:{id}"),
            ConfirmDeleteVideo(id) => write!(f, "a:vdy:{id}"),
            Cleanup => write!(f, "a:clean"),
            ConfirmCleanup => write!(f, "a:cleany"),
            Broadcast => write!(f, "a:bc"),
            Logs => write!(f, "a:logs"),
            Users => write!(f, "a:users"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown callback data {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for CallbackAction {
    type Err = UnknownAction;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        use CallbackAction::*;

        let unknown = || UnknownAction(data.to_string());
        let parts: Vec<&str> = data.split(':').collect();
        let int = |i: usize| -> Result<i64, UnknownAction> {
            parts.get(i).and_then(|p| p.parse().ok()).ok_or_else(unknown)
        };
        let page = |i: usize| -> Result<u32, UnknownAction> {
            parts.get(i).and_then(|p| p.parse().ok()).ok_or_else(unknown)
        };
        let parent = |i: usize| -> Result<Option<i64>, UnknownAction> {
            int(i).map(|id| Some(id).filter(|id| *id != 0))
        };

        let action = match parts.as_slice() {
            ["menu"] => Menu,
            ["search", _] => Search { category: parent(1)? },
            ["cats", _] => Categories { page: page(1)? },
            ["cat", _, _] => Category { id: int(1)?, page: page(2)? },
            ["fav"] => Favorites,
            ["hist"] => History,
            ["pop"] => Popular,
            ["new"] => Recent,
            ["stats"] => Stats,
            ["help"] => Help,
            ["v", _] => Video(int(1)?),
            ["dl", _] => Download(int(1)?),
            ["tf", _] => ToggleFavorite(int(1)?),
            ["cancel"] => CancelInput,
            ["a", "panel"] => AdminPanel,
            ["a", "stats"] => AdminStats,
            ["a", "cats", _] => AdminCategories { parent: parent(2)? },
            ["a", "cm", _] => ManageCategory(int(2)?),
            ["a", "cc", _] => CreateCategory { parent: parent(2)? },
            ["a", "cr", _] => RenameCategory(int(2)?),
            ["a", "cd", _] => DeleteCategory(int(2)?),
            ["a", "mf", _, _] => PickMoveTarget { from: int(2)?, page: page(3)? },
            ["a", "mt", _, _] => MoveVideos { from: int(2)?, to: int(3)? },
            ["a", "unc"] => Uncategorized,
            ["a", "vm", _, _] => PickVideoCategory { video: int(2)?, page: page(3)? },
            ["a", "va", _, _] => AssignVideo { video: int(2)?, category: int(3)? },
            ["a", "vd", _] => DeleteVideo(int(2)?),
            ["a", "vdy", _] => ConfirmDeleteVideo(int(2)?),
            ["a", "clean"] => Cleanup,
            ["a", "cleany"] => ConfirmCleanup,
            ["a", "bc"] => Broadcast,
            ["a", "logs"] => Logs,
            ["a", "users"] => Users,
            _ => return Err(unknown()),
        };
        Ok(action)
    }
}

/// Button labels are cut to this many characters.
const LABEL_CHARS: usize = 48;

pub fn short_label(text: &str) -> String {
    if text.chars().count() <= LABEL_CHARS {
        return text.to_string();
    }
    let mut label: String = text.chars().take(LABEL_CHARS - 1).collect();
    label.push('…');
    label
}

pub fn main_menu(is_admin: bool) -> InlineKeyboardMarkup {
    use CallbackAction::*;

    let mut rows = vec![
        vec![
            Search { category: None }.button("🔍 Search"),
            InlineKeyboardButton::switch_inline_query_current_chat("⚡ Inline search", ""),
        ],
        vec![Categories { page: 1 }.button("📁 Categories")],
        vec![Favorites.button("⭐ Favorites"), History.button("🕘 History")],
        vec![Popular.button("🔥 Popular"), Recent.button("🆕 Recent")],
        vec![Stats.button("📊 Statistics"), Help.button("❓ Help")],
    ];
    if is_admin {
        rows.push(vec![AdminPanel.button("🛠 Admin panel")]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn single(action: CallbackAction, label: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![action.button(label)]])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    single(CallbackAction::Menu, "🏠 Main menu")
}

pub fn cancel_input() -> InlineKeyboardMarkup {
    single(CallbackAction::CancelInput, "✖ Cancel")
}

/// One button per video, each opening its details.
pub fn video_rows(videos: &[Video]) -> Vec<Vec<InlineKeyboardButton>> {
    videos
        .iter()
        .map(|video| {
            let label = format!("🎬 {} · 👁 {}", video.display_title(), video.view_count);
            vec![CallbackAction::Video(video.id).button(short_label(&label))]
        })
        .collect()
}

/// `« prev  page/total  next »`, or nothing for a single page.
pub fn pagination_row(
    page: u32,
    total_pages: u32,
    to_page: impl Fn(u32) -> CallbackAction,
) -> Option<Vec<InlineKeyboardButton>> {
    if total_pages <= 1 {
        return None;
    }
    let mut row = Vec::new();
    if page > 1 {
        row.push(to_page(page - 1).button("« Prev"));
    }
    row.push(to_page(page).button(format!("{page}/{total_pages}")));
    if page < total_pages {
        row.push(to_page(page + 1).button("Next »"));
    }
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_parses_back() {
        use CallbackAction::*;
        let actions = [
            Menu,
            Search { category: None },
            Search { category: Some(4) },
            Categories { page: 3 },
            Category { id: 12, page: 2 },
            Video(99),
            ToggleFavorite(5),
            AdminCategories { parent: None },
            AdminCategories { parent: Some(4) },
            CreateCategory { parent: Some(7) },
            PickMoveTarget { from: 1, page: 2 },
            MoveVideos { from: 1, to: 2 },
            AssignVideo { video: 10, category: 3 },
            ConfirmDeleteVideo(8),
            ConfirmCleanup,
            Users,
        ];
        for action in actions {
            let data = action.to_string();
            assert!(data.len() <= 64, "{data} is too long");
            assert_eq!(data.parse::<CallbackAction>(), Ok(action));
        }
    }

    #[test]
    fn root_parent_is_zero() {
        assert_eq!(CallbackAction::CreateCategory { parent: None }.to_string(), "a:cc:0");
        assert_eq!(
            "a:cats:0".parse::<CallbackAction>(),
            Ok(CallbackAction::AdminCategories { parent: None })
        );
    }

    #[test]
    fn garbage_is_rejected() {
        for data in ["", "search", "v", "v:abc", "cat:1", "a:nope", "delete_AgAD"] {
            assert!(data.parse::<CallbackAction>().is_err(), "{data}");
        }
    }

    #[test]
    fn admin_actions_are_flagged() {
        assert!(CallbackAction::Cleanup.is_admin_only());
        assert!(CallbackAction::AssignVideo { video: 1, category: 2 }.is_admin_only());
        assert!(!CallbackAction::Download(1).is_admin_only());
    }

    #[test]
    fn input_prompts_are_flagged() {
        assert!(CallbackAction::Search { category: Some(2) }.awaits_input());
        assert!(CallbackAction::CreateCategory { parent: None }.awaits_input());
        assert!(!CallbackAction::Menu.awaits_input());
        assert!(!CallbackAction::ManageCategory(3).awaits_input());
    }

    #[test]
    fn pagination_hides_single_page() {
        assert!(pagination_row(1, 1, |page| CallbackAction::Categories { page }).is_none());
        let row = pagination_row(2, 3, |page| CallbackAction::Categories { page }).unwrap();
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn long_labels_are_cut() {
        let label = short_label(&"x".repeat(100));
        assert_eq!(label.chars().count(), LABEL_CHARS);
        assert!(label.ends_with('…'));
    }
}

//! CSS selector catalogs for the Discourse front end.
//!
//! Discourse themes move elements around, so every lookup is an ordered
//! fallback chain tried front to back until one variant matches.

pub const LOGIN_BUTTON: &[&str] = &[
    ".login-button",
    ".header-buttons .login-button",
    "button[data-action='showLogin']",
    "[class*='login']",
    "a[href*='login']",
];

pub const USERNAME_FIELD: &[&str] = &[
    "#login-account-name",
    "input[name='username']",
    "input[name='login']",
    "input[type='text']",
];

pub const PASSWORD_FIELD: &[&str] = &[
    "#login-account-password",
    "input[name='password']",
    "input[type='password']",
];

pub const SUBMIT_BUTTON: &[&str] = &[
    "#login-button",
    "button[type='submit']",
    ".btn-primary",
    "input[type='submit']",
    "button.login-button",
];

pub const LOGGED_IN_MARKER: &[&str] = &[
    "#current-user",
    ".current-user",
    ".header-dropdown-toggle",
    "a[href*='user']",
];

pub const LIKE_BUTTON: &[&str] = &[
    ".btn-toggle-reaction-like",
    ".like-button",
    "[data-action='like']",
    "button[class*='like']",
    ".fa-heart",
    ".fa-thumbs-up",
    "[title*='Like']",
];

/// A like button whose title contains one of these is already toggled on;
/// clicking it would undo the like.
pub const UNDO_LIKE_WORDS: &[&str] = &["remove", "unlike", "undo"];

/// Topic rows in the listing snapshot (parsed, not clicked).
pub const TOPIC_ROW: &str =
    "tr.topic-list-item, .topic-list tbody tr, .topic-list-item";

pub const TOPIC_TITLE: &str =
    ".title a, .main-link a.title, .topic-title a, h3 a";

pub const TOPIC_VIEWS: &str = ".num.views .number, .views .number, .views-column";

pub const PINNED_MARKER: &str =
    "[class*='pinned'], [class*='sticky'], [class*='announcement'], .pinned-icon, .fa-thumb-tack";

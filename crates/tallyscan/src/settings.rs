//! User settings and view state.
//!
//! [`Settings`] is plain data that can be changed key by key from the CLI.
//! [`SettingsStore`] keeps the current settings in an observable [`Store`]
//! and writes every change through to [`Storage`].

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DefaultsConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::store::Store;
use crate::transaction::{validate_currency, Category, DEFAULT_CURRENCY};

/// Largest allowed page size.
pub const MAX_PAGE_SIZE: usize = 500;

/// Colour theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Light theme.
    Light,
    /// Dark theme.
    Dark,
    /// Follow the system preference.
    #[default]
    System,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
            Self::System => write!(f, "system"),
        }
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            _ => Err(Error::validation("theme", format!("unknown theme '{s}'"))),
        }
    }
}

/// Top-level screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Overview of recent spending.
    #[default]
    Dashboard,
    /// Transaction history.
    History,
    /// Receipt scanning.
    Scan,
    /// Period reports.
    Reports,
    /// Settings.
    Settings,
}

impl View {
    /// Every view.
    pub const ALL: [Self; 5] = [
        Self::Dashboard,
        Self::History,
        Self::Scan,
        Self::Reports,
        Self::Settings,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::History => "history",
            Self::Scan => "scan",
            Self::Reports => "reports",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| Error::validation("view", format!("unknown view '{s}'")))
    }
}

/// Which screen is shown and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    /// The current screen.
    pub current: View,
    /// Category filter for the history screen.
    pub history_category: Option<Category>,
    /// Rows per page in listings.
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current: View::Dashboard,
            history_category: None,
            page_size: 20,
        }
    }
}

impl ViewState {
    /// Switch screens.
    pub fn navigate(&mut self, view: View) {
        self.current = view;
    }

    /// Open the history screen filtered by `category` (or unfiltered).
    pub fn show_history(&mut self, category: Option<Category>) {
        self.current = View::History;
        self.history_category = category;
    }
}

/// User settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Currency for new transactions.
    pub currency: String,
    /// First day of the week for weekly reports.
    pub week_start: Weekday,
    /// Colour theme.
    pub theme: Theme,
    /// Category used when none can be inferred.
    pub default_category: Category,
    /// View state.
    pub view: ViewState,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            week_start: Weekday::Mon,
            theme: Theme::default(),
            default_category: Category::Other,
            view: ViewState::default(),
        }
    }
}

impl From<&DefaultsConfig> for Settings {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            currency: defaults.currency.clone(),
            week_start: defaults.week_start,
            view: ViewState {
                page_size: defaults.page_size,
                ..ViewState::default()
            },
            ..Self::default()
        }
    }
}

impl Settings {
    /// Keys accepted by [`Settings::set`] and [`Settings::get`].
    pub const KEYS: [&'static str; 7] = [
        "currency",
        "week_start",
        "theme",
        "default_category",
        "view",
        "history_category",
        "page_size",
    ];

    /// Read one setting as text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSetting`] for an unknown key.
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "currency" => self.currency.clone(),
            "week_start" => self.week_start.to_string(),
            "theme" => self.theme.to_string(),
            "default_category" => self.default_category.to_string(),
            "view" => self.view.current.to_string(),
            "history_category" => self
                .view
                .history_category
                .map_or_else(|| "all".to_string(), |c| c.to_string()),
            "page_size" => self.view.page_size.to_string(),
            _ => return Err(unknown(key)),
        };
        Ok(value)
    }

    /// Change one setting from text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSetting`] for an unknown key and
    /// [`Error::Validation`] for a value the key does not accept. The
    /// settings are unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "currency" => {
                let code = value.to_uppercase();
                validate_currency(&code)?;
                self.currency = code;
            }
            "week_start" => {
                self.week_start = value.parse().map_err(|_| {
                    Error::validation("week_start", format!("unknown weekday '{value}'"))
                })?;
            }
            "theme" => self.theme = value.parse()?,
            "default_category" => self.default_category = value.parse()?,
            "view" => self.view.current = value.parse()?,
            "history_category" => {
                self.view.history_category = match value.to_lowercase().as_str() {
                    "" | "all" | "none" => None,
                    _ => Some(value.parse()?),
                };
            }
            "page_size" => {
                let size: usize = value.parse().map_err(|_| {
                    Error::validation("page_size", format!("'{value}' is not a number"))
                })?;
                if size == 0 || size > MAX_PAGE_SIZE {
                    return Err(Error::validation(
                        "page_size",
                        format!("must be between 1 and {MAX_PAGE_SIZE}"),
                    ));
                }
                self.view.page_size = size;
            }
            _ => return Err(unknown(key)),
        }
        Ok(())
    }
}

fn unknown(key: &str) -> Error {
    Error::UnknownSetting {
        key: key.to_string(),
    }
}

/// Observable settings backed by storage.
#[derive(Debug)]
pub struct SettingsStore {
    store: Store<Settings>,
}

impl SettingsStore {
    /// Load saved settings, falling back to `defaults`.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved settings cannot be read.
    pub fn load(storage: &Storage, defaults: &DefaultsConfig) -> Result<Self> {
        let settings = match storage.load_settings()? {
            Some(settings) => settings,
            None => {
                debug!("No saved settings, using defaults");
                Settings::from(defaults)
            }
        };
        Ok(Self {
            store: Store::new("settings", settings),
        })
    }

    /// The underlying observable store.
    #[must_use]
    pub fn store(&self) -> &Store<Settings> {
        &self.store
    }

    /// Current settings.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.store.snapshot()
    }

    /// Change one setting and persist it.
    ///
    /// Listeners only see the change once it has been saved.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad key or value, or a storage error
    /// if saving fails.
    pub fn set(&self, storage: &Storage, key: &str, value: &str) -> Result<Settings> {
        let mut next = self.snapshot();
        next.set(key, value)?;
        storage.save_settings(&next)?;
        info!(key, value, "Setting changed");
        self.store.update(|s| *s = next.clone());
        Ok(next)
    }

    /// Switch screens and persist the view state.
    ///
    /// # Errors
    ///
    /// Returns a storage error if saving fails.
    pub fn navigate(&self, storage: &Storage, view: View) -> Result<()> {
        let mut next = self.snapshot();
        next.view.navigate(view);
        storage.save_settings(&next)?;
        self.store.update(|s| *s = next);
        Ok(())
    }

    /// Restore `defaults` and persist them.
    ///
    /// # Errors
    ///
    /// Returns a storage error if saving fails.
    pub fn reset(&self, storage: &Storage, defaults: &DefaultsConfig) -> Result<Settings> {
        let settings = Settings::from(defaults);
        storage.save_settings(&settings)?;
        info!("Settings reset to defaults");
        self.store.update(|s| *s = settings.clone());
        Ok(settings)
    }
}

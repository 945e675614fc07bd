use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::BillingConfig;

/// Read-only access to the billing platform credential.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
}

/// A fixed (or absent) token; handy for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenStore for StaticToken {
    fn get(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub access_token: Option<String>,
    pub billing: BillingConfig,
    /// Overrides the summarizer endpoint, mostly for local proxies.
    pub summarizer_base_url: Option<String>,
    pub platform_base_url: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn billing(&self) -> BillingConfig {
        self.read().billing.clone()
    }

    pub fn set_access_token(&self, token: Option<String>) -> Result<()> {
        let mut guard = self.write();
        guard.access_token = token;
        self.persist(&guard)
    }

    pub fn update_billing(&self, billing: BillingConfig) -> Result<()> {
        let mut guard = self.write();
        guard.billing = billing;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for SettingsStore {
    fn get(&self) -> Option<String> {
        self.read()
            .access_token
            .clone()
            .filter(|token| !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.get(), None);
        store.set_access_token(Some("abc".into())).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.get().as_deref(), Some("abc"));
    }

    #[test]
    fn blank_token_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        store.set_access_token(Some("   ".into())).unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.billing(), BillingConfig::default());
    }
}

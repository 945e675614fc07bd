//! Where finished entries go: the local database first, then the billing
//! platform when a token is available.

mod platform;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use platform::{ActivityPayload, ClioSync, PlatformReceipt, PlatformSync, CLIO_BASE_URL};

use crate::{
    db::{Database, StoredEntry},
    submission::BillableEntry,
};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
    pub platform_synced: bool,
}

/// Persistence contract used by the submission pipeline.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn submit(&self, entry: &BillableEntry, token: Option<&str>) -> Result<SubmitResponse>;
}

pub struct LocalEntryStore {
    db: Database,
    platform: Option<Arc<dyn PlatformSync>>,
}

impl LocalEntryStore {
    pub fn new(db: Database, platform: Option<Arc<dyn PlatformSync>>) -> Self {
        Self { db, platform }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn sync(&self, stored: &StoredEntry, token: Option<&str>) -> bool {
        let (Some(platform), Some(token)) = (&self.platform, token) else {
            return false;
        };
        match platform.push(stored, token).await {
            Ok(receipt) => {
                if let Err(err) = self.db.mark_entry_synced(&stored.id, receipt.id).await {
                    log_warn!("entry {} synced but not marked: {err:#}", stored.id);
                }
                true
            }
            Err(err) => {
                log_warn!("platform sync failed for {}, kept locally: {err:#}", stored.id);
                false
            }
        }
    }
}

#[async_trait]
impl EntryStore for LocalEntryStore {
    async fn submit(&self, entry: &BillableEntry, token: Option<&str>) -> Result<SubmitResponse> {
        let stored = StoredEntry::from_entry(Uuid::new_v4().to_string(), entry);
        if let Err(err) = self.db.insert_entry(&stored).await {
            return Ok(SubmitResponse {
                success: false,
                id: None,
                error: Some(format!("Failed to save locally: {err:#}")),
                platform_synced: false,
            });
        }
        log_info!("entry {} saved locally", stored.id);

        let platform_synced = self.sync(&stored, token).await;
        Ok(SubmitResponse {
            success: true,
            id: Some(stored.id),
            error: None,
            platform_synced,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;
    use crate::submission::EmailFields;

    struct FakePlatform {
        fail: bool,
        pushed: Mutex<Vec<(String, String)>>,
    }

    impl FakePlatform {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                pushed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PlatformSync for FakePlatform {
        async fn push(&self, entry: &StoredEntry, token: &str) -> Result<PlatformReceipt> {
            self.pushed
                .lock()
                .unwrap()
                .push((entry.id.clone(), token.to_string()));
            if self.fail {
                return Err(anyhow!("Clio authentication expired"));
            }
            Ok(PlatformReceipt {
                id: Some("remote-1".into()),
            })
        }
    }

    fn entry() -> BillableEntry {
        BillableEntry::new(
            EmailFields {
                recipient: "jane@acme.com".into(),
                subject: "Deposition".into(),
                content: "Confirming Tuesday.".into(),
            },
            0.1,
            "Scheduled deposition".into(),
        )
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("entries.db")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn saves_locally_without_token() {
        let (_dir, db) = open();
        let platform = FakePlatform::new(false);
        let store = LocalEntryStore::new(db.clone(), Some(platform.clone()));

        let resp = store.submit(&entry(), None).await.unwrap();
        assert!(resp.success);
        assert!(!resp.platform_synced);
        assert!(platform.pushed.lock().unwrap().is_empty());

        let saved = db.get_entry(resp.id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(saved.summary, "Scheduled deposition");
        assert_eq!(saved.client, "Jane");
    }

    #[tokio::test]
    async fn successful_sync_marks_entry() {
        let (_dir, db) = open();
        let platform = FakePlatform::new(false);
        let store = LocalEntryStore::new(db.clone(), Some(platform.clone()));

        let resp = store.submit(&entry(), Some("tok")).await.unwrap();
        assert!(resp.platform_synced);
        let id = resp.id.unwrap();
        assert_eq!(platform.pushed.lock().unwrap()[0], (id.clone(), "tok".to_string()));

        let saved = db.get_entry(&id).await.unwrap().unwrap();
        assert!(saved.platform_synced);
        assert_eq!(saved.platform_id.as_deref(), Some("remote-1"));
    }

    #[tokio::test]
    async fn failed_sync_still_succeeds() {
        let (_dir, db) = open();
        let store = LocalEntryStore::new(db.clone(), Some(FakePlatform::new(true)));

        let resp = store.submit(&entry(), Some("tok")).await.unwrap();
        assert!(resp.success);
        assert!(!resp.platform_synced);
        let saved = db.get_entry(&resp.id.unwrap()).await.unwrap().unwrap();
        assert!(!saved.platform_synced);
    }
}

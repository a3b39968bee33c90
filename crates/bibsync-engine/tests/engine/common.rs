//! Shared fixtures: a scripted in-process remote plus store/vault setup

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bibsync_core::domain::{
    Group, LibraryId, ObjectKey, ObjectKind, SyncDirection, Version, Watermarks,
};
use bibsync_core::ports::library_service::{
    AttachmentContent, KeyInfo, LibraryService, RegisterOutcome, RemoteDeletions, RemoteGroup,
    RemoteObject, UploadAuthorization, UploadRequest, UploadTicket, VersionListing, WriteFailure,
    WriteOutcome, WrittenObject, FETCH_BATCH_LIMIT,
};
use bibsync_core::ports::VersionedStore;
use bibsync_engine::GroupOrchestrator;
use bibsync_store::{DatabasePool, SqliteVersionedStore};
use bibsync_vault::{md5_hex, MemoryVault};

/// The alphabet remote keys are minted from
const KEY_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// One object as the fake remote stores it
#[derive(Debug, Clone)]
pub struct RemoteRec {
    pub version: u64,
    pub data: serde_json::Value,
}

/// Mutable state of the fake remote
#[derive(Debug, Default)]
pub struct RemoteState {
    /// Monotonic library-wide version counter
    pub library_version: u64,
    /// Objects per kind, keyed by key string
    pub objects: HashMap<ObjectKind, BTreeMap<String, RemoteRec>>,
    /// Tombstone feed served by `deletions`
    pub deleted: RemoteDeletions,
    /// Binary content per item key
    pub attachments: HashMap<String, Vec<u8>>,
    /// Counter for minted keys
    pub key_counter: u64,
    /// Payload titles that always fail with 412 on write
    pub fail_titles: HashSet<String>,
    /// Payload titles reported as unchanged on write
    pub unchanged_titles: HashSet<String>,
    /// Kinds whose version listing errors out (phase-failure scripting)
    pub fail_listing: HashSet<ObjectKind>,
    /// MD5 digests the remote claims to already have
    pub existing_md5s: HashSet<String>,
    /// When set, registration answers ContentChanged (concurrent edit)
    pub register_conflict: bool,
}

/// Call accounting for assertions
#[derive(Debug, Default)]
pub struct CallLog {
    pub total: usize,
    pub list_versions: Vec<(ObjectKind, u64)>,
    pub fetch_batches: Vec<usize>,
    pub write_batches: Vec<usize>,
    pub delete_batches: Vec<usize>,
    pub deletion_feeds: usize,
    pub authorizations: usize,
    pub payload_uploads: usize,
    pub registrations: usize,
    pub attachment_downloads: usize,
}

/// Scripted in-process implementation of the `LibraryService` port
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub state: Mutex<RemoteState>,
    pub calls: Mutex<CallLog>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one remote object and returns its key
    pub fn seed_object(&self, kind: ObjectKind, key: &str, version: u64, data: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        state.library_version = state.library_version.max(version);
        state
            .objects
            .entry(kind)
            .or_default()
            .insert(key.to_string(), RemoteRec { version, data });
    }

    /// Mints an 8-character key from the ambiguity-free alphabet
    fn mint_key(state: &mut RemoteState) -> String {
        state.key_counter += 1;
        let mut n = state.key_counter;
        let mut out = [b'2'; 8];
        for slot in out.iter_mut().rev() {
            *slot = KEY_ALPHABET[(n % KEY_ALPHABET.len() as u64) as usize];
            n /= KEY_ALPHABET.len() as u64;
        }
        String::from_utf8(out.to_vec()).unwrap()
    }

    fn bump(&self) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.total += 1;
        calls.total
    }
}

#[async_trait::async_trait]
impl LibraryService for FakeRemote {
    async fn group_versions(&self) -> anyhow::Result<HashMap<LibraryId, Version>> {
        self.bump();
        let state = self.state.lock().unwrap();
        let mut out = HashMap::new();
        out.insert(lib(451), Version::new(state.library_version));
        Ok(out)
    }

    async fn group(&self, library: LibraryId) -> anyhow::Result<RemoteGroup> {
        self.bump();
        let state = self.state.lock().unwrap();
        Ok(RemoteGroup {
            id: library,
            version: Version::new(state.library_version),
            data: serde_json::json!({"name": "fixture group"}),
        })
    }

    async fn list_versions(
        &self,
        _library: LibraryId,
        kind: ObjectKind,
        since: Version,
    ) -> anyhow::Result<VersionListing> {
        self.bump();
        let state = self.state.lock().unwrap();
        self.calls
            .lock()
            .unwrap()
            .list_versions
            .push((kind, since.as_u64()));

        if state.fail_listing.contains(&kind) {
            anyhow::bail!("scripted listing failure for {kind}");
        }

        let mut versions = HashMap::new();
        if let Some(objects) = state.objects.get(&kind) {
            for (key, rec) in objects {
                if rec.version > since.as_u64() {
                    versions.insert(ObjectKey::new(key.clone()).unwrap(), Version::new(rec.version));
                }
            }
        }
        Ok(VersionListing {
            versions,
            last_modified: Version::new(state.library_version),
        })
    }

    async fn fetch_objects(
        &self,
        _library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
    ) -> anyhow::Result<Vec<RemoteObject>> {
        self.bump();
        assert!(
            keys.len() <= FETCH_BATCH_LIMIT,
            "fetch batch exceeded the remote hard limit: {}",
            keys.len()
        );
        self.calls.lock().unwrap().fetch_batches.push(keys.len());

        let state = self.state.lock().unwrap();
        let objects = state.objects.get(&kind);
        Ok(keys
            .iter()
            .filter_map(|key| {
                objects.and_then(|o| o.get(key.as_str())).map(|rec| RemoteObject {
                    key: key.clone(),
                    version: Version::new(rec.version),
                    data: rec.data.clone(),
                })
            })
            .collect())
    }

    async fn write_objects(
        &self,
        _library: LibraryId,
        kind: ObjectKind,
        payloads: &[serde_json::Value],
        _if_unmodified_since: Version,
    ) -> anyhow::Result<WriteOutcome> {
        self.bump();
        assert!(
            payloads.len() <= FETCH_BATCH_LIMIT,
            "write batch exceeded the remote hard limit: {}",
            payloads.len()
        );
        self.calls.lock().unwrap().write_batches.push(payloads.len());

        let mut state = self.state.lock().unwrap();
        state.library_version += 1;
        let stamped = state.library_version;

        let mut outcome = WriteOutcome {
            last_modified: Some(Version::new(stamped)),
            ..WriteOutcome::default()
        };

        for (index, payload) in payloads.iter().enumerate() {
            let title = payload
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            if state.fail_titles.contains(&title) {
                outcome.failed.insert(
                    index,
                    WriteFailure {
                        code: 412,
                        message: format!("object '{title}' changed upstream"),
                    },
                );
                continue;
            }

            let key = match payload.get("key").and_then(|v| v.as_str()) {
                Some(existing) => existing.to_string(),
                None => Self::mint_key(&mut state),
            };

            if state.unchanged_titles.contains(&title) {
                outcome
                    .unchanged
                    .insert(index, ObjectKey::new(key.clone()).unwrap());
                continue;
            }

            let mut stored = payload.clone();
            if let Some(map) = stored.as_object_mut() {
                map.remove("key");
                map.remove("version");
            }
            state.objects.entry(kind).or_default().insert(
                key.clone(),
                RemoteRec {
                    version: stamped,
                    data: stored,
                },
            );
            outcome.success.insert(
                index,
                WrittenObject {
                    key: ObjectKey::new(key).unwrap(),
                    version: Version::new(stamped),
                },
            );
        }

        Ok(outcome)
    }

    async fn delete_objects(
        &self,
        _library: LibraryId,
        kind: ObjectKind,
        keys: &[ObjectKey],
        _if_unmodified_since: Version,
    ) -> anyhow::Result<()> {
        self.bump();
        self.calls.lock().unwrap().delete_batches.push(keys.len());

        let mut state = self.state.lock().unwrap();
        state.library_version += 1;
        for key in keys {
            if let Some(objects) = state.objects.get_mut(&kind) {
                objects.remove(key.as_str());
            }
        }
        Ok(())
    }

    async fn deletions(
        &self,
        _library: LibraryId,
        since: Version,
    ) -> anyhow::Result<RemoteDeletions> {
        self.bump();
        self.calls.lock().unwrap().deletion_feeds += 1;
        let state = self.state.lock().unwrap();

        // Tombstones older than the caller's watermark are filtered out,
        // like the real feed.
        let mut feed = if state.deleted.last_modified > since {
            state.deleted.clone()
        } else {
            RemoteDeletions::default()
        };
        if feed.last_modified.is_zero() {
            feed.last_modified = Version::new(state.library_version);
        }
        Ok(feed)
    }

    async fn verify_key(&self) -> anyhow::Result<KeyInfo> {
        self.bump();
        Ok(KeyInfo {
            user_id: 1001,
            username: "fixture".to_string(),
            readable: vec![lib(451)],
            writable: vec![lib(451)],
        })
    }

    async fn authorize_upload(
        &self,
        _library: LibraryId,
        item: &ObjectKey,
        request: &UploadRequest,
        _previous_md5: Option<&str>,
    ) -> anyhow::Result<UploadAuthorization> {
        self.bump();
        self.calls.lock().unwrap().authorizations += 1;

        let state = self.state.lock().unwrap();
        if state.existing_md5s.contains(&request.md5) {
            return Ok(UploadAuthorization::Exists);
        }
        Ok(UploadAuthorization::Granted(UploadTicket {
            url: format!("https://storage.invalid/{item}"),
            content_type: "application/octet-stream".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            upload_key: format!("ticket-{item}"),
        }))
    }

    async fn upload_payload(&self, _ticket: &UploadTicket, _bytes: &[u8]) -> anyhow::Result<()> {
        self.bump();
        self.calls.lock().unwrap().payload_uploads += 1;
        Ok(())
    }

    async fn register_upload(
        &self,
        _library: LibraryId,
        item: &ObjectKey,
        _upload_key: &str,
        _previous_md5: Option<&str>,
    ) -> anyhow::Result<RegisterOutcome> {
        self.bump();
        self.calls.lock().unwrap().registrations += 1;

        let state = self.state.lock().unwrap();
        if state.register_conflict {
            return Ok(RegisterOutcome::ContentChanged);
        }
        let _ = item;
        Ok(RegisterOutcome::Registered)
    }

    async fn download_attachment(
        &self,
        _library: LibraryId,
        item: &ObjectKey,
    ) -> anyhow::Result<AttachmentContent> {
        self.bump();
        self.calls.lock().unwrap().attachment_downloads += 1;

        let state = self.state.lock().unwrap();
        let bytes = state
            .attachments
            .get(item.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no remote binary for {item}"))?;
        let etag = md5_hex(&bytes);
        Ok(AttachmentContent {
            bytes,
            etag: Some(etag),
        })
    }
}

// ============================================================================
// Fixture assembly
// ============================================================================

/// Everything a test needs to drive cycles
pub struct Fixture {
    pub remote: Arc<FakeRemote>,
    pub store: Arc<SqliteVersionedStore>,
    pub vault: Arc<MemoryVault>,
    pub orchestrator: GroupOrchestrator,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteVersionedStore::new(pool.pool().clone()));
        let remote = Arc::new(FakeRemote::new());
        let vault = Arc::new(MemoryVault::new());
        let orchestrator =
            GroupOrchestrator::new(remote.clone(), store.clone(), vault.clone());
        Self {
            remote,
            store,
            vault,
            orchestrator,
        }
    }

    /// Creates the fixture group with a direction and item watermark
    pub async fn seed_group(&self, direction: SyncDirection, item_watermark: u64) -> Group {
        let mut group = self.store.ensure_group(lib(451)).await.unwrap();
        group.set_direction(direction);
        self.store.save_group(&group).await.unwrap();

        if item_watermark > 0 {
            let mut marks = Watermarks::default();
            marks.observe(ObjectKind::Item, Version::new(item_watermark));
            self.store.commit_watermarks(lib(451), &marks).await.unwrap();
        }
        self.store.group(lib(451)).await.unwrap().unwrap()
    }

    /// Reloads the fixture group
    pub async fn group(&self) -> Group {
        self.store.group(lib(451)).await.unwrap().unwrap()
    }
}

pub fn lib(id: i64) -> LibraryId {
    LibraryId::new(id).unwrap()
}

pub fn key(s: &str) -> ObjectKey {
    ObjectKey::new(s).unwrap()
}

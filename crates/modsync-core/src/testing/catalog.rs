//! In-process fake of the remote catalog.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexSet;
use tokio::sync::{Notify, Semaphore};

use super::fs::MemoryFileSystem;
use super::lock;
use crate::domain::{FileMetadata, ModId, ModInfo, PagedResponse, SubmittedModfile};
use crate::error::{ModError, ModResult};
use crate::ports::{ApiCall, ApiRequest, CachePolicy, FileSystemPort, ProgressSink, TransportPort};

const CHUNK: usize = 64 * 1024;

/// Which fake endpoint a queued failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeCall {
    GetMod,
    Subscribe,
    Unsubscribe,
    ListSubscriptions,
    Download,
    Upload,
}

impl FakeCall {
    const fn of(request: &ApiRequest) -> Self {
        match request {
            ApiRequest::GetMod { .. } => Self::GetMod,
            ApiRequest::SubscribeToMod { .. } => Self::Subscribe,
            ApiRequest::UnsubscribeFromMod { .. } => Self::Unsubscribe,
            ApiRequest::ListUserSubscriptions { .. } => Self::ListSubscriptions,
            ApiRequest::SubmitModfile { .. } => Self::Upload,
        }
    }
}

/// A catalog holding mods, payloads and one user's subscriptions.
///
/// Downloads are written into the shared [`MemoryFileSystem`].
pub struct FakeCatalog {
    fs: Arc<MemoryFileSystem>,
    mods: Mutex<BTreeMap<ModId, ModInfo>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    subscribed: Mutex<IndexSet<ModId>>,
    failures: Mutex<HashMap<FakeCall, VecDeque<ModError>>>,
    requests: Mutex<Vec<ApiRequest>>,
    uploads: Mutex<Vec<(ModId, Vec<u8>)>>,
    downloads: AtomicUsize,
    next_file_id: AtomicI64,
    download_gate: Mutex<Option<Arc<Semaphore>>>,
    download_started: Arc<Notify>,
}

impl FakeCatalog {
    pub fn new(fs: Arc<MemoryFileSystem>) -> Self {
        Self {
            fs,
            mods: Mutex::new(BTreeMap::new()),
            payloads: Mutex::new(HashMap::new()),
            subscribed: Mutex::new(IndexSet::new()),
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            downloads: AtomicUsize::new(0),
            next_file_id: AtomicI64::new(1),
            download_gate: Mutex::new(None),
            download_started: Arc::new(Notify::new()),
        }
    }

    /// Publish a mod whose live modfile contains `payload`.
    pub fn add_mod(&self, id: i64, payload: impl Into<Vec<u8>>) -> ModInfo {
        let id = ModId::new(id);
        let payload = payload.into();
        let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("https://cdn.test/{id}/{file_id}.zip");
        let modfile = FileMetadata::new(file_id, id, format!("{id}.zip"), payload.len() as u64)
            .with_url(url.clone());
        let info = ModInfo::new(id, format!("Mod {id}")).with_modfile(modfile);

        lock(&self.payloads).insert(url, payload);
        lock(&self.mods).insert(id, info.clone());
        info
    }

    /// Publish a new modfile for an existing mod.
    pub fn publish_update(&self, id: i64, payload: impl Into<Vec<u8>>) -> ModInfo {
        self.add_mod(id, payload)
    }

    /// Replace a mod's profile verbatim.
    pub fn set_profile(&self, info: ModInfo) {
        lock(&self.mods).insert(info.id, info);
    }

    /// Subscribe the user server-side, as another device would.
    pub fn subscribe_remote(&self, id: i64) {
        lock(&self.subscribed).insert(ModId::new(id));
    }

    /// Unsubscribe the user server-side, as another device would.
    pub fn unsubscribe_remote(&self, id: i64) {
        lock(&self.subscribed).shift_remove(&ModId::new(id));
    }

    pub fn remote_subscriptions(&self) -> Vec<ModId> {
        lock(&self.subscribed).iter().copied().collect()
    }

    /// Fail the next call of `call` with `error`. Failures queue up.
    pub fn fail_next(&self, call: FakeCall, error: ModError) {
        lock(&self.failures).entry(call).or_default().push_back(error);
    }

    /// Every catalog request performed, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        lock(&self.requests).clone()
    }

    /// Number of downloads started.
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Mod ids and archive bytes of completed uploads.
    pub fn uploads(&self) -> Vec<(ModId, Vec<u8>)> {
        lock(&self.uploads).clone()
    }

    /// Hold every download until a permit is added to the returned semaphore.
    pub fn gate_downloads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *lock(&self.download_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Notified once per started download.
    pub fn download_started(&self) -> Arc<Notify> {
        Arc::clone(&self.download_started)
    }

    fn injected_failure(&self, call: FakeCall) -> ModResult<()> {
        match lock(&self.failures).get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn get_mod(&self, id: ModId) -> ModResult<ModInfo> {
        lock(&self.mods)
            .get(&id)
            .cloned()
            .ok_or_else(|| ModError::not_found(format!("mod {id}")))
    }

    fn list_subscriptions(&self, offset: u64, limit: u64) -> PagedResponse<ModInfo> {
        let ids = self.remote_subscriptions();
        let mods = lock(&self.mods);
        let all: Vec<ModInfo> = ids.iter().filter_map(|id| mods.get(id).cloned()).collect();
        let total = all.len() as u64;
        let data: Vec<ModInfo> = all
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        PagedResponse {
            result_count: data.len() as u64,
            result_offset: offset,
            result_limit: limit,
            result_total: total,
            data,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> ModResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ModError::invalid_response(e.to_string()))
}

#[async_trait]
impl TransportPort for FakeCatalog {
    async fn perform_request(&self, call: &ApiCall, _cache: CachePolicy) -> ModResult<Vec<u8>> {
        lock(&self.requests).push(call.request.clone());
        self.injected_failure(FakeCall::of(&call.request))?;
        if call.request.requires_auth() && call.access_token.is_none() {
            return Err(ModError::NotAuthenticated);
        }

        match &call.request {
            ApiRequest::GetMod { mod_id } => to_json(&self.get_mod(*mod_id)?),
            ApiRequest::SubscribeToMod { mod_id } => {
                let info = self.get_mod(*mod_id)?;
                if !lock(&self.subscribed).insert(*mod_id) {
                    return Err(ModError::already_performed("already subscribed"));
                }
                to_json(&info)
            }
            ApiRequest::UnsubscribeFromMod { mod_id } => {
                if !lock(&self.subscribed).shift_remove(mod_id) {
                    return Err(ModError::already_performed("not subscribed"));
                }
                Ok(Vec::new())
            }
            ApiRequest::ListUserSubscriptions { offset, limit } => {
                to_json(&self.list_subscriptions(*offset, *limit))
            }
            ApiRequest::SubmitModfile { .. } => Err(ModError::invalid_parameters(
                "modfiles are submitted with upload_file",
            )),
        }
    }

    async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        progress: Arc<dyn ProgressSink>,
        expected_size: Option<u64>,
    ) -> ModResult<()> {
        self.injected_failure(FakeCall::Download)?;
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.download_started.notify_one();

        let gate = lock(&self.download_gate).clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| ModError::Cancelled)?
                .forget();
        }
        if progress.is_cancelled() {
            return Err(ModError::Cancelled);
        }

        let data = lock(&self.payloads)
            .get(url)
            .cloned()
            .ok_or_else(|| ModError::not_found(url.to_string()))?;
        let size = data.len() as u64;
        progress.set_total(size);
        if let Some(expected) = expected_size.filter(|e| *e != size) {
            return Err(ModError::SizeMismatch {
                expected,
                actual: size,
            });
        }
        for chunk in data.chunks(CHUNK) {
            if progress.is_cancelled() {
                return Err(ModError::Cancelled);
            }
            progress.add_progress(chunk.len() as u64);
        }
        self.fs.write_file(dest, &data).await
    }

    async fn upload_file(
        &self,
        call: &ApiCall,
        file: &Path,
        progress: Arc<dyn ProgressSink>,
    ) -> ModResult<Vec<u8>> {
        lock(&self.requests).push(call.request.clone());
        self.injected_failure(FakeCall::Upload)?;
        let ApiRequest::SubmitModfile { mod_id, .. } = &call.request else {
            return Err(ModError::invalid_parameters("upload_file needs SubmitModfile"));
        };
        let data = self.fs.read_file(file).await?;
        progress.set_total(data.len() as u64);
        if progress.is_cancelled() {
            return Err(ModError::Cancelled);
        }
        progress.add_progress(data.len() as u64);
        lock(&self.uploads).push((*mod_id, data));

        let id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        to_json(&SubmittedModfile {
            id,
            mod_id: *mod_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameId;
    use crate::ports::CountingProgress;

    fn call(request: ApiRequest) -> ApiCall {
        ApiCall::new(GameId::new(1), request).with_token(Some("tok".into()))
    }

    #[tokio::test]
    async fn test_subscription_paging() {
        let fs = Arc::new(MemoryFileSystem::new());
        let catalog = FakeCatalog::new(fs);
        for id in 1..=5 {
            catalog.add_mod(id, vec![0u8; 4]);
            catalog.subscribe_remote(id);
        }

        let bytes = catalog
            .perform_request(
                &call(ApiRequest::ListUserSubscriptions {
                    offset: 3,
                    limit: 100,
                }),
                CachePolicy::Disallow,
            )
            .await
            .unwrap();
        let page: PagedResponse<ModInfo> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(page.result_total, 5);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.next_offset(), None);
    }

    #[tokio::test]
    async fn test_download_writes_payload() {
        let fs = Arc::new(MemoryFileSystem::new());
        let catalog = FakeCatalog::new(Arc::clone(&fs));
        let info = catalog.add_mod(9, b"payload".to_vec());
        let url = info.modfile.unwrap().download.binary_url;

        let progress = Arc::new(CountingProgress::new());
        catalog
            .download_file(&url, Path::new("/dl/9.zip"), progress.clone(), Some(7))
            .await
            .unwrap();
        assert_eq!(fs.get_file(Path::new("/dl/9.zip")).unwrap(), b"payload");
        assert_eq!(progress.current(), 7);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let fs = Arc::new(MemoryFileSystem::new());
        let catalog = FakeCatalog::new(fs);
        catalog.add_mod(1, vec![1]);
        catalog.fail_next(FakeCall::GetMod, ModError::network("reset"));

        let req = call(ApiRequest::GetMod {
            mod_id: ModId::new(1),
        });
        assert!(catalog.perform_request(&req, CachePolicy::Allow).await.is_err());
        assert!(catalog.perform_request(&req, CachePolicy::Allow).await.is_ok());
    }
}

//! Filter Set Manager
//!
//! Owns the subscribed filters and publishes the [`ActiveFilterSet`] that
//! queries read. Writers are serialized by a mutex and publish a complete new
//! set with one atomic swap, so a query sees either the old or the new set
//! and never waits on a writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use af_compiler::{compile_filter_list, CompileStats};
use af_core::filter_set::{ActiveFilterSet, LoadedFilter};
use af_core::index::RuleIndex;
use af_core::psl::PublicSuffixes;
use af_core::types::FilterId;
use arc_swap::ArcSwap;

use crate::error::FilterError;
use crate::filter::{DownloadEvent, DownloadState, Filter};
use crate::store::FilterStore;

/// Identifier under which user rules appear in match results.
pub const CUSTOM_FILTER_ID: &str = "custom";

/// Receives filter metadata changes.
pub trait FilterListener: Send + Sync {
    fn filter_changed(&self, filter: &Filter);

    fn filter_removed(&self, _id: &FilterId) {}
}

enum Notice {
    Changed(Filter),
    Removed(FilterId),
}

struct ManagerState {
    /// Subscription order; earlier filters win ties
    filters: Vec<Filter>,
    loaded: HashMap<FilterId, Arc<RuleIndex>>,
    custom_rules: String,
    custom: Option<Arc<RuleIndex>>,
    filtering_enabled: bool,
}

pub struct FilterSetManager {
    active: ArcSwap<ActiveFilterSet>,
    state: Mutex<ManagerState>,
    store: Arc<dyn FilterStore>,
    psl: Arc<PublicSuffixes>,
    listeners: RwLock<Vec<Arc<dyn FilterListener>>>,
}

impl FilterSetManager {
    pub fn new(store: Arc<dyn FilterStore>, psl: Arc<PublicSuffixes>) -> Self {
        Self {
            active: ArcSwap::from_pointee(ActiveFilterSet::empty(psl.clone())),
            state: Mutex::new(ManagerState {
                filters: Vec::new(),
                loaded: HashMap::new(),
                custom_rules: String::new(),
                custom: None,
                filtering_enabled: true,
            }),
            store,
            psl,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The set currently served to queries.
    pub fn snapshot(&self) -> Arc<ActiveFilterSet> {
        self.active.load_full()
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.lock().filters.clone()
    }

    pub fn filter(&self, id: &FilterId) -> Option<Filter> {
        self.lock().filters.iter().find(|f| &f.id == id).cloned()
    }

    pub fn is_filtering_enabled(&self) -> bool {
        self.lock().filtering_enabled
    }

    pub fn add_listener(&self, listener: Arc<dyn FilterListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Subscribe to a filter list URL. Subscribing twice returns the existing id.
    pub fn add_filter(&self, url: &str, name: &str) -> FilterId {
        let filter = {
            let mut state = self.lock();
            if let Some(existing) = state.filters.iter().find(|f| f.url == url) {
                return existing.id.clone();
            }
            let filter = Filter::new(url, name);
            state.filters.push(filter.clone());
            filter
        };

        log::info!("added filter {} ({})", filter.id, filter.url);
        let id = filter.id.clone();
        self.notify(Notice::Changed(filter));
        id
    }

    /// Drop a subscription together with its stored data.
    pub fn remove_filter(&self, id: &FilterId) -> Result<Filter, FilterError> {
        let filter = {
            let mut state = self.lock();
            let pos = state
                .filters
                .iter()
                .position(|f| &f.id == id)
                .ok_or_else(|| FilterError::UnknownFilter(id.clone()))?;
            let filter = state.filters.remove(pos);
            if state.loaded.remove(id).is_some() {
                self.publish(&state);
            }
            filter
        };

        self.store.remove(id);
        log::info!("removed filter {} ({})", filter.id, filter.url);
        self.notify(Notice::Removed(id.clone()));
        Ok(filter)
    }

    /// Compile a filter's stored data and add it to the active set.
    pub fn load(&self, id: &FilterId) -> Result<(), FilterError> {
        let mut state = self.lock();
        self.load_locked(&mut state, id)?;
        self.publish(&state);
        Ok(())
    }

    /// Remove a filter's rules from the active set. Returns whether it was loaded.
    pub fn unload(&self, id: &FilterId) -> bool {
        let mut state = self.lock();
        let unloaded = state.loaded.remove(id).is_some();
        if unloaded {
            self.publish(&state);
            log::info!("unloaded filter {id}");
        }
        unloaded
    }

    /// Remove every filter's rules, including user rules, from the active set.
    pub fn unload_all(&self) {
        let mut state = self.lock();
        state.loaded.clear();
        state.custom = None;
        self.publish(&state);
        log::info!("unloaded all filters");
    }

    /// Enable or disable one filter, loading or unloading it as needed.
    ///
    /// A filter that fails to load stays enabled; the failure is logged.
    pub fn set_enabled(&self, id: &FilterId, enabled: bool) -> Result<(), FilterError> {
        let filter = {
            let mut state = self.lock();
            let filter = state
                .filters
                .iter_mut()
                .find(|f| &f.id == id)
                .ok_or_else(|| FilterError::UnknownFilter(id.clone()))?;
            filter.enabled = enabled;
            let filter = filter.clone();

            if !enabled {
                state.loaded.remove(id);
            } else if filter.has_downloaded() {
                if let Err(err) = self.load_locked(&mut state, id) {
                    log::warn!("failed to load filter {id}: {err}");
                }
            }
            self.publish(&state);
            filter
        };

        self.notify(Notice::Changed(filter));
        Ok(())
    }

    /// Global switch. Disabling unloads everything but keeps subscriptions;
    /// enabling reloads every enabled, downloaded filter and the user rules.
    pub fn set_filtering_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        if state.filtering_enabled == enabled {
            return;
        }
        state.filtering_enabled = enabled;

        if enabled {
            let ids: Vec<FilterId> = state
                .filters
                .iter()
                .filter(|f| f.enabled && f.has_downloaded())
                .map(|f| f.id.clone())
                .collect();
            for id in &ids {
                if let Err(err) = self.load_locked(&mut state, id) {
                    log::warn!("failed to load filter {id}: {err}");
                }
            }
            state.custom = compile_custom(&state.custom_rules);
        } else {
            state.loaded.clear();
            state.custom = None;
        }

        self.publish(&state);
        log::info!("filtering {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Replace the user's own rules.
    pub fn set_custom_rules(&self, rules: &[String]) -> Result<CompileStats, FilterError> {
        let text = rules.join("\n");
        let (index, stats) = compile_filter_list(&text).map_err(|source| FilterError::Index {
            id: FilterId::new(CUSTOM_FILTER_ID),
            source,
        })?;

        let mut state = self.lock();
        state.custom_rules = text;
        if state.filtering_enabled {
            state.custom = (index.rule_count() > 0).then(|| Arc::new(index));
            self.publish(&state);
        }
        log::info!("custom rules updated: {} rules", stats.optimize.after);
        Ok(stats)
    }

    /// Advance a filter's download state from an event reported by the
    /// download collaborator. A successful download is stored and, when the
    /// filter is enabled, loaded.
    pub fn handle_download_event(
        &self,
        id: &FilterId,
        event: DownloadEvent,
    ) -> Result<DownloadState, FilterError> {
        let filter = {
            let mut state = self.lock();
            let filter = state
                .filters
                .iter_mut()
                .find(|f| &f.id == id)
                .ok_or_else(|| FilterError::UnknownFilter(id.clone()))?;

            let from = filter.download_state;
            if let Err(err) = filter.apply(&event) {
                log::warn!("{err}");
                return Err(err.into());
            }
            log::debug!("filter {id}: {from:?} -> {:?}", filter.download_state);
            let filter = filter.clone();

            if let DownloadEvent::Succeeded { data } = &event {
                self.store.save(id, data);
                if filter.enabled {
                    match self.load_locked(&mut state, id) {
                        Ok(()) => self.publish(&state),
                        Err(err) => log::warn!("failed to load filter {id}: {err}"),
                    }
                }
            }
            filter
        };

        let next = filter.download_state;
        self.notify(Notice::Changed(filter));
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_locked(&self, state: &mut ManagerState, id: &FilterId) -> Result<(), FilterError> {
        if !state.filters.iter().any(|f| &f.id == id) {
            return Err(FilterError::UnknownFilter(id.clone()));
        }
        if !state.filtering_enabled {
            log::debug!("filtering disabled, not loading {id}");
            return Ok(());
        }

        let data = self
            .store
            .load(id)
            .ok_or_else(|| FilterError::MissingData(id.clone()))?;
        let text = String::from_utf8_lossy(&data);
        let (index, stats) = compile_filter_list(&text).map_err(|source| FilterError::Index {
            id: id.clone(),
            source,
        })?;

        log::info!(
            "loaded filter {id}: {} rules, {} malformed lines skipped",
            index.rule_count(),
            stats.malformed
        );
        state.loaded.insert(id.clone(), Arc::new(index));
        Ok(())
    }

    /// Build the aggregate view from `state` and swap it in.
    fn publish(&self, state: &ManagerState) {
        let mut filters = Vec::with_capacity(state.loaded.len() + 1);
        if let Some(index) = &state.custom {
            filters.push(LoadedFilter {
                id: FilterId::new(CUSTOM_FILTER_ID),
                index: index.clone(),
                custom: true,
            });
        }
        for filter in &state.filters {
            if let Some(index) = state.loaded.get(&filter.id) {
                filters.push(LoadedFilter {
                    id: filter.id.clone(),
                    index: index.clone(),
                    custom: false,
                });
            }
        }
        self.active
            .store(Arc::new(ActiveFilterSet::new(filters, self.psl.clone())));
    }

    fn notify(&self, notice: Notice) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            match &notice {
                Notice::Changed(filter) => listener.filter_changed(filter),
                Notice::Removed(id) => listener.filter_removed(id),
            }
        }
    }
}

fn compile_custom(text: &str) -> Option<Arc<RuleIndex>> {
    if text.trim().is_empty() {
        return None;
    }
    match compile_filter_list(text) {
        Ok((index, _)) => Some(Arc::new(index)),
        Err(err) => {
            log::warn!("failed to compile custom rules: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use af_core::matcher::Matcher;
    use af_core::types::RequestType;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(FilterId, DownloadState, bool)>>,
        removed: Mutex<Vec<FilterId>>,
    }

    impl FilterListener for Recorder {
        fn filter_changed(&self, filter: &Filter) {
            self.seen
                .lock()
                .unwrap()
                .push((filter.id.clone(), filter.download_state, filter.enabled));
        }

        fn filter_removed(&self, id: &FilterId) {
            self.removed.lock().unwrap().push(id.clone());
        }
    }

    fn manager() -> (FilterSetManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let manager = FilterSetManager::new(store.clone(), Arc::new(PublicSuffixes::default()));
        (manager, store)
    }

    fn download(manager: &FilterSetManager, id: &FilterId, text: &str) {
        manager.handle_download_event(id, DownloadEvent::Enqueued).unwrap();
        manager.handle_download_event(id, DownloadEvent::Started).unwrap();
        manager.handle_download_event(id, DownloadEvent::Installing).unwrap();
        let state = manager
            .handle_download_event(id, DownloadEvent::Succeeded { data: text.as_bytes().to_vec() })
            .unwrap();
        assert_eq!(state, DownloadState::Success);
    }

    fn blocks(manager: &FilterSetManager, url: &str) -> bool {
        let set = manager.snapshot();
        Matcher::new(&set)
            .classify(url, "https://page.test/", RequestType::SCRIPT)
            .blocked()
    }

    #[test]
    fn download_success_loads_enabled_filter() {
        let (manager, store) = manager();
        let recorder = Arc::new(Recorder::default());
        manager.add_listener(recorder.clone());

        let id = manager.add_filter("https://lists.test/a.txt", "A");
        assert!(!blocks(&manager, "https://ads.test/x.js"));

        download(&manager, &id, "||ads.test^\n");
        assert!(store.contains(&id));
        assert!(manager.snapshot().contains(&id));
        assert!(blocks(&manager, "https://ads.test/x.js"));
        assert!(manager.filter(&id).unwrap().has_downloaded());

        let states: Vec<DownloadState> = recorder.seen.lock().unwrap().iter().map(|s| s.1).collect();
        assert_eq!(
            states,
            vec![
                DownloadState::None,
                DownloadState::Enqueued,
                DownloadState::Downloading,
                DownloadState::Installing,
                DownloadState::Success,
            ]
        );
    }

    #[test]
    fn coalesced_download_still_installs() {
        let (manager, store) = manager();
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        manager.handle_download_event(&id, DownloadEvent::Enqueued).unwrap();
        let state = manager
            .handle_download_event(&id, DownloadEvent::Succeeded { data: b"||ads.test^".to_vec() })
            .unwrap();

        assert_eq!(state, DownloadState::Success);
        assert!(store.contains(&id));
        assert!(manager.snapshot().contains(&id));
        assert!(blocks(&manager, "https://ads.test/x.js"));
    }

    #[test]
    fn add_filter_is_idempotent() {
        let (manager, _) = manager();
        let a = manager.add_filter("https://lists.test/a.txt", "A");
        let b = manager.add_filter("https://lists.test/a.txt", "again");
        assert_eq!(a, b);
        assert_eq!(manager.filters().len(), 1);
        assert_eq!(manager.filters()[0].name, "A");
    }

    #[test]
    fn invalid_event_is_an_error() {
        let (manager, _) = manager();
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        let err = manager
            .handle_download_event(&id, DownloadEvent::Succeeded { data: Vec::new() })
            .unwrap_err();
        assert!(matches!(err, FilterError::Transition(_)));
        assert_eq!(manager.filter(&id).unwrap().download_state, DownloadState::None);

        let unknown = FilterId::new("nope");
        assert!(matches!(
            manager.handle_download_event(&unknown, DownloadEvent::Enqueued),
            Err(FilterError::UnknownFilter(_))
        ));
    }

    #[test]
    fn disabled_filter_is_stored_but_not_loaded() {
        let (manager, store) = manager();
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        manager.set_enabled(&id, false).unwrap();

        download(&manager, &id, "||ads.test^\n");
        assert!(store.contains(&id));
        assert!(!blocks(&manager, "https://ads.test/x.js"));

        manager.set_enabled(&id, true).unwrap();
        assert!(blocks(&manager, "https://ads.test/x.js"));

        manager.set_enabled(&id, false).unwrap();
        assert!(!blocks(&manager, "https://ads.test/x.js"));
    }

    #[test]
    fn load_unload_and_missing_data() {
        let (manager, store) = manager();
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        assert!(matches!(manager.load(&id), Err(FilterError::MissingData(_))));

        store.save(&id, b"||ads.test^\n");
        manager.load(&id).unwrap();
        assert!(blocks(&manager, "https://ads.test/x.js"));

        assert!(manager.unload(&id));
        assert!(!manager.unload(&id));
        assert!(!blocks(&manager, "https://ads.test/x.js"));
        assert!(matches!(
            manager.load(&FilterId::new("nope")),
            Err(FilterError::UnknownFilter(_))
        ));
    }

    #[test]
    fn global_switch_keeps_subscriptions() {
        let (manager, _) = manager();
        let a = manager.add_filter("https://lists.test/a.txt", "A");
        let b = manager.add_filter("https://lists.test/b.txt", "B");
        download(&manager, &a, "||a.test^\n");
        download(&manager, &b, "||b.test^\n");
        manager.set_custom_rules(&["||mine.test^".to_string()]).unwrap();
        manager.set_enabled(&b, false).unwrap();

        manager.set_filtering_enabled(false);
        assert!(manager.snapshot().is_empty());
        assert_eq!(manager.filters().len(), 2);
        assert!(!blocks(&manager, "https://a.test/x.js"));
        assert!(!blocks(&manager, "https://mine.test/x.js"));

        manager.set_filtering_enabled(true);
        assert!(blocks(&manager, "https://a.test/x.js"));
        assert!(!blocks(&manager, "https://b.test/x.js"));
        assert!(blocks(&manager, "https://mine.test/x.js"));
    }

    #[test]
    fn custom_rules_are_reported_as_custom() {
        let (manager, _) = manager();
        manager
            .set_custom_rules(&["||mine.test^".to_string(), "##.mine".to_string()])
            .unwrap();
        let set = manager.snapshot();
        let result = Matcher::new(&set).classify("https://mine.test/", "https://page.test/", RequestType::IMAGE);
        let matched = result.matched_rule.expect("matched");
        assert_eq!(matched.filter_id.as_str(), CUSTOM_FILTER_ID);
        assert!(set.filters()[0].custom);

        manager.set_custom_rules(&[]).unwrap();
        assert!(manager.snapshot().is_empty());
    }

    #[test]
    fn remove_filter_drops_data_and_notifies() {
        let (manager, store) = manager();
        let recorder = Arc::new(Recorder::default());
        manager.add_listener(recorder.clone());
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        download(&manager, &id, "||ads.test^\n");

        let removed = manager.remove_filter(&id).unwrap();
        assert_eq!(removed.url, "https://lists.test/a.txt");
        assert!(!store.contains(&id));
        assert!(!blocks(&manager, "https://ads.test/x.js"));
        assert_eq!(*recorder.removed.lock().unwrap(), vec![id.clone()]);
        assert!(matches!(manager.remove_filter(&id), Err(FilterError::UnknownFilter(_))));
    }

    #[test]
    fn unload_all_clears_custom_rules_too() {
        let (manager, _) = manager();
        let id = manager.add_filter("https://lists.test/a.txt", "A");
        download(&manager, &id, "||ads.test^\n");
        manager.set_custom_rules(&["||mine.test^".to_string()]).unwrap();

        manager.unload_all();
        assert!(manager.snapshot().is_empty());
        assert!(manager.is_filtering_enabled());
    }

    #[test]
    fn readers_see_whole_snapshots() {
        let (manager, store) = manager();
        let a = manager.add_filter("https://lists.test/a.txt", "A");
        let b = manager.add_filter("https://lists.test/b.txt", "B");
        store.save(&a, b"||a.test^\n||shared.test/a^\n");
        store.save(&b, b"||b.test^\n||shared.test/b^\n");

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let set = manager.snapshot();
                        let matcher = Matcher::new(&set);
                        let a_loaded = set.contains(&a);
                        let b_loaded = set.contains(&b);
                        let doc = "https://page.test/";
                        let ty = RequestType::SCRIPT;
                        assert_eq!(matcher.classify("https://a.test/", doc, ty).blocked(), a_loaded);
                        assert_eq!(matcher.classify("https://shared.test/a", doc, ty).blocked(), a_loaded);
                        assert_eq!(matcher.classify("https://b.test/", doc, ty).blocked(), b_loaded);
                        assert_eq!(matcher.classify("https://shared.test/b", doc, ty).blocked(), b_loaded);
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..50 {
                    manager.load(&a).unwrap();
                    manager.load(&b).unwrap();
                    manager.unload(&a);
                    manager.unload_all();
                }
            });
        });
    }
}

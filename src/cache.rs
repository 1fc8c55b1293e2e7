use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::errors::GeoResult;
use crate::models::{MunicipalityRef, ProvinceRef};
use crate::normalize::{normalize, NameKind};
use crate::registry::ReferenceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MunicipalitySource {
    Municipalities,
    Localities,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SourceKey {
    Id(String),
    Name(String),
}

#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    entries: HashMap<SourceKey, MunicipalitySource>,
}

impl SourceTable {
    pub fn localities_for<I, S>(provinces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::default();
        for entry in provinces {
            table.insert(entry.as_ref(), MunicipalitySource::Localities);
        }
        table
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::localities_for(&config.locality_source_provinces)
    }

    pub fn insert(&mut self, province: &str, source: MunicipalitySource) {
        let province = province.trim();
        let key = if !province.is_empty() && province.chars().all(|c| c.is_ascii_digit()) {
            SourceKey::Id(province.to_string())
        } else {
            SourceKey::Name(normalize(province, NameKind::Province))
        };
        if key != SourceKey::Name(String::new()) {
            self.entries.insert(key, source);
        }
    }

    pub fn source_for(&self, province_id: &str, province_name: Option<&str>) -> MunicipalitySource {
        self.by_id(province_id)
            .or_else(|| {
                let key = normalize(province_name?, NameKind::Province);
                self.entries.get(&SourceKey::Name(key)).copied()
            })
            .unwrap_or(MunicipalitySource::Municipalities)
    }

    fn by_id(&self, province_id: &str) -> Option<MunicipalitySource> {
        self.entries.get(&SourceKey::Id(province_id.to_string())).copied()
    }

    fn has_name_entries(&self) -> bool {
        self.entries.keys().any(|key| matches!(key, SourceKey::Name(_)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SliceStats {
    pub province_id: String,
    pub entries: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub provinces: usize,
    pub provinces_fetched_at: Option<DateTime<Utc>>,
    pub municipalities: usize,
    pub municipalities_fetched_at: Option<DateTime<Utc>>,
    pub locality_slices: Vec<SliceStats>,
}

struct Cached<T> {
    entries: Arc<Vec<T>>,
    fetched_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    fn new(entries: Vec<T>) -> Self {
        Self {
            entries: Arc::new(entries),
            fetched_at: Utc::now(),
        }
    }
}

struct Nationwide {
    list: Cached<MunicipalityRef>,
    by_province: HashMap<String, Arc<Vec<MunicipalityRef>>>,
}

impl Nationwide {
    fn new(entries: Vec<MunicipalityRef>) -> Self {
        let mut grouped: HashMap<String, Vec<MunicipalityRef>> = HashMap::new();
        for entry in &entries {
            grouped
                .entry(entry.province_id.clone())
                .or_default()
                .push(entry.clone());
        }
        Self {
            list: Cached::new(entries),
            by_province: grouped
                .into_iter()
                .map(|(id, list)| (id, Arc::new(list)))
                .collect(),
        }
    }

    fn for_province(&self, province_id: &str) -> Arc<Vec<MunicipalityRef>> {
        self.by_province.get(province_id).cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct CacheState {
    provinces: Option<Cached<ProvinceRef>>,
    nationwide: Option<Nationwide>,
    locality_slices: HashMap<String, Cached<MunicipalityRef>>,
}

pub struct ReferenceCache {
    registry: Arc<dyn ReferenceRegistry>,
    sources: SourceTable,
    state: RwLock<CacheState>,
}

impl ReferenceCache {
    pub fn new(registry: Arc<dyn ReferenceRegistry>, sources: SourceTable) -> Self {
        Self {
            registry,
            sources,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub async fn provinces(&self) -> GeoResult<Arc<Vec<ProvinceRef>>> {
        if let Some(cached) = self.cached_provinces() {
            debug!(count = cached.len(), "provinces cache hit");
            return Ok(cached);
        }

        let fetched = self.registry.provinces().await?;
        info!(count = fetched.len(), "provinces cached");
        let cached = Cached::new(fetched);
        let entries = Arc::clone(&cached.entries);
        self.state.write().provinces = Some(cached);
        Ok(entries)
    }

    /// `None` gives the nationwide list. A province ID gives that province's
    /// slice from whichever endpoint the [`SourceTable`] names for it.
    pub async fn municipalities(&self, province_id: Option<&str>) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        let Some(province_id) = province_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return self.nationwide().await;
        };
        match self.source_of(province_id).await? {
            MunicipalitySource::Localities => self.locality_slice(province_id).await,
            MunicipalitySource::Municipalities => {
                let nationwide = self.nationwide_state_for(province_id);
                match nationwide {
                    Some(slice) => {
                        debug!(province_id, count = slice.len(), "municipalities cache hit");
                        Ok(slice)
                    }
                    None => {
                        self.nationwide().await?;
                        Ok(self.nationwide_state_for(province_id).unwrap_or_default())
                    }
                }
            }
        }
    }

    pub async fn municipality_by_id(&self, id: &str) -> GeoResult<Option<MunicipalityRef>> {
        let id = id.trim();
        if id.is_empty() {
            return Ok(None);
        }
        let nationwide = self.nationwide().await?;
        if let Some(found) = nationwide.iter().find(|m| m.id == id) {
            return Ok(Some(found.clone()));
        }
        let state = self.state.read();
        let found = state
            .locality_slices
            .values()
            .find_map(|slice| slice.entries.iter().find(|m| m.id == id))
            .cloned();
        Ok(found)
    }

    pub async fn refresh_province(&self, province_id: &str) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        let province_id = province_id.trim();
        match self.source_of(province_id).await? {
            MunicipalitySource::Localities => self.fetch_locality_slice(province_id).await,
            MunicipalitySource::Municipalities => {
                if self.nationwide_state_for(province_id).is_none() {
                    self.nationwide().await?;
                    return Ok(self.nationwide_state_for(province_id).unwrap_or_default());
                }
                let provinces = self.provinces().await?;
                let fetched = self.registry.municipalities(Some(province_id)).await?;
                let fresh: Vec<MunicipalityRef> = without_orphans(&provinces, fetched)
                    .into_iter()
                    .filter(|m| m.province_id == province_id)
                    .collect();
                info!(province_id, count = fresh.len(), "province municipalities refreshed");

                let mut state = self.state.write();
                let mut merged: Vec<MunicipalityRef> = state
                    .nationwide
                    .as_ref()
                    .map(|n| {
                        n.list
                            .entries
                            .iter()
                            .filter(|m| m.province_id != province_id)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                merged.extend(fresh);
                let nationwide = Nationwide::new(merged);
                let slice = nationwide.for_province(province_id);
                state.nationwide = Some(nationwide);
                Ok(slice)
            }
        }
    }

    pub async fn warm_up(&self) -> GeoResult<()> {
        let provinces = self.provinces().await?;
        let locality_ids: Vec<String> = provinces
            .iter()
            .filter(|p| {
                self.sources.source_for(&p.id, Some(&p.name)) == MunicipalitySource::Localities
            })
            .map(|p| p.id.clone())
            .collect();

        let mut tasks: Vec<BoxFuture<'_, GeoResult<Arc<Vec<MunicipalityRef>>>>> =
            vec![self.nationwide().boxed()];
        for province_id in &locality_ids {
            tasks.push(self.locality_slice(province_id).boxed());
        }
        try_join_all(tasks).await?;
        info!(locality_slices = locality_ids.len(), "reference cache warmed up");
        Ok(())
    }

    pub fn reset(&self) {
        *self.state.write() = CacheState::default();
        info!("reference cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        let mut locality_slices: Vec<SliceStats> = state
            .locality_slices
            .iter()
            .map(|(province_id, slice)| SliceStats {
                province_id: province_id.clone(),
                entries: slice.entries.len(),
                fetched_at: slice.fetched_at,
            })
            .collect();
        locality_slices.sort_by(|a, b| a.province_id.cmp(&b.province_id));

        CacheStats {
            provinces: state.provinces.as_ref().map_or(0, |p| p.entries.len()),
            provinces_fetched_at: state.provinces.as_ref().map(|p| p.fetched_at),
            municipalities: state.nationwide.as_ref().map_or(0, |n| n.list.entries.len()),
            municipalities_fetched_at: state.nationwide.as_ref().map(|n| n.list.fetched_at),
            locality_slices,
        }
    }

    fn cached_provinces(&self) -> Option<Arc<Vec<ProvinceRef>>> {
        self.state
            .read()
            .provinces
            .as_ref()
            .map(|p| Arc::clone(&p.entries))
    }

    fn nationwide_state_for(&self, province_id: &str) -> Option<Arc<Vec<MunicipalityRef>>> {
        self.state
            .read()
            .nationwide
            .as_ref()
            .map(|n| n.for_province(province_id))
    }

    fn cached_slice(&self, province_id: &str) -> Option<Arc<Vec<MunicipalityRef>>> {
        self.state
            .read()
            .locality_slices
            .get(province_id)
            .map(|s| Arc::clone(&s.entries))
    }

    async fn source_of(&self, province_id: &str) -> GeoResult<MunicipalitySource> {
        if let Some(source) = self.sources.by_id(province_id) {
            return Ok(source);
        }
        if !self.sources.has_name_entries() {
            return Ok(MunicipalitySource::Municipalities);
        }
        let provinces = self.provinces().await?;
        let name = provinces
            .iter()
            .find(|p| p.id == province_id)
            .map(|p| p.name.as_str());
        Ok(self.sources.source_for(province_id, name))
    }

    async fn nationwide(&self) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        if let Some(cached) = self.cached_nationwide() {
            debug!(count = cached.len(), "nationwide municipalities cache hit");
            return Ok(cached);
        }

        let provinces = self.provinces().await?;
        let fetched = self.registry.municipalities(None).await?;
        let entries = without_orphans(&provinces, fetched);
        info!(count = entries.len(), "nationwide municipalities cached");
        let nationwide = Nationwide::new(entries);
        let list = Arc::clone(&nationwide.list.entries);
        self.state.write().nationwide = Some(nationwide);
        Ok(list)
    }

    fn cached_nationwide(&self) -> Option<Arc<Vec<MunicipalityRef>>> {
        self.state
            .read()
            .nationwide
            .as_ref()
            .map(|n| Arc::clone(&n.list.entries))
    }

    async fn locality_slice(&self, province_id: &str) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        if let Some(cached) = self.cached_slice(province_id) {
            debug!(province_id, count = cached.len(), "locality slice cache hit");
            return Ok(cached);
        }
        self.fetch_locality_slice(province_id).await
    }

    async fn fetch_locality_slice(&self, province_id: &str) -> GeoResult<Arc<Vec<MunicipalityRef>>> {
        let provinces = self.provinces().await?;
        let fetched = self.registry.localities(province_id).await?;
        let total = fetched.len();
        let entries: Vec<MunicipalityRef> = without_orphans(&provinces, fetched)
            .into_iter()
            .filter(|l| l.province_id == province_id)
            .collect();
        if entries.len() < total {
            warn!(
                province_id,
                dropped = total - entries.len(),
                "dropping localities outside the requested province"
            );
        }
        info!(province_id, count = entries.len(), "locality slice cached");

        let slice = Cached::new(entries);
        let result = Arc::clone(&slice.entries);
        self.state
            .write()
            .locality_slices
            .insert(province_id.to_string(), slice);
        Ok(result)
    }
}

fn without_orphans(provinces: &[ProvinceRef], entries: Vec<MunicipalityRef>) -> Vec<MunicipalityRef> {
    let total = entries.len();
    let kept: Vec<MunicipalityRef> = entries
        .into_iter()
        .filter(|m| provinces.iter().any(|p| p.id == m.province_id))
        .collect();
    if kept.len() < total {
        warn!(dropped = total - kept.len(), "dropping municipalities of unknown provinces");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegistry;

    fn cache_with(registry: &Arc<FakeRegistry>) -> ReferenceCache {
        ReferenceCache::new(registry.clone(), SourceTable::localities_for(["86", "02"]))
    }

    #[tokio::test]
    async fn provinces_are_fetched_once() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let first = cache.provinces().await.unwrap();
        let second = cache.provinces().await.unwrap();

        assert_eq!(first.len(), 4);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.count("provinces"), 1);
    }

    #[tokio::test]
    async fn primary_province_is_a_subset_of_nationwide() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let cordoba = cache.municipalities(Some("14")).await.unwrap();
        let buenos_aires = cache.municipalities(Some("06")).await.unwrap();

        assert_eq!(cordoba.len(), 4);
        assert!(cordoba.iter().all(|m| m.province_id == "14"));
        assert!(buenos_aires.iter().all(|m| m.province_id == "06"));
        assert_eq!(registry.calls(), vec!["provinces", "municipalities:*"]);
    }

    #[tokio::test]
    async fn locality_province_uses_alternate_endpoint() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let santiago = cache.municipalities(Some("86")).await.unwrap();
        cache.municipalities(Some("86")).await.unwrap();

        assert_eq!(santiago.len(), 3);
        assert!(santiago.iter().all(|m| m.category.is_some()));
        assert_eq!(registry.calls(), vec!["provinces", "localities:86"]);
    }

    #[tokio::test]
    async fn locality_slice_survives_nationwide_fetch_intact() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let before = cache.municipalities(Some("86")).await.unwrap();
        let nationwide = cache.municipalities(None).await.unwrap();
        let after = cache.municipalities(Some("86")).await.unwrap();

        assert_eq!(before, after);
        let mut ids: Vec<&str> = after.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), after.len());
        assert!(nationwide.iter().all(|m| m.category.is_none()));
        assert_eq!(registry.count("localities:86"), 1);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        registry.set_failing(true);
        let err = cache.municipalities(Some("86")).await.unwrap_err();
        assert!(err.is_upstream_unavailable());
        assert!(cache.stats().locality_slices.is_empty());
        assert_eq!(cache.stats().provinces, 0);

        registry.set_failing(false);
        assert_eq!(cache.municipalities(Some("86")).await.unwrap().len(), 3);
        assert_eq!(registry.count("provinces"), 2);
        assert_eq!(registry.count("localities:86"), 1);
    }

    #[tokio::test]
    async fn orphans_dropped_when_nationwide_is_fetched_first() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let nationwide = cache.municipalities(None).await.unwrap();
        assert!(nationwide.iter().all(|m| m.id != "990001"));
        assert_eq!(nationwide.len(), 7);
        assert!(cache.municipality_by_id("990001").await.unwrap().is_none());
        assert_eq!(registry.calls(), vec!["provinces", "municipalities:*"]);
    }

    #[tokio::test]
    async fn locality_slice_of_unknown_province_is_empty() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = ReferenceCache::new(registry.clone(), SourceTable::localities_for(["99"]));

        let ghosts = cache.municipalities(Some("99")).await.unwrap();
        assert!(ghosts.is_empty());
        assert_eq!(registry.calls(), vec!["provinces", "localities:99"]);
    }

    #[tokio::test]
    async fn orphans_dropped_once_provinces_are_known() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        cache.provinces().await.unwrap();
        let nationwide = cache.municipalities(None).await.unwrap();
        assert!(nationwide.iter().all(|m| m.id != "990001"));
        assert_eq!(nationwide.len(), 7);
    }

    #[tokio::test]
    async fn name_entries_resolve_through_province_list() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = ReferenceCache::new(
            registry.clone(),
            SourceTable::localities_for(["Santiago del Estero"]),
        );

        cache.municipalities(Some("86")).await.unwrap();
        assert_eq!(registry.calls(), vec!["provinces", "localities:86"]);
    }

    #[tokio::test]
    async fn refresh_replaces_only_that_province() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        cache.municipalities(None).await.unwrap();
        let refreshed = cache.refresh_province("14").await.unwrap();
        assert_eq!(refreshed.len(), 4);
        assert_eq!(cache.municipalities(Some("06")).await.unwrap().len(), 2);
        assert_eq!(cache.stats().municipalities, 7);

        cache.refresh_province("86").await.unwrap();
        cache.refresh_province("86").await.unwrap();
        assert_eq!(registry.count("localities:86"), 2);
        assert_eq!(
            registry.calls(),
            vec![
                "provinces",
                "municipalities:*",
                "municipalities:14",
                "localities:86",
                "localities:86"
            ]
        );
    }

    #[tokio::test]
    async fn warm_up_reset_and_stats() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        cache.warm_up().await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.provinces, 4);
        assert_eq!(stats.municipalities, 7);
        let sliced: Vec<&str> = stats.locality_slices.iter().map(|s| s.province_id.as_str()).collect();
        assert_eq!(sliced, vec!["02", "86"]);

        cache.reset();
        let cleared = cache.stats();
        assert_eq!(cleared.provinces, 0);
        assert!(cleared.provinces_fetched_at.is_none());
        assert!(cleared.locality_slices.is_empty());
    }

    #[tokio::test]
    async fn finds_municipality_by_id_across_lists() {
        let registry = Arc::new(FakeRegistry::argentina());
        let cache = cache_with(&registry);

        let la_plata = cache.municipality_by_id("060441").await.unwrap().unwrap();
        assert_eq!(la_plata.name, "La Plata");
        assert!(cache.municipality_by_id("86077010000").await.unwrap().is_none());

        cache.municipalities(Some("86")).await.unwrap();
        let capital = cache.municipality_by_id("86077010000").await.unwrap().unwrap();
        assert_eq!(capital.name, "Capital");
    }

    #[test]
    fn source_table_defaults_to_municipalities() {
        let table = SourceTable::localities_for(["86", "Ciudad Autónoma de Buenos Aires", " "]);
        assert_eq!(table.source_for("86", None), MunicipalitySource::Localities);
        assert_eq!(
            table.source_for("02", Some("Ciudad Autónoma de Buenos Aires")),
            MunicipalitySource::Localities
        );
        assert_eq!(table.source_for("02", None), MunicipalitySource::Municipalities);
        assert_eq!(
            table.source_for("14", Some("Córdoba")),
            MunicipalitySource::Municipalities
        );
    }
}

//! Query result cache.
//!
//! Entries are keyed by the canonical signature of a compiled read query and
//! tagged with every table the query touches, so a write to a table can drop
//! every cached read that embeds it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rowlink_core::{CompiledQuery, Envelope};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default time-to-live for cached results.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default maximum number of entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Custom cache-key derivation.
pub type KeyGenerator = Arc<dyn Fn(&CompiledQuery) -> String + Send + Sync>;

/// Cache configuration: `{ ttl, max_entries, key_generator }`.
#[derive(Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// Capacity before least-recently-used eviction. Zero disables caching.
    pub max_entries: usize,
    pub key_generator: Option<KeyGenerator>,
}

impl CacheConfig {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            key_generator: None,
        }
    }

    pub fn with_key_generator(
        mut self,
        generator: impl Fn(&CompiledQuery) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_generator = Some(Arc::new(generator));
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("key_generator", &self.key_generator.is_some())
            .finish()
    }
}

/// Selects cache entries to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePattern {
    All,
    /// Every entry whose query reads or embeds the table.
    Table(String),
    /// Entries on the table whose query carries exactly this filter
    /// parameter, e.g. `("id", "eq.7")`.
    Filter {
        table: String,
        column: String,
        token: String,
    },
}

impl CachePattern {
    pub fn table(table: &str) -> Self {
        CachePattern::Table(table.to_string())
    }

    pub fn filter(table: &str, column: &str, token: &str) -> Self {
        CachePattern::Filter {
            table: table.to_string(),
            column: column.to_string(),
            token: token.to_string(),
        }
    }

    fn matches(&self, entry: &Entry) -> bool {
        match self {
            CachePattern::All => true,
            CachePattern::Table(table) => entry.tables.iter().any(|t| t == table),
            CachePattern::Filter {
                table,
                column,
                token,
            } => {
                entry.tables.iter().any(|t| t == table)
                    && entry.params.iter().any(|(k, v)| k == column && v == token)
            }
        }
    }
}

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A reservation taken before dispatching a read.
///
/// [`QueryCache::commit`] only stores the response if no invalidation
/// touched the ticket's tables after it was issued.
#[derive(Debug, Clone)]
pub struct CacheTicket {
    key: String,
    tables: Vec<String>,
    params: Vec<(String, String)>,
    global_epoch: u64,
    table_epochs: Vec<u64>,
}

impl CacheTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Entry {
    value: Envelope<Value>,
    inserted_at: Instant,
    ttl: Duration,
    last_access: u64,
    tables: Vec<String>,
    params: Vec<(String, String)>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    /// Access tick -> key, oldest first.
    recency: BTreeMap<u64, String>,
    tick: u64,
    global_epoch: u64,
    table_epochs: HashMap<String, u64>,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn table_epoch(&self, table: &str) -> u64 {
        self.table_epochs.get(table).copied().unwrap_or(0)
    }

    fn bump(&mut self, table: &str) {
        *self.table_epochs.entry(table.to_string()).or_insert(0) += 1;
    }
}

/// Thread-safe query cache with TTL expiry, LRU capacity eviction and
/// table-scoped invalidation.
///
/// Expiry is lazy: an expired entry is dropped when it is next looked up,
/// or by [`evict_expired`](Self::evict_expired). Clones share state.
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
    config: CacheConfig,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            config,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for a query: the configured generator, or the canonical form.
    pub fn key_for(&self, query: &CompiledQuery) -> String {
        match &self.config.key_generator {
            Some(generator) => generator(query),
            None => query.canonical(),
        }
    }

    /// Returns the cached envelope for `query` if present and not expired.
    pub fn get(&self, query: &CompiledQuery) -> Option<Envelope<Value>> {
        let key = self.key_for(query);
        self.get_key(&key)
    }

    pub fn get_key(&self, key: &str) -> Option<Envelope<Value>> {
        let mut state = self.state();
        let now = Instant::now();
        let value = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                state.remove(key);
                tracing::trace!(key, "cache entry expired");
                None
            }
            None => None,
        };
        match value {
            Some(value) => {
                state.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` for `query`, overwriting any previous entry.
    ///
    /// Failed envelopes and write queries are never stored. Returns whether
    /// the value was stored.
    pub fn set(&self, query: &CompiledQuery, value: Envelope<Value>, ttl: Option<Duration>) -> bool {
        let key = self.key_for(query);
        let mut state = self.state();
        self.insert_locked(
            &mut state,
            key,
            value,
            ttl,
            query.tables.clone(),
            query.params.clone(),
            query.is_write(),
        )
    }

    /// Reserves a slot for `query` before dispatching it.
    pub fn reserve(&self, query: &CompiledQuery) -> CacheTicket {
        let key = self.key_for(query);
        let state = self.state();
        CacheTicket {
            key,
            table_epochs: query.tables.iter().map(|t| state.table_epoch(t)).collect(),
            global_epoch: state.global_epoch,
            tables: query.tables.clone(),
            params: query.params.clone(),
        }
    }

    /// Stores a response under a ticket taken by [`reserve`](Self::reserve).
    ///
    /// The write is dropped when any of the ticket's tables was invalidated
    /// in the meantime, since the response may predate that change.
    pub fn commit(&self, ticket: CacheTicket, value: Envelope<Value>, ttl: Option<Duration>) -> bool {
        let mut state = self.state();
        let stale = state.global_epoch != ticket.global_epoch
            || ticket
                .tables
                .iter()
                .zip(&ticket.table_epochs)
                .any(|(table, epoch)| state.table_epoch(table) != *epoch);
        if stale {
            tracing::trace!(key = %ticket.key, "dropping cache write for invalidated ticket");
            return false;
        }
        self.insert_locked(
            &mut state,
            ticket.key,
            value,
            ttl,
            ticket.tables,
            ticket.params,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_locked(
        &self,
        state: &mut CacheState,
        key: String,
        value: Envelope<Value>,
        ttl: Option<Duration>,
        tables: Vec<String>,
        params: Vec<(String, String)>,
        is_write: bool,
    ) -> bool {
        if value.error.is_some() || is_write || self.config.max_entries == 0 {
            return false;
        }
        let ttl = ttl.unwrap_or(self.config.ttl);
        if ttl.is_zero() {
            return false;
        }

        state.remove(&key);
        while state.entries.len() >= self.config.max_entries {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %oldest, "cache entry evicted (capacity)");
        }

        let tick = state.next_tick();
        state.recency.insert(tick, key.clone());
        tracing::trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache entry stored");
        state.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                last_access: tick,
                tables,
                params,
            },
        );
        true
    }

    /// Removes every entry matching `pattern` and returns how many were removed.
    ///
    /// Outstanding tickets for the affected tables are invalidated too.
    pub fn invalidate(&self, pattern: &CachePattern) -> usize {
        let mut state = self.state();
        match pattern {
            CachePattern::All => state.global_epoch += 1,
            CachePattern::Table(table) | CachePattern::Filter { table, .. } => state.bump(table),
        }
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| pattern.matches(entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        tracing::trace!(?pattern, removed = doomed.len(), "cache invalidated");
        doomed.len()
    }

    pub fn invalidate_table(&self, table: &str) -> usize {
        self.invalidate(&CachePattern::table(table))
    }

    /// Removes a single key.
    pub fn remove(&self, key: &str) -> bool {
        self.state().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.invalidate(&CachePattern::All);
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut state = self.state();
        let now = Instant::now();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Runs [`evict_expired`](Self::evict_expired) every `interval` until
    /// `shutdown` is cancelled. Must be called within a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let dropped = cache.evict_expired();
                        if dropped > 0 {
                            tracing::trace!(dropped, "cache sweep");
                        }
                    }
                }
            }
        })
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

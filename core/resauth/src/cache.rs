//! Time limited cache of resource authorisation decisions and identity classifications.
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

use breakglass_context::Context;

use crate::ResourceAuthConf;

/// Roughly 30 years, the expiry used when a TTL overflows the clock.
const FAR_FUTURE_SECS: u64 = 86400 * 365 * 30;

/// Cached authorisation decision for a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceAuth {
    pub allowed: bool,
    pub expires: Instant,
    pub resource: String,
}

/// Cached classification of a user or service.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Classification {
    expires: Instant,
    kind: String,
}

/// Cache of resource authorisation decisions by user email.
///
/// Allowed and denied decisions are cached for different lengths of time so that
/// denials are re-checked sooner. Expired entries are ignored by lookups and
/// removed by [`ResourceAuthCache::sweep`].
pub struct ResourceAuthCache {
    by_email: RwLock<HashMap<String, Vec<ResourceAuth>>>,
    conf: ResourceAuthConf,
    service_types: RwLock<HashMap<String, Classification>>,
    user_types: RwLock<HashMap<String, Classification>>,
}

impl ResourceAuthCache {
    pub fn new(conf: ResourceAuthConf) -> ResourceAuthCache {
        ResourceAuthCache {
            by_email: RwLock::new(HashMap::new()),
            conf,
            service_types: RwLock::new(HashMap::new()),
            user_types: RwLock::new(HashMap::new()),
        }
    }

    /// Cache the authorisation decision for a user and resource.
    ///
    /// When the table is full, decisions for users not already in the cache are
    /// dropped and `false` is returned.
    pub fn add(&self, context: &Context, email: &str, resource: &str, allowed: bool) -> bool {
        let ttl = if allowed {
            self.conf.positive_ttl()
        } else {
            self.conf.negative_ttl()
        };
        let entry = ResourceAuth {
            allowed,
            expires: expires_after(ttl),
            resource: resource.to_string(),
        };

        let mut table = self
            .by_email
            .write()
            .expect("ResourceAuthCache::by_email lock poisoned");
        let at_capacity = table.len() >= self.conf.max_entries;
        let cached = match table.get_mut(email) {
            Some(entries) => {
                match entries.iter_mut().find(|e| e.resource == resource) {
                    Some(existing) => *existing = entry,
                    None => entries.push(entry),
                }
                true
            }
            None if at_capacity => false,
            None => {
                table.insert(email.to_string(), vec![entry]);
                true
            }
        };
        drop(table);
        if !cached {
            refused(context, "resource", email, self.conf.max_entries);
        }
        cached
    }

    /// Configuration the cache was created with.
    pub fn conf(&self) -> &ResourceAuthConf {
        &self.conf
    }

    /// Number of users with cached decisions.
    pub fn len(&self) -> usize {
        self.by_email
            .read()
            .expect("ResourceAuthCache::by_email lock poisoned")
            .len()
    }

    /// Check if no decision is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an unexpired decision for a user and resource.
    pub fn lookup(&self, email: &str, resource: &str) -> Option<bool> {
        let now = Instant::now();
        let table = self
            .by_email
            .read()
            .expect("ResourceAuthCache::by_email lock poisoned");
        let decision = table.get(email).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.resource == resource && entry.expires > now)
                .map(|entry| entry.allowed)
        });
        match decision {
            Some(_) => crate::telemetry::CACHE_HIT.inc(),
            None => crate::telemetry::CACHE_MISS.inc(),
        }
        decision
    }

    /// Look up the unexpired classification of a service.
    pub fn service_type(&self, service: &str) -> Option<String> {
        lookup_class(&self.service_types, service)
    }

    /// Cache the classification of a service.
    pub fn set_service_type(&self, context: &Context, service: &str, kind: &str) -> bool {
        let ttl = self.conf.service_type_ttl();
        self.set_class(context, &self.service_types, "service_type", service, kind, ttl)
    }

    /// Cache the classification of a user.
    pub fn set_user_type(&self, context: &Context, email: &str, kind: &str) -> bool {
        let ttl = self.conf.user_type_ttl();
        self.set_class(context, &self.user_types, "user_type", email, kind, ttl)
    }

    /// Remove expired entries from all tables and return how many were removed.
    ///
    /// Tables are scanned under a read lock and only locked for writing when
    /// expired entries are found.
    pub fn sweep(&self, context: &Context) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let table = self
                .by_email
                .read()
                .expect("ResourceAuthCache::by_email lock poisoned");
            table
                .iter()
                .filter(|(_, entries)| entries.iter().any(|entry| entry.expires <= now))
                .map(|(email, _)| email.clone())
                .collect()
        };

        let mut swept = 0;
        if !expired.is_empty() {
            let mut table = self
                .by_email
                .write()
                .expect("ResourceAuthCache::by_email lock poisoned");
            for email in expired {
                let entries = match table.get_mut(&email) {
                    Some(entries) => entries,
                    None => continue,
                };
                let before = entries.len();
                entries.retain(|entry| entry.expires > now);
                swept += before - entries.len();
                if entries.is_empty() {
                    table.remove(&email);
                }
            }
        }
        swept += sweep_classes(&self.service_types, now);
        swept += sweep_classes(&self.user_types, now);

        crate::telemetry::SWEPT.inc_by(swept as f64);
        slog::debug!(context.logger, "Swept resource authorisation cache"; "swept" => swept);
        swept
    }

    /// Look up the unexpired classification of a user.
    pub fn user_type(&self, email: &str) -> Option<String> {
        lookup_class(&self.user_types, email)
    }

    fn set_class(
        &self,
        context: &Context,
        table: &RwLock<HashMap<String, Classification>>,
        name: &'static str,
        key: &str,
        kind: &str,
        ttl: Duration,
    ) -> bool {
        let entry = Classification {
            expires: expires_after(ttl),
            kind: kind.to_string(),
        };
        let mut table = table
            .write()
            .expect("ResourceAuthCache classification lock poisoned");
        if !table.contains_key(key) && table.len() >= self.conf.max_entries {
            drop(table);
            refused(context, name, key, self.conf.max_entries);
            return false;
        }
        table.insert(key.to_string(), entry);
        true
    }
}

/// Expiry instant for an entry cached now, saturating for TTLs too large to represent.
pub(crate) fn expires_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

fn lookup_class(table: &RwLock<HashMap<String, Classification>>, key: &str) -> Option<String> {
    let now = Instant::now();
    table
        .read()
        .expect("ResourceAuthCache classification lock poisoned")
        .get(key)
        .filter(|entry| entry.expires > now)
        .map(|entry| entry.kind.clone())
}

fn refused(context: &Context, table: &'static str, key: &str, capacity: usize) {
    crate::telemetry::CACHE_REFUSED
        .with_label_values(&[table])
        .inc();
    slog::warn!(
        context.logger, "Resource authorisation cache is full, entry not cached";
        "table" => table, "key" => key, "capacity" => capacity,
    );
}

fn sweep_classes(table: &RwLock<HashMap<String, Classification>>, now: Instant) -> usize {
    let expired = {
        let table = table
            .read()
            .expect("ResourceAuthCache classification lock poisoned");
        table.values().filter(|entry| entry.expires <= now).count()
    };
    if expired == 0 {
        return 0;
    }
    let mut table = table
        .write()
        .expect("ResourceAuthCache classification lock poisoned");
    let before = table.len();
    table.retain(|_, entry| entry.expires > now);
    before - table.len()
}

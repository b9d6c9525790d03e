//! Account identifier resolution.
//!
//! Clients may name an account by its numeric id (with or without
//! separators) or by a human name. [`IdentifierResolver::resolve`] turns
//! either into the canonical digit string, trying in order:
//!
//! 1. the input itself, if it is already 8-20 digits
//! 2. the operator-curated alias table
//! 3. the account hierarchy cache, filled on first use
//! 4. a unique fuzzy match at or above the similarity threshold
//!
//! Anything else is reported as unresolved; the resolver never guesses.

pub mod cache;

pub use cache::{AliasCache, AliasCacheEntry};
pub use crate::error::Unresolved;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ResolverConfig;
use crate::upstream::ToolBackend;

static CANONICAL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8,20}$").expect("static pattern"));

/// Characters ignored when reading a numeric id.
const SEPARATORS: [char; 4] = ['-', ' ', '.', '_'];

/// Returns the canonical digits of `input` if it is an 8-20 digit id once
/// separators are removed.
#[must_use]
pub fn canonical_digits(input: &str) -> Option<String> {
    let digits: String = input.trim().chars().filter(|c| !SEPARATORS.contains(c)).collect();
    CANONICAL_SHAPE.is_match(&digits).then_some(digits)
}

/// Lower-cases `input` and drops everything that is not alphanumeric.
#[must_use]
pub fn normalize_key(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resolves account names and ids to canonical ids.
pub struct IdentifierResolver {
    /// Normalised alias to canonical id.
    aliases: HashMap<String, String>,
    cache: Arc<AliasCache>,
    backend: Arc<dyn ToolBackend>,
    threshold: f64,
}

impl IdentifierResolver {
    /// Creates a resolver over a static alias table.
    ///
    /// Alias names are normalised; alias ids that are not canonical are
    /// dropped (configuration validation rejects them earlier).
    #[must_use]
    pub fn new(
        aliases: &BTreeMap<String, String>,
        threshold: f64,
        cache: Arc<AliasCache>,
        backend: Arc<dyn ToolBackend>,
    ) -> Self {
        let aliases = aliases
            .iter()
            .filter_map(|(name, id)| {
                let key = normalize_key(name);
                let id = canonical_digits(id)?;
                (!key.is_empty()).then_some((key, id))
            })
            .collect();
        Self {
            aliases,
            cache,
            backend,
            threshold,
        }
    }

    /// Creates a resolver from configuration.
    #[must_use]
    pub fn from_config(
        config: &ResolverConfig,
        cache: Arc<AliasCache>,
        backend: Arc<dyn ToolBackend>,
    ) -> Self {
        Self::new(&config.aliases, config.similarity_threshold, cache, backend)
    }

    /// The shared alias cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<AliasCache> {
        &self.cache
    }

    /// Resolves `input` to a canonical account id.
    ///
    /// `context_root` is the manager account whose hierarchy may be fetched
    /// to fill the cache. Returns `None` when nothing matches well enough.
    pub async fn resolve(&self, input: &str, context_root: Option<&str>) -> Option<String> {
        if let Some(id) = canonical_digits(input) {
            return Some(id);
        }

        let key = normalize_key(input);
        if key.is_empty() {
            return None;
        }

        if let Some(id) = self.aliases.get(&key) {
            debug!(input, id = %id, "Resolved from alias table");
            return Some(id.clone());
        }

        let cached = match context_root.and_then(canonical_digits) {
            Some(root) => {
                self.cache
                    .get_or_populate(&key, || self.backend.account_hierarchy(&root))
                    .await
            }
            None => self.cache.get(&key),
        };
        if let Some(entry) = cached {
            debug!(input, id = %entry.canonical_id, "Resolved from hierarchy cache");
            return Some(entry.canonical_id);
        }

        self.fuzzy_match(&key)
    }

    /// Resolves each identifier argument in place.
    ///
    /// `login_customer_id` goes first so that its resolved value can serve as
    /// the hierarchy root for the others; otherwise `default_root` is used.
    /// Absent and empty arguments are left alone.
    ///
    /// # Errors
    ///
    /// Returns the first argument that could not be resolved.
    pub async fn resolve_arguments(
        &self,
        arguments: &mut Map<String, Value>,
        fields: &[&str],
        default_root: Option<&str>,
    ) -> Result<(), Unresolved> {
        let mut ordered: Vec<&str> = fields.to_vec();
        ordered.sort_by_key(|f| *f != "login_customer_id");

        let mut root = default_root.map(str::to_string);
        for field in ordered {
            let raw = match arguments.get(field) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) if s.trim().is_empty() => continue,
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(other) => {
                    return Err(Unresolved {
                        argument: field.to_string(),
                        value: other.to_string(),
                    })
                }
            };

            let Some(id) = self.resolve(&raw, root.as_deref()).await else {
                return Err(Unresolved {
                    argument: field.to_string(),
                    value: raw,
                });
            };
            if field == "login_customer_id" {
                root = Some(id.clone());
            }
            arguments.insert(field.to_string(), Value::String(id));
        }
        Ok(())
    }

    /// Picks the single best candidate at or above the threshold.
    ///
    /// Ties between different ids at the top score are ambiguous and
    /// resolve to nothing.
    fn fuzzy_match(&self, key: &str) -> Option<String> {
        let mut candidates: HashMap<String, String> = self.cache.snapshot().into_iter().collect();
        for (alias, id) in &self.aliases {
            candidates.insert(alias.clone(), id.clone());
        }

        let mut best_score = self.threshold;
        let mut best_ids: Vec<&String> = Vec::new();
        for (candidate, id) in &candidates {
            let score = strsim::normalized_levenshtein(key, candidate);
            if score < self.threshold {
                continue;
            }
            if score > best_score + f64::EPSILON {
                best_score = score;
                best_ids.clear();
                best_ids.push(id);
            } else if (score - best_score).abs() <= f64::EPSILON && !best_ids.contains(&id) {
                best_ids.push(id);
            }
        }

        match best_ids.as_slice() {
            [id] => {
                debug!(input = key, id = %id, score = best_score, "Resolved by fuzzy match");
                Some((*id).clone())
            }
            [] => None,
            _ => {
                debug!(input = key, candidates = best_ids.len(), "Ambiguous fuzzy match");
                None
            }
        }
    }
}

impl std::fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierResolver")
            .field("aliases", &self.aliases.len())
            .field("cached", &self.cache.len())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

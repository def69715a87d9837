//! Entity Resolver
//!
//! Normalises user-provided place names to canonical country/admin1/city
//! names via alias tables, exact probes and a fuzzy backstop. Resolution is
//! deterministic for a fixed alias book and idempotent: resolving a
//! canonical name returns it unchanged.
//!
//! The resolver is pure in-memory lookup; probing the warehouse for data
//! presence during a cascade is driven by the query engine, which owns the
//! gateway. `cascade_targets` supplies the ordered (level, name) pairs the
//! engine walks.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::config::ResolverConfig;
use crate::models::{Level, ResolvedEntity};
use crate::utils::{ApiError, ApiResult, StringExt};

// ============================================================================
// Alias book
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CountryRecord {
    pub canonical: String,
    #[serde(default)]
    pub iso3: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Admin1Record {
    pub canonical: String,
    pub country: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityRecord {
    pub canonical: String,
    #[serde(default)]
    pub admin1: Option<String>,
    pub country: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// The read-only alias tables. Loaded once from JSON when a path is
/// configured, otherwise the built-in book is used.
#[derive(Debug, Clone, Deserialize)]
pub struct AliasBook {
    pub countries: Vec<CountryRecord>,
    #[serde(default)]
    pub admin1: Vec<Admin1Record>,
    #[serde(default)]
    pub cities: Vec<CityRecord>,
}

impl AliasBook {
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read alias tables '{}': {}", path, e))?;
        let book: AliasBook = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("malformed alias tables '{}': {}", path, e))?;
        Ok(book)
    }

    /// Curated default book covering the major emitters and their common
    /// short forms.
    pub fn builtin() -> Self {
        fn c(canonical: &str, iso3: &str, aliases: &[&str]) -> CountryRecord {
            CountryRecord {
                canonical: canonical.to_string(),
                iso3: Some(iso3.to_string()),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            }
        }
        fn a1(canonical: &str, country: &str, aliases: &[&str]) -> Admin1Record {
            Admin1Record {
                canonical: canonical.to_string(),
                country: country.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            }
        }
        fn city(canonical: &str, admin1: Option<&str>, country: &str, aliases: &[&str]) -> CityRecord {
            CityRecord {
                canonical: canonical.to_string(),
                admin1: admin1.map(|a| a.to_string()),
                country: country.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            }
        }

        Self {
            countries: vec![
                c("United States of America", "USA", &["usa", "us", "united states", "america"]),
                c("United Kingdom", "GBR", &["uk", "great britain", "britain", "england"]),
                c("Germany", "DEU", &["deutschland", "federal republic of germany"]),
                c("France", "FRA", &[]),
                c("Italy", "ITA", &[]),
                c("Spain", "ESP", &[]),
                c("Netherlands", "NLD", &["holland", "the netherlands"]),
                c("Poland", "POL", &[]),
                c("Sweden", "SWE", &[]),
                c("Norway", "NOR", &[]),
                c("China", "CHN", &["prc", "people's republic of china", "mainland china"]),
                c("India", "IND", &[]),
                c("Japan", "JPN", &[]),
                c("South Korea", "KOR", &["korea", "republic of korea"]),
                c("Indonesia", "IDN", &[]),
                c("Russia", "RUS", &["russian federation"]),
                c("Brazil", "BRA", &[]),
                c("Mexico", "MEX", &[]),
                c("Canada", "CAN", &[]),
                c("Australia", "AUS", &[]),
                c("South Africa", "ZAF", &[]),
                c("Nigeria", "NGA", &[]),
                c("Egypt", "EGY", &[]),
                c("Turkey", "TUR", &["turkiye"]),
                c("Saudi Arabia", "SAU", &["ksa"]),
                c("United Arab Emirates", "ARE", &["uae", "emirates"]),
                c("Argentina", "ARG", &[]),
                c("Chile", "CHL", &[]),
                c("Colombia", "COL", &[]),
                c("Vietnam", "VNM", &["viet nam"]),
                c("Thailand", "THA", &[]),
                c("Pakistan", "PAK", &[]),
                c("Bangladesh", "BGD", &[]),
                c("Iran", "IRN", &["islamic republic of iran"]),
                c("Ukraine", "UKR", &[]),
                c("Switzerland", "CHE", &[]),
                c("Austria", "AUT", &[]),
                c("Belgium", "BEL", &[]),
                c("Portugal", "PRT", &[]),
                c("Greece", "GRC", &[]),
                c("Czechia", "CZE", &["czech republic"]),
                c("Denmark", "DNK", &[]),
                c("Finland", "FIN", &[]),
                c("Ireland", "IRL", &[]),
                c("New Zealand", "NZL", &["nz"]),
            ],
            admin1: vec![
                a1("California", "United States of America", &["ca", "calif"]),
                a1("Texas", "United States of America", &["tx"]),
                a1("New York", "United States of America", &["ny"]),
                a1("Illinois", "United States of America", &[]),
                a1("Bavaria", "Germany", &["bayern"]),
                a1("North Rhine-Westphalia", "Germany", &["nrw", "nordrhein-westfalen"]),
                a1("Ontario", "Canada", &[]),
                a1("Queensland", "Australia", &[]),
                a1("New South Wales", "Australia", &["nsw"]),
                a1("Maharashtra", "India", &[]),
                a1("Guangdong", "China", &[]),
                a1("Sao Paulo", "Brazil", &["são paulo"]),
            ],
            cities: vec![
                city("Berlin", None, "Germany", &[]),
                city("Munich", Some("Bavaria"), "Germany", &["muenchen", "münchen"]),
                city("Cologne", Some("North Rhine-Westphalia"), "Germany", &["koeln", "köln"]),
                city("Los Angeles", Some("California"), "United States of America", &["la"]),
                city("Houston", Some("Texas"), "United States of America", &[]),
                city("New York City", Some("New York"), "United States of America", &["nyc", "new york city"]),
                city("Chicago", Some("Illinois"), "United States of America", &[]),
                city("Toronto", Some("Ontario"), "Canada", &[]),
                city("Brisbane", Some("Queensland"), "Australia", &[]),
                city("Sydney", Some("New South Wales"), "Australia", &[]),
                city("Mumbai", Some("Maharashtra"), "India", &["bombay"]),
                city("Guangzhou", Some("Guangdong"), "China", &["canton"]),
                city("London", None, "United Kingdom", &[]),
                city("Paris", None, "France", &[]),
                city("Tokyo", None, "Japan", &[]),
                city("Shanghai", None, "China", &[]),
            ],
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

struct LevelIndex {
    /// Canonical names in lexical order (determinism for ties).
    canonicals: Vec<String>,
    /// Case-folded alias -> canonical.
    aliases: HashMap<String, String>,
    /// Case-folded canonical -> canonical.
    canonical_folded: HashMap<String, String>,
}

impl LevelIndex {
    fn build<'a>(entries: impl Iterator<Item = (&'a str, &'a [String])>) -> Self {
        let mut canonicals = Vec::new();
        let mut aliases = HashMap::new();
        let mut canonical_folded = HashMap::new();
        for (canonical, alias_list) in entries {
            canonicals.push(canonical.to_string());
            canonical_folded.insert(canonical.fold_key(), canonical.to_string());
            for alias in alias_list {
                aliases.insert(alias.fold_key(), canonical.to_string());
            }
        }
        canonicals.sort();
        Self { canonicals, aliases, canonical_folded }
    }
}

pub struct EntityResolver {
    levels: HashMap<Level, LevelIndex>,
    /// city canonical -> (admin1 canonical, country canonical)
    city_parents: HashMap<String, (Option<String>, String)>,
    /// admin1 canonical -> country canonical
    admin1_parents: HashMap<String, String>,
    /// country canonical -> iso3
    iso3: HashMap<String, String>,
    fuzzy_threshold: f64,
}

impl EntityResolver {
    pub fn new(book: AliasBook, config: &ResolverConfig) -> Self {
        let country_index = LevelIndex::build(
            book.countries
                .iter()
                .map(|r| (r.canonical.as_str(), r.aliases.as_slice())),
        );
        let admin1_index = LevelIndex::build(
            book.admin1
                .iter()
                .map(|r| (r.canonical.as_str(), r.aliases.as_slice())),
        );
        let city_index = LevelIndex::build(
            book.cities
                .iter()
                .map(|r| (r.canonical.as_str(), r.aliases.as_slice())),
        );

        let mut levels = HashMap::new();
        levels.insert(Level::Country, country_index);
        levels.insert(Level::Admin1, admin1_index);
        levels.insert(Level::City, city_index);

        let city_parents = book
            .cities
            .iter()
            .map(|r| (r.canonical.clone(), (r.admin1.clone(), r.country.clone())))
            .collect();
        let admin1_parents = book
            .admin1
            .iter()
            .map(|r| (r.canonical.clone(), r.country.clone()))
            .collect();
        let iso3 = book
            .countries
            .iter()
            .filter_map(|r| r.iso3.clone().map(|code| (r.canonical.clone(), code)))
            .collect();

        Self {
            levels,
            city_parents,
            admin1_parents,
            iso3,
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, anyhow::Error> {
        let book = match &config.aliases_path {
            Some(path) => AliasBook::load(path)?,
            None => AliasBook::builtin(),
        };
        Ok(Self::new(book, config))
    }

    pub fn iso3(&self, country_canonical: &str) -> Option<&str> {
        self.iso3.get(country_canonical).map(|s| s.as_str())
    }

    /// Normalise a raw place name.
    ///
    /// Lookup order: alias tables (country, admin1, city unless hinted),
    /// exact canonical, case-insensitive canonical, fuzzy backstop. Fuzzy
    /// ties break on (similarity, level specificity city > admin1 > country,
    /// lexical order).
    pub fn normalise(&self, raw: &str, hint_level: Option<Level>) -> ApiResult<ResolvedEntity> {
        let Some(trimmed) = raw.clean() else {
            return Err(ApiError::invalid_argument("entity name is empty"));
        };
        let trimmed = trimmed.as_str();
        let folded = trimmed.fold_key();

        let search_order: Vec<Level> = match hint_level {
            Some(level) => vec![level],
            None => vec![Level::Country, Level::Admin1, Level::City],
        };

        // 1. Alias table.
        for level in &search_order {
            if let Some(canonical) = self.levels[level].aliases.get(&folded) {
                return Ok(resolved(trimmed, canonical, *level, 1.0, Vec::new()));
            }
        }

        // 2. Canonical exact, then case-insensitive.
        for level in &search_order {
            let index = &self.levels[level];
            if index.canonicals.iter().any(|c| c == trimmed) {
                return Ok(resolved(trimmed, trimmed, *level, 1.0, Vec::new()));
            }
            if let Some(canonical) = index.canonical_folded.get(&folded) {
                return Ok(resolved(trimmed, canonical, *level, 1.0, Vec::new()));
            }
        }

        // 3. Fuzzy backstop across the searched levels.
        let mut best: Option<(f64, Level, String)> = None;
        for level in &search_order {
            for canonical in &self.levels[level].canonicals {
                let score = strsim::jaro_winkler(&folded, &canonical.to_lowercase());
                let candidate = (score, *level, canonical.clone());
                best = Some(match best.take() {
                    None => candidate,
                    Some(current) => pick_better(current, candidate),
                });
            }
        }

        if let Some((score, level, canonical)) = best
            && score >= self.fuzzy_threshold
        {
            let suggestions = self.suggestions(trimmed, &search_order, 3);
            return Ok(resolved(trimmed, &canonical, level, score, suggestions));
        }

        Err(ApiError::entity_unresolved(trimmed, self.suggestions(trimmed, &search_order, 5)))
    }

    /// Top-k closest canonical names across the given levels, best first.
    fn suggestions(&self, raw: &str, levels: &[Level], k: usize) -> Vec<String> {
        let folded = raw.to_lowercase();
        let mut scored: Vec<(f64, Level, String)> = Vec::new();
        for level in levels {
            for canonical in &self.levels[level].canonicals {
                let score = strsim::jaro_winkler(&folded, &canonical.to_lowercase());
                scored.push((score, *level, canonical.clone()));
            }
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.specificity().cmp(&a.1.specificity()))
                .then(a.2.cmp(&b.2))
        });
        let mut out = Vec::new();
        for (_, _, name) in scored {
            if !out.contains(&name) {
                out.push(name);
                if out.len() == k {
                    break;
                }
            }
        }
        out
    }

    /// Ordered (level, entity-name) pairs for a cascade starting at the
    /// entity's own level and descending towards country. `None` names mark
    /// levels where the parent is unknown; the caller records those as
    /// skipped.
    pub fn cascade_targets(
        &self,
        canonical: &str,
        level: Level,
    ) -> Vec<(Level, Option<String>)> {
        level
            .cascade_chain()
            .iter()
            .map(|target| {
                let name = match (level, target) {
                    (from, to) if from == *to => Some(canonical.to_string()),
                    (Level::City, Level::Admin1) => self
                        .city_parents
                        .get(canonical)
                        .and_then(|(admin1, _)| admin1.clone()),
                    (Level::City, Level::Country) => self
                        .city_parents
                        .get(canonical)
                        .map(|(_, country)| country.clone()),
                    (Level::Admin1, Level::Country) => {
                        self.admin1_parents.get(canonical).cloned()
                    },
                    _ => None,
                };
                (*target, name)
            })
            .collect()
    }
}

fn resolved(
    raw: &str,
    canonical: &str,
    level: Level,
    similarity: f64,
    suggestions: Vec<String>,
) -> ResolvedEntity {
    ResolvedEntity {
        raw_name: raw.to_string(),
        canonical_name: canonical.to_string(),
        level,
        similarity,
        suggestions,
    }
}

/// Deterministic tie-break: similarity, then level specificity, then lexical
/// order.
fn pick_better(
    current: (f64, Level, String),
    candidate: (f64, Level, String),
) -> (f64, Level, String) {
    if candidate.0 > current.0 {
        return candidate;
    }
    if candidate.0 < current.0 {
        return current;
    }
    match candidate.1.specificity().cmp(&current.1.specificity()) {
        std::cmp::Ordering::Greater => candidate,
        std::cmp::Ordering::Less => current,
        std::cmp::Ordering::Equal => {
            if candidate.2 < current.2 {
                candidate
            } else {
                current
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EntityResolver {
        EntityResolver::new(AliasBook::builtin(), &ResolverConfig::default())
    }

    #[test]
    fn alias_lookup_hits_before_fuzzy() {
        let r = resolver();
        let e = r.normalise("USA", None).unwrap();
        assert_eq!(e.canonical_name, "United States of America");
        assert_eq!(e.level, Level::Country);
        assert_eq!(e.similarity, 1.0);
    }

    #[test]
    fn ragged_spacing_still_hits_the_alias_table() {
        let r = resolver();
        let e = r.normalise("  new   york  city ", None).unwrap();
        assert_eq!(e.canonical_name, "New York City");
        assert_eq!(e.level, Level::City);
        assert_eq!(e.similarity, 1.0);

        let e = r.normalise("united   states", None).unwrap();
        assert_eq!(e.canonical_name, "United States of America");
    }

    #[test]
    fn resolution_is_idempotent() {
        let r = resolver();
        let first = r.normalise("Germny", None).unwrap();
        assert_eq!(first.canonical_name, "Germany");
        assert!(first.similarity >= 0.75);

        let second = r.normalise(&first.canonical_name, None).unwrap();
        assert_eq!(second.canonical_name, first.canonical_name);
        assert_eq!(second.similarity, 1.0);
    }

    #[test]
    fn typo_gets_suggestions_with_target_first() {
        let r = resolver();
        let e = r.normalise("Germny", None).unwrap();
        assert_eq!(e.suggestions.first().map(String::as_str), Some("Germany"));
    }

    #[test]
    fn unresolvable_name_errors_with_suggestions() {
        let r = resolver();
        let err = r.normalise("Atlantis", None).unwrap_err();
        assert_eq!(err.kind, crate::utils::ErrorKind::EntityUnresolved);
        assert!(!err.suggestions.is_empty());
    }

    #[test]
    fn hint_level_restricts_search() {
        let r = resolver();
        // "Berlin" only exists at city level; a country hint must not match.
        assert!(r.normalise("Berlin", Some(Level::Country)).is_err());
        let e = r.normalise("Berlin", Some(Level::City)).unwrap();
        assert_eq!(e.level, Level::City);
    }

    #[test]
    fn cascade_targets_walk_parent_chain() {
        let r = resolver();
        let targets = r.cascade_targets("Munich", Level::City);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0], (Level::City, Some("Munich".to_string())));
        assert_eq!(targets[1], (Level::Admin1, Some("Bavaria".to_string())));
        assert_eq!(targets[2], (Level::Country, Some("Germany".to_string())));
    }

    #[test]
    fn cascade_skips_unknown_parents() {
        let r = resolver();
        // Berlin carries no admin1 parent in the book.
        let targets = r.cascade_targets("Berlin", Level::City);
        assert_eq!(targets[1], (Level::Admin1, None));
        assert_eq!(targets[2], (Level::Country, Some("Germany".to_string())));
    }
}

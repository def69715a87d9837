//! Dataset Catalog
//!
//! Loads the warehouse manifest once at startup and serves as the source of
//! truth for what is queryable: dataset descriptors, declared columns and
//! the per-sector quality blocks. Immutable after load.

use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

use crate::models::{
    DatasetDescriptor, FileId, Grain, Level, Manifest, QualityMetadata, Sector, SectorQuality,
};
use crate::utils::{ApiError, ApiResult};

pub struct Catalog {
    data_version: String,
    datasets: HashMap<FileId, DatasetDescriptor>,
    sector_quality: HashMap<Sector, SectorQuality>,
}

impl Catalog {
    /// Load and validate the manifest. Any inconsistency is fatal at
    /// startup.
    pub fn load(manifest_path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(manifest_path).map_err(|e| {
            anyhow::anyhow!("failed to read manifest '{}': {}", manifest_path, e)
        })?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("malformed manifest '{}': {}", manifest_path, e))?;
        Self::from_manifest(manifest)
    }

    pub fn from_manifest(manifest: Manifest) -> Result<Self, anyhow::Error> {
        let mut datasets = HashMap::new();

        for dataset in manifest.datasets {
            if dataset.columns.is_empty() {
                anyhow::bail!("dataset '{}' declares no columns", dataset.file_id);
            }
            if !is_safe_identifier(&dataset.physical_table) {
                anyhow::bail!(
                    "dataset '{}' has unsafe physical table name '{}'",
                    dataset.file_id,
                    dataset.physical_table
                );
            }
            for column in &dataset.columns {
                if !is_safe_identifier(&column.name) {
                    anyhow::bail!(
                        "dataset '{}' declares unsafe column name '{}'",
                        dataset.file_id,
                        column.name
                    );
                }
            }
            if dataset.start_year > dataset.end_year {
                anyhow::bail!("dataset '{}' has inverted year coverage", dataset.file_id);
            }
            if !manifest.sector_quality.contains_key(&dataset.file_id.sector) {
                anyhow::bail!(
                    "dataset '{}' has no sector quality block for '{}'",
                    dataset.file_id,
                    dataset.file_id.sector
                );
            }
            if datasets.insert(dataset.file_id, dataset).is_some() {
                anyhow::bail!("duplicate dataset descriptor in manifest");
            }
        }

        for (sector, block) in &manifest.sector_quality {
            if block.quality_score > 100 {
                anyhow::bail!("sector '{}' quality_score out of range", sector);
            }
            if block.uncertainty_pct < 0.0 {
                anyhow::bail!("sector '{}' uncertainty_pct is negative", sector);
            }
        }

        tracing::info!(
            datasets = datasets.len(),
            sectors = manifest.sector_quality.len(),
            data_version = %manifest.data_version,
            "catalog loaded"
        );

        Ok(Self {
            data_version: manifest.data_version,
            datasets,
            sector_quality: manifest.sector_quality,
        })
    }

    pub fn data_version(&self) -> &str {
        &self.data_version
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    /// All descriptors, ordered by file_id for stable listings.
    pub fn list_datasets(&self) -> Vec<&DatasetDescriptor> {
        let mut all: Vec<&DatasetDescriptor> = self.datasets.values().collect();
        all.sort_by_key(|d| d.file_id.to_string());
        all
    }

    /// Look up a descriptor by its canonical string id.
    pub fn schema(&self, file_id: &str) -> ApiResult<&DatasetDescriptor> {
        match FileId::from_str(file_id) {
            Ok(id) => self.datasets.get(&id).ok_or_else(|| {
                ApiError::unknown_dataset(file_id, self.nearest_file_ids(file_id, 3))
            }),
            Err(_) => {
                Err(ApiError::unknown_dataset(file_id, self.nearest_file_ids(file_id, 3)))
            },
        }
    }

    pub fn get(&self, file_id: FileId) -> Option<&DatasetDescriptor> {
        self.datasets.get(&file_id)
    }

    /// Descriptor for a (sector, level, grain) combination, if the warehouse
    /// carries it. Missing combinations are never fabricated.
    pub fn dataset_for(
        &self,
        sector: Sector,
        level: Level,
        grain: Grain,
    ) -> Option<&DatasetDescriptor> {
        self.datasets.get(&FileId::new(sector, level, grain))
    }

    /// Verify each requested column exists on the dataset; on a miss the
    /// error carries the closest declared names.
    pub fn resolve_columns(&self, file_id: &str, requested: &[String]) -> ApiResult<Vec<String>> {
        let dataset = self.schema(file_id)?;
        let mut resolved = Vec::with_capacity(requested.len());
        for name in requested {
            if dataset.has_column(name) {
                resolved.push(name.clone());
            } else {
                let nearest = nearest_matches(name, dataset.column_names().into_iter(), 3);
                return Err(ApiError::unknown_column(name, nearest));
            }
        }
        Ok(resolved)
    }

    pub fn sector_quality(&self, sector: Sector) -> ApiResult<&SectorQuality> {
        self.sector_quality.get(&sector).ok_or_else(|| {
            ApiError::internal_error(format!("no quality block for sector '{}'", sector))
        })
    }

    /// Quality metadata echoed verbatim from the sector block, stamped with
    /// the warehouse version.
    pub fn quality_metadata(&self, sector: Sector) -> ApiResult<QualityMetadata> {
        Ok(QualityMetadata::from_block(sector, self.sector_quality(sector)?, &self.data_version))
    }

    fn nearest_file_ids(&self, target: &str, k: usize) -> Vec<String> {
        nearest_matches(target, self.datasets.keys().map(|id| id.to_string()), k)
    }
}

/// Top-k closest candidates by Jaro-Winkler similarity, best first.
pub fn nearest_matches<I, S>(target: &str, candidates: I, k: usize) -> Vec<String>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let target_lower = target.to_lowercase();
    let mut scored: Vec<(f64, String)> = candidates
        .map(|c| {
            let score = strsim::jaro_winkler(&target_lower, &c.as_ref().to_lowercase());
            (score, c.as_ref().to_string())
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, name)| name).collect()
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_identifier_rules() {
        assert!(is_safe_identifier("transport_country_year"));
        assert!(is_safe_identifier("emissions_tonnes"));
        assert!(!is_safe_identifier("drop table"));
        assert!(!is_safe_identifier("1abc"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("a;b"));
    }

    #[test]
    fn nearest_matches_orders_by_similarity() {
        let candidates = ["emissions_tonnes", "emissions_mt", "country_name"];
        let top = nearest_matches("emisions_tonnes", candidates.iter(), 2);
        assert_eq!(top[0], "emissions_tonnes");
    }
}

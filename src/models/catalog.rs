//! Catalog Data Models
//!
//! Dataset descriptors, column descriptors and sector quality blocks loaded
//! from the warehouse manifest at startup. All of these are immutable after
//! load.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Sector / Level / Grain
// ============================================================================

/// The eight EDGAR emission sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Sector {
    Transport,
    Power,
    Agriculture,
    Waste,
    Buildings,
    FuelExploitation,
    IndustrialCombustion,
    IndustrialProcesses,
}

impl Sector {
    pub const ALL: [Sector; 8] = [
        Sector::Transport,
        Sector::Power,
        Sector::Agriculture,
        Sector::Waste,
        Sector::Buildings,
        Sector::FuelExploitation,
        Sector::IndustrialCombustion,
        Sector::IndustrialProcesses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Power => "power",
            Self::Agriculture => "agriculture",
            Self::Waste => "waste",
            Self::Buildings => "buildings",
            Self::FuelExploitation => "fuel-exploitation",
            Self::IndustrialCombustion => "industrial-combustion",
            Self::IndustrialProcesses => "industrial-processes",
        }
    }

    /// Human-readable sector name used in answer headers.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Transport => "Transport",
            Self::Power => "Power",
            Self::Agriculture => "Agriculture",
            Self::Waste => "Waste",
            Self::Buildings => "Buildings",
            Self::FuelExploitation => "Fuel Exploitation",
            Self::IndustrialCombustion => "Industrial Combustion",
            Self::IndustrialProcesses => "Industrial Processes",
        }
    }
}

impl FromStr for Sector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(Self::Transport),
            "power" => Ok(Self::Power),
            "agriculture" => Ok(Self::Agriculture),
            "waste" => Ok(Self::Waste),
            "buildings" => Ok(Self::Buildings),
            "fuel-exploitation" => Ok(Self::FuelExploitation),
            "industrial-combustion" => Ok(Self::IndustrialCombustion),
            "industrial-processes" => Ok(Self::IndustrialProcesses),
            other => Err(format!("unknown sector '{}'", other)),
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic level of a dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Country,
    Admin1,
    City,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Country => "country",
            Self::Admin1 => "admin1",
            Self::City => "city",
        }
    }

    /// Higher value = more specific geography. Used for resolver tie-breaks.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::Country => 0,
            Self::Admin1 => 1,
            Self::City => 2,
        }
    }

    /// Fallback order when cascading from this level towards country.
    pub fn cascade_chain(&self) -> &'static [Level] {
        match self {
            Self::City => &[Level::City, Level::Admin1, Level::Country],
            Self::Admin1 => &[Level::Admin1, Level::Country],
            Self::Country => &[Level::Country],
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "country" => Ok(Self::Country),
            "admin1" => Ok(Self::Admin1),
            "city" => Ok(Self::City),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal grain of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Grain {
    Year,
    Month,
}

impl Grain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
        }
    }
}

impl FromStr for Grain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            other => Err(format!("unknown grain '{}'", other)),
        }
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FileId
// ============================================================================

/// Canonical dataset identifier, format `<sector>-<level>-<grain>`.
///
/// The sector itself may contain dashes (`fuel-exploitation`), so parsing
/// peels level and grain off the tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub sector: Sector,
    pub level: Level,
    pub grain: Grain,
}

impl FileId {
    pub fn new(sector: Sector, level: Level, grain: Grain) -> Self {
        Self { sector, level, grain }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.sector.as_str(), self.level.as_str(), self.grain.as_str())
    }
}

impl FromStr for FileId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, grain_str) = s
            .rsplit_once('-')
            .ok_or_else(|| format!("malformed file_id '{}'", s))?;
        let (sector_str, level_str) = rest
            .rsplit_once('-')
            .ok_or_else(|| format!("malformed file_id '{}'", s))?;

        let sector = Sector::from_str(sector_str)?;
        let level = Level::from_str(level_str)?;
        let grain = Grain::from_str(grain_str)?;
        Ok(Self { sector, level, grain })
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FileId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Columns
// ============================================================================

/// Semantic type of a declared column. The query engine type-checks filter
/// values against this, not against SQLite's dynamic types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnKind {
    Identifier,
    Categorical,
    IntegerYear,
    IntegerMonth,
    MeasureTonnes,
    MeasureMt,
    QualityScore,
    ConfidenceTier,
    UncertaintyPct,
    Flag,
    String,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Categorical => "categorical",
            Self::IntegerYear => "integer-year",
            Self::IntegerMonth => "integer-month",
            Self::MeasureTonnes => "measure-tonnes",
            Self::MeasureMt => "measure-mt",
            Self::QualityScore => "quality-score",
            Self::ConfidenceTier => "confidence-tier",
            Self::UncertaintyPct => "uncertainty-pct",
            Self::Flag => "flag",
            Self::String => "string",
        }
    }

    /// Whether filter values for this column must be numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::IntegerYear
                | Self::IntegerMonth
                | Self::MeasureTonnes
                | Self::MeasureMt
                | Self::QualityScore
                | Self::UncertaintyPct
                | Self::Flag
        )
    }
}

/// Declared column of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

/// Names of the per-row quality columns a physical table may carry. When all
/// of them are declared the dataset advertises per-row quality support.
pub const PER_ROW_QUALITY_COLUMNS: [&str; 8] = [
    "quality_score",
    "confidence_level",
    "uncertainty_pct",
    "uncertainty_low",
    "uncertainty_high",
    "is_synthetic",
    "data_source",
    "validation_status",
];

// ============================================================================
// Sector Quality Block
// ============================================================================

/// Confidence tier attached to a sector's quality assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            other => Err(format!("unknown confidence tier '{}'", other)),
        }
    }
}

/// Static per-sector quality record. Loaded from the manifest at startup and
/// echoed verbatim in every data-bearing response; never recomputed from
/// rows.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SectorQuality {
    /// 0-100.
    pub quality_score: u8,
    /// Tier label, e.g. "Tier 1 (Excellent)".
    pub tier: String,
    pub confidence_tier: ConfidenceTier,
    /// Non-negative uncertainty bound in percent.
    pub uncertainty_pct: f64,
    /// Ordered list of external validation sources.
    pub external_sources: Vec<String>,
    #[serde(default)]
    pub records_enhanced: u64,
    #[serde(default)]
    pub synthetic_percent: f64,
    #[serde(default)]
    pub notes: String,
}

// ============================================================================
// Dataset Descriptor
// ============================================================================

/// Immutable manifest entry describing one queryable dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub file_id: FileId,
    pub physical_table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default = "default_spatial_coverage")]
    pub spatial_coverage: String,
}

fn default_spatial_coverage() -> String {
    "global".to_string()
}

impl DatasetDescriptor {
    pub fn sector(&self) -> Sector {
        self.file_id.sector
    }

    pub fn level(&self) -> Level {
        self.file_id.level
    }

    pub fn grain(&self) -> Grain {
        self.file_id.grain
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// True when the physical table carries the full per-row quality column
    /// set. Feature-detected, never assumed.
    pub fn has_per_row_quality(&self) -> bool {
        PER_ROW_QUALITY_COLUMNS.iter().all(|c| self.has_column(c))
    }

    /// The identity column for the dataset's geographic level.
    pub fn entity_column(&self) -> &'static str {
        match self.file_id.level {
            Level::Country => "country_name",
            Level::Admin1 => "admin1_name",
            Level::City => "city_name",
        }
    }

    pub fn covers_year(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    /// Nearest covered year for out-of-coverage warnings.
    pub fn nearest_year(&self, year: i32) -> i32 {
        year.clamp(self.start_year, self.end_year)
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// On-disk manifest, parsed once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Upstream dataset vintage, e.g. "EDGAR v2024".
    pub data_version: String,
    pub datasets: Vec<DatasetDescriptor>,
    /// Keyed by sector slug (`transport`, `fuel-exploitation`, ...).
    pub sector_quality: std::collections::HashMap<Sector, SectorQuality>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_round_trips_all_combinations() {
        for sector in Sector::ALL {
            for level in [Level::Country, Level::Admin1, Level::City] {
                for grain in [Grain::Year, Grain::Month] {
                    let id = FileId::new(sector, level, grain);
                    let parsed: FileId = id.to_string().parse().unwrap();
                    assert_eq!(parsed, id);
                }
            }
        }
    }

    #[test]
    fn file_id_with_dashed_sector_parses() {
        let id: FileId = "fuel-exploitation-admin1-month".parse().unwrap();
        assert_eq!(id.sector, Sector::FuelExploitation);
        assert_eq!(id.level, Level::Admin1);
        assert_eq!(id.grain, Grain::Month);
    }

    #[test]
    fn malformed_file_id_is_rejected() {
        assert!("transport-country".parse::<FileId>().is_err());
        assert!("transport-country-week".parse::<FileId>().is_err());
        assert!("shipping-country-year".parse::<FileId>().is_err());
    }

    #[test]
    fn cascade_chain_descends_to_country() {
        assert_eq!(Level::City.cascade_chain(), &[Level::City, Level::Admin1, Level::Country]);
        assert_eq!(Level::Country.cascade_chain(), &[Level::Country]);
    }
}

//! Static pipeline configuration: which leagues are tracked, from which
//! season advanced per-match stats exist, and where the data tree lives.

use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const GENDER: &str = "M";

/// Seasons before this are never ingested.
pub const MIN_SEASON_END_YEAR: i64 = 2018;

pub const COUNTRIES: &[&str] = &["ENG", "GER", "ITA", "FRA", "ESP", "USA"];

#[derive(Debug, Clone, Copy)]
pub struct LeagueConfig {
    pub country: &'static str,
    pub tier: &'static str,
    /// First season-end year with rich per-match stats on the source site.
    /// `None` means the competition never publishes them; such fixtures are
    /// only required in the basic datasets.
    pub min_advanced_season: Option<i64>,
}

pub const LEAGUES: &[LeagueConfig] = &[
    LeagueConfig { country: "ENG", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "GER", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "ITA", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "FRA", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "ESP", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "USA", tier: "1st", min_advanced_season: Some(2018) },
    LeagueConfig { country: "ENG", tier: "2nd", min_advanced_season: Some(2019) },
    LeagueConfig { country: "ENG", tier: "3rd", min_advanced_season: None },
    LeagueConfig { country: "ENG", tier: "4th", min_advanced_season: None },
    LeagueConfig { country: "ENG", tier: "5th", min_advanced_season: None },
];

pub fn league_config(country: &str, tier: &str) -> Option<&'static LeagueConfig> {
    LEAGUES
        .iter()
        .find(|l| l.country == country && l.tier == tier)
}

/// Unknown (country, tier) combinations are a configuration error; fail
/// before touching any file.
pub fn validate_partition(country: &str, tier: &str) -> Result<()> {
    league_config(country, tier)
        .map(|_| ())
        .ok_or_else(|| anyhow!("unknown country/tier combination {country}/{tier}"))
}

/// On-disk layout of the data tree. Defaults to `data/` under the working
/// directory; `FBREF_DATA_DIR` overrides the base.
#[derive(Debug, Clone)]
pub struct Paths {
    pub ingest_dir: PathBuf,
    pub stage_dir: PathBuf,
    pub extract_dir: PathBuf,
}

impl Paths {
    pub fn from_env() -> Paths {
        let base = std::env::var("FBREF_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Paths::from_base(&base)
    }

    pub fn from_base(base: &std::path::Path) -> Paths {
        Paths {
            ingest_dir: base.join("ingest").join("fbref"),
            stage_dir: base.join("ingest").join("stage"),
            extract_dir: base.join("extract"),
        }
    }
}

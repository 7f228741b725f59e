//! City seed list loading
//!
//! Seeds are city identifiers shaped `<city>-<region>`. The list is read from a
//! JSON file that is either a flat array of identifiers or an object mapping a
//! region code to its city names.

use crate::config::types::SeedConfig;
use crate::HarvestError;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Flat(Vec<String>),
    ByRegion(IndexMap<String, Vec<String>>),
}

/// Seeds accepted for crawling, plus those filtered out by the region allow-list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSelection {
    pub accepted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Returns the region code of a `<city>-<region>` seed
pub fn seed_region(seed: &str) -> Option<&str> {
    seed.rsplit_once('-')
        .map(|(_, region)| region)
        .filter(|region| !region.is_empty())
}

/// Splits seeds into accepted and skipped according to the allow-list
///
/// An empty allow-list accepts every seed that has a region suffix.
pub fn select_seeds(seeds: Vec<String>, allowed_regions: &[String]) -> SeedSelection {
    let mut selection = SeedSelection::default();

    for seed in seeds {
        let allowed = match seed_region(&seed) {
            Some(region) => {
                allowed_regions.is_empty()
                    || allowed_regions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(region))
            }
            None => false,
        };

        if allowed {
            selection.accepted.push(seed);
        } else {
            tracing::debug!("Skipping seed {} (region not allowed)", seed);
            selection.skipped.push(seed);
        }
    }

    selection
}

/// Parses seed-file content into `<city>-<region>` identifiers in file order
pub fn parse_seeds(content: &str) -> Result<Vec<String>, serde_json::Error> {
    let seeds = match serde_json::from_str::<SeedFile>(content)? {
        SeedFile::Flat(seeds) => seeds,
        SeedFile::ByRegion(regions) => regions
            .into_iter()
            .flat_map(|(region, cities)| {
                cities
                    .into_iter()
                    .map(move |city| format!("{}-{}", city, region))
            })
            .collect(),
    };
    Ok(seeds)
}

/// Reads the seed file and applies the region allow-list
///
/// A missing or unreadable seed list is run-fatal.
pub fn load_seeds(config: &SeedConfig) -> Result<SeedSelection, HarvestError> {
    let path = Path::new(&config.path);
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::Seeds {
        path: config.path.clone(),
        message: e.to_string(),
    })?;

    let seeds = parse_seeds(&content).map_err(|e| HarvestError::Seeds {
        path: config.path.clone(),
        message: e.to_string(),
    })?;

    Ok(select_seeds(seeds, &config.allowed_regions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_seed_region() {
        assert_eq!(seed_region("berkeley-ca"), Some("ca"));
        assert_eq!(seed_region("new-york-ny"), Some("ny"));
        assert_eq!(seed_region("nowhere"), None);
        assert_eq!(seed_region("dangling-"), None);
    }

    #[test]
    fn test_parse_flat_list() {
        let seeds = parse_seeds(r#"["berkeley-ca", "austin-tx"]"#).unwrap();
        assert_eq!(seeds, vec!["berkeley-ca", "austin-tx"]);
    }

    #[test]
    fn test_parse_region_map() {
        let seeds = parse_seeds(r#"{"ca": ["berkeley", "oakland"], "tx": ["austin"]}"#).unwrap();
        assert_eq!(seeds, vec!["berkeley-ca", "oakland-ca", "austin-tx"]);
    }

    #[test]
    fn test_region_map_keeps_file_order() {
        let seeds = parse_seeds(r#"{"tx": ["austin", "dallas"], "ca": ["berkeley"]}"#).unwrap();
        assert_eq!(seeds, vec!["austin-tx", "dallas-tx", "berkeley-ca"]);
    }

    #[test]
    fn test_allow_list_filters_before_requests() {
        let seeds = vec![
            "berkeley-ca".to_string(),
            "austin-tx".to_string(),
            "oakland-CA".to_string(),
        ];
        let selection = select_seeds(seeds, &["ca".to_string()]);
        assert_eq!(selection.accepted, vec!["berkeley-ca", "oakland-CA"]);
        assert_eq!(selection.skipped, vec!["austin-tx"]);
    }

    #[test]
    fn test_empty_allow_list_accepts_all() {
        let selection = select_seeds(vec!["berkeley-ca".to_string()], &[]);
        assert_eq!(selection.accepted, vec!["berkeley-ca"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn test_missing_seed_file_is_fatal() {
        let config = SeedConfig {
            path: "/nonexistent/cities.json".to_string(),
            allowed_regions: vec![],
        };
        assert!(matches!(
            load_seeds(&config),
            Err(HarvestError::Seeds { .. })
        ));
    }

    #[test]
    fn test_load_seeds_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"ca": ["berkeley"], "wa": ["seattle"]}"#)
            .unwrap();
        let config = SeedConfig {
            path: file.path().to_string_lossy().into_owned(),
            allowed_regions: vec!["ca".to_string()],
        };

        let selection = load_seeds(&config).unwrap();
        assert_eq!(selection.accepted, vec!["berkeley-ca"]);
        assert_eq!(selection.skipped, vec!["seattle-wa"]);
    }
}

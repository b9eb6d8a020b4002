//! Map catalog.
//!
//! Maps are JSON files anywhere below the maps directory. They are
//! advertised to clients as `/maps/<relative path>` with `/` separators.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

/// URL prefix of advertised map paths.
pub const MAP_URL_PREFIX: &str = "/maps/";

/// Map files found under one root directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapCatalog {
    root: PathBuf,
    entries: Vec<String>,
}

impl MapCatalog {
    /// Recursively scan `root` for `.json` files.
    ///
    /// A missing or unreadable directory yields an empty catalog.
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut entries = Vec::new();
        collect(&root, &root, &mut entries);
        entries.sort();

        if entries.is_empty() {
            tracing::warn!(root = %root.display(), "No maps found");
        } else {
            tracing::info!(root = %root.display(), count = entries.len(), "Scanned maps");
        }
        Self { root, entries }
    }

    /// Build a catalog from known entries (no filesystem access).
    pub fn from_entries(root: impl Into<PathBuf>, mut entries: Vec<String>) -> Self {
        entries.sort();
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Advertised map paths, sorted.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns true if no maps were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick a map uniformly at random.
    ///
    /// Files named `map<N>.json` are preferred; other maps are only used
    /// when there are none of those.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        let numbered: Vec<&str> = self
            .entries
            .iter()
            .map(String::as_str)
            .filter(|path| is_numbered_map(path))
            .collect();
        if numbered.is_empty() {
            self.entries.choose(rng).map(String::as_str)
        } else {
            numbered.choose(rng).copied()
        }
    }

    /// Filesystem path of an advertised map path.
    #[must_use]
    pub fn resolve(&self, map_path: &str) -> PathBuf {
        let relative = map_path
            .strip_prefix(MAP_URL_PREFIX)
            .unwrap_or(map_path)
            .trim_start_matches('/');
        relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn collect(root: &Path, dir: &Path, entries: &mut Vec<String>) {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "Failed to read maps directory: {e}");
            return;
        }
    };

    for entry in listing.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, entries);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            if let Ok(relative) = path.strip_prefix(root) {
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                entries.push(format!("{MAP_URL_PREFIX}{}", parts.join("/")));
            }
        }
    }
}

/// `map<digits>.json`, case-insensitive, on the file name only.
fn is_numbered_map(map_path: &str) -> bool {
    let name = map_path.rsplit('/').next().unwrap_or(map_path).to_ascii_lowercase();
    name.strip_prefix("map")
        .and_then(|rest| rest.strip_suffix(".json"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_scan_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Desert")).unwrap();
        fs::create_dir_all(dir.path().join("Ice/extra")).unwrap();
        fs::write(dir.path().join("Desert/map1.json"), "{}").unwrap();
        fs::write(dir.path().join("Ice/extra/arena.json"), "{}").unwrap();
        fs::write(dir.path().join("Ice/notes.txt"), "").unwrap();

        let catalog = MapCatalog::scan(dir.path());
        assert_eq!(
            catalog.entries(),
            ["/maps/Desert/map1.json", "/maps/Ice/extra/arena.json"]
        );
        assert_eq!(
            catalog.resolve("/maps/Desert/map1.json"),
            dir.path().join("Desert").join("map1.json")
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MapCatalog::scan(dir.path().join("missing"));
        assert!(catalog.is_empty());
        assert_eq!(catalog.pick(&mut StdRng::seed_from_u64(0)), None);
    }

    #[test]
    fn test_pick_prefers_numbered_maps() {
        let catalog = MapCatalog::from_entries(
            "maps",
            vec![
                "/maps/Red/arena.json".into(),
                "/maps/Red/MAP12.json".into(),
                "/maps/Lunar/map3.json".into(),
                "/maps/Lunar/mapx.json".into(),
            ],
        );
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let picked = catalog.pick(&mut rng).unwrap();
            assert!(picked.ends_with("MAP12.json") || picked.ends_with("map3.json"));
        }

        let plain = MapCatalog::from_entries("maps", vec!["/maps/arena.json".into()]);
        assert_eq!(plain.pick(&mut rng), Some("/maps/arena.json"));
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let catalog = MapCatalog::from_entries("/srv/maps", Vec::new());
        assert_eq!(
            catalog.resolve("/maps/../../etc/passwd"),
            PathBuf::from("/srv/maps/etc/passwd")
        );
    }
}

//! Where a bundle asset lives

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// A local file path or a remote URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Local(PathBuf),
    Remote(Url),
}

impl Locator {
    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote(_))
    }

    /// Resolve a relative local path against `base`; URLs are returned unchanged
    pub fn relative_to(&self, base: &Path) -> Locator {
        match self {
            Locator::Local(path) if path.is_relative() => Locator::Local(base.join(path)),
            other => other.clone(),
        }
    }

    /// Last path segment, for display
    pub fn file_name(&self) -> Option<String> {
        match self {
            Locator::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Locator::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty locator".to_string());
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Url::parse(s)
                .map(Locator::Remote)
                .map_err(|e| format!("invalid URL '{}': {}", s, e));
        }
        if lower.starts_with("file://") {
            let url = Url::parse(s).map_err(|e| format!("invalid file URL '{}': {}", s, e))?;
            return url
                .to_file_path()
                .map(Locator::Local)
                .map_err(|_| format!("file URL '{}' has no local path", s));
        }
        Ok(Locator::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Local(path) => write!(f, "{}", path.display()),
            Locator::Remote(url) => write!(f, "{}", url),
        }
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locators() {
        let remote: Locator = "https://example.com/demo/content.xml".parse().unwrap();
        assert!(remote.is_remote());
        assert_eq!(remote.file_name().as_deref(), Some("content.xml"));

        let local: Locator = "demo/content.xml".parse().unwrap();
        assert_eq!(local, Locator::Local(PathBuf::from("demo/content.xml")));
        assert_eq!(
            local.relative_to(Path::new("/srv/bundles")),
            Locator::Local(PathBuf::from("/srv/bundles/demo/content.xml"))
        );

        assert!("".parse::<Locator>().is_err());
        assert!("https://".parse::<Locator>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let locator: Locator = "https://example.com/w.wie".parse().unwrap();
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, r#""https://example.com/w.wie""#);
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
    }
}

//! Input rows and row identities.
//!
//! Rows come from a CSV table with at least a URL column. Identity and
//! category columns are optional; header names are matched against a small
//! alias list so exports from different tools load without editing.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ModelError, ModelResult};

/// Header aliases for the URL column.
pub const URL_ALIASES: &[&str] = &["website url", "url", "website", "site", "page url"];
/// Header aliases for the identity column.
pub const IDENTITY_ALIASES: &[&str] = &[
    "instagram username",
    "username",
    "identity",
    "handle",
    "slug",
];
/// Header aliases for the category column.
pub const CATEGORY_ALIASES: &[&str] = &["niche", "category", "overlay"];

/// Stable, storage-key-safe identity of a row.
///
/// Only `[a-z0-9._-]` survive normalization, and the slug never starts or
/// ends with a separator, so it can be used both as a key prefix and as a
/// local directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIdentity(String);

impl RowIdentity {
    /// Normalize a raw identity. Returns `None` if nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let slug = slugify(raw);
        if slug.is_empty() {
            None
        } else {
            Some(Self(slug))
        }
    }

    /// Derive an identity from the row URL (host plus path).
    ///
    /// Falls back to a hash of the raw URL when it has no usable host.
    pub fn derive_from_url(url: &str) -> Self {
        let trimmed = url.trim();
        let parsed = url::Url::parse(trimmed)
            .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
            .ok();

        if let Some(parsed) = parsed {
            if let Some(host) = parsed.host_str() {
                let host = host.strip_prefix("www.").unwrap_or(host);
                let path = parsed.path().trim_matches('/');
                let raw = if path.is_empty() {
                    host.to_string()
                } else {
                    format!("{}-{}", host, path)
                };
                if let Some(identity) = Self::parse(&raw) {
                    return identity;
                }
            }
        }

        Self(format!("row-{}", short_hash(trimmed)))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 64-bit seed derived from the identity, used to reproduce per-row
    /// randomness (scroll jitter, overlay placement) across re-runs.
    pub fn seed(&self) -> u64 {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work: a target page plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    /// Target page URL (never empty)
    pub url: String,
    /// Stable per-row identity
    pub identity: RowIdentity,
    /// Category selecting the overlay clip, normalized like identities
    pub category: String,
}

impl InputRow {
    /// Build a row, deriving the identity from the URL when none is given.
    pub fn new(url: &str, identity: Option<&str>, category: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let identity = identity
            .and_then(RowIdentity::parse)
            .unwrap_or_else(|| RowIdentity::derive_from_url(url));

        Some(Self {
            url: url.to_string(),
            identity,
            category: category_slug(category),
        })
    }
}

/// A CSV record that could not be turned into an [`InputRow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line number in the source file
    pub line: u64,
    pub reason: String,
}

/// Result of parsing an input table.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Accepted rows, in file order
    pub rows: Vec<InputRow>,
    /// Records skipped during parsing
    pub rejected: Vec<RejectedRow>,
}

impl RowSet {
    /// Unique categories referenced by the given rows, sorted.
    pub fn categories<'a>(rows: impl IntoIterator<Item = &'a InputRow>) -> Vec<String> {
        let mut categories: Vec<String> = rows
            .into_iter()
            .map(|r| r.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// Parse an input table.
///
/// The URL column is required. Records with an empty URL are rejected but do
/// not abort parsing, so a stray blank line cannot take down a whole batch.
pub fn parse_rows(data: &[u8]) -> ModelResult<RowSet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let url_col = find_column(&headers, URL_ALIASES)
        .ok_or_else(|| ModelError::missing_column("url"))?;
    let identity_col = find_column(&headers, IDENTITY_ALIASES);
    let category_col = find_column(&headers, CATEGORY_ALIASES);

    let mut set = RowSet::default();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let url = record.get(url_col).unwrap_or("");
        let identity = identity_col.and_then(|i| record.get(i));
        let category = category_col.and_then(|i| record.get(i)).unwrap_or("");

        match InputRow::new(url, identity, category) {
            Some(row) => set.rows.push(row),
            None => set.rejected.push(RejectedRow {
                line,
                reason: "empty url".to_string(),
            }),
        }
    }

    Ok(set)
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
        aliases.iter().any(|a| *a == h)
    })
}

/// Normalize a category so it is safe as a file name and key segment.
///
/// Empty when nothing usable remains.
pub fn category_slug(raw: &str) -> String {
    slugify(raw)
}

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;

    for c in raw.trim().chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out.trim_matches(|c| c == '-' || c == '.').to_string()
}

fn short_hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_normalization() {
        assert_eq!(RowIdentity::parse("  @John.Doe ").unwrap().as_str(), "john.doe");
        assert_eq!(RowIdentity::parse("Café Owner").unwrap().as_str(), "caf-owner");
        assert_eq!(RowIdentity::parse("../etc").unwrap().as_str(), "etc");
        assert!(RowIdentity::parse("   ").is_none());
        assert!(RowIdentity::parse("@@@").is_none());
    }

    #[test]
    fn test_identity_from_url() {
        let id = RowIdentity::derive_from_url("https://www.apple.com/");
        assert_eq!(id.as_str(), "apple.com");

        let id = RowIdentity::derive_from_url("nike.com/running/shoes");
        assert_eq!(id.as_str(), "nike.com-running-shoes");

        // Same input, same identity
        assert_eq!(
            RowIdentity::derive_from_url("not a url at all ::"),
            RowIdentity::derive_from_url("not a url at all ::")
        );
    }

    #[test]
    fn test_identity_seed_is_stable() {
        let a = RowIdentity::parse("tesla").unwrap();
        let b = RowIdentity::parse("TESLA").unwrap();
        let c = RowIdentity::parse("spotify").unwrap();
        assert_eq!(a.seed(), b.seed());
        assert_ne!(a.seed(), c.seed());
    }

    #[test]
    fn test_parse_rows_with_aliases() {
        let csv = "Website URL,Instagram Username,Niche\n\
                   https://apple.com,apple,tech\n\
                   https://nike.com,,fitness\n";
        let set = parse_rows(csv.as_bytes()).unwrap();

        assert_eq!(set.rows.len(), 2);
        assert_eq!(set.rows[0].identity.as_str(), "apple");
        assert_eq!(set.rows[0].category, "tech");
        assert_eq!(set.rows[1].identity.as_str(), "nike.com");
        assert!(set.rejected.is_empty());
    }

    #[test]
    fn test_parse_rows_rejects_empty_url() {
        let csv = "url,category\nhttps://a.com,x\n,y\nhttps://b.com,y\n";
        let set = parse_rows(csv.as_bytes()).unwrap();

        assert_eq!(set.rows.len(), 2);
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.rejected[0].line, 3);
    }

    #[test]
    fn test_parse_rows_requires_url_column() {
        let csv = "name,category\nfoo,bar\n";
        assert!(matches!(
            parse_rows(csv.as_bytes()),
            Err(ModelError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_category_cannot_escape_directories() {
        let row = InputRow::new("https://a.com", None, "../../etc/passwd").unwrap();
        assert_eq!(row.category, "etc-passwd");
        assert!(!row.category.contains('/'));

        let row = InputRow::new("https://a.com", None, " Fitness\\Gym ").unwrap();
        assert_eq!(row.category, "fitness-gym");
        assert_eq!(category_slug(".."), "");
    }

    #[test]
    fn test_categories_dedup() {
        let rows = vec![
            InputRow::new("https://a.com", None, "tech").unwrap(),
            InputRow::new("https://b.com", None, "food").unwrap(),
            InputRow::new("https://c.com", None, "tech").unwrap(),
            InputRow::new("https://d.com", None, "").unwrap(),
        ];
        assert_eq!(RowSet::categories(&rows), vec!["food", "tech"]);
    }
}

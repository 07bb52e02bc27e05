//! Cache keys for rendered tiles.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use map_common::Tile;

/// Item name used in keys when the request does not name one.
const DEFAULT_ITEM: &str = "default";

/// Identity of one rendered tile in the cache.
///
/// Equality and hashing use the raw components, so two sources whose ids only
/// differ in separator characters never share entries. The [`Display`] form is
/// the flattened string used in logs, with `:` `/` `\` `.` replaced by `-`.
///
/// [`Display`]: std::fmt::Display
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCacheKey {
    pub source_id: String,
    pub item: Option<String>,
    pub date_time: DateTime<Utc>,
    pub level: u32,
    pub row: u32,
    pub col: u32,
}

impl TileCacheKey {
    pub fn new(
        source_id: impl Into<String>,
        item: Option<&str>,
        date_time: DateTime<Utc>,
        level: u32,
        tile: &Tile,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            item: item.map(str::to_string),
            date_time,
            level,
            row: tile.row,
            col: tile.col,
        }
    }

    /// True when this key belongs to `source_id`.
    pub fn belongs_to(&self, source_id: &str) -> bool {
        self.source_id == source_id
    }
}

impl std::fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let raw = format!(
            "{}_{}_{}_{}_{}_{}",
            self.source_id,
            self.item.as_deref().unwrap_or(DEFAULT_ITEM),
            self.date_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.level,
            self.row,
            self.col
        );
        f.write_str(&sanitize(&raw))
    }
}

/// Replace path and time separators so the key is safe in file names and logs.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '.' => '-',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use map_common::BoundingBox;

    fn tile(row: u32, col: u32) -> Tile {
        Tile::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), row, col)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_display_is_sanitized() {
        let key = TileCacheKey::new("C:\\data/gfs.nc", Some("TMP.2m"), at(6), 2, &tile(1, 3));
        let s = key.to_string();

        assert_eq!(s, "C--data-gfs-nc_TMP-2m_2024-03-01T06-30-00Z_2_1_3");
        assert!(!s.contains([':', '/', '\\', '.']));
    }

    #[test]
    fn test_missing_item_uses_default() {
        let key = TileCacheKey::new("src", None, at(0), 0, &tile(0, 0));
        assert!(key.to_string().starts_with("src_default_"));
    }

    #[test]
    fn test_belongs_to_compares_raw_source_id() {
        let key = TileCacheKey::new("a.b", None, at(0), 0, &tile(0, 0));
        assert!(key.belongs_to("a.b"));
        // Same display form, different source
        assert!(!key.belongs_to("a-b"));
        assert!(key.to_string().starts_with("a-b_"));
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = TileCacheKey::new("src", Some("x"), at(1), 3, &tile(2, 5));
        let b = TileCacheKey::new("src", Some("x"), at(1), 3, &tile(2, 5));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_every_component_changes_key() {
        let base = TileCacheKey::new("src", Some("x"), at(1), 3, &tile(2, 5));
        let variants = [
            TileCacheKey::new("other", Some("x"), at(1), 3, &tile(2, 5)),
            TileCacheKey::new("src", Some("y"), at(1), 3, &tile(2, 5)),
            TileCacheKey::new("src", None, at(1), 3, &tile(2, 5)),
            TileCacheKey::new("src", Some("x"), at(2), 3, &tile(2, 5)),
            TileCacheKey::new("src", Some("x"), at(1), 4, &tile(2, 5)),
            TileCacheKey::new("src", Some("x"), at(1), 3, &tile(3, 5)),
            TileCacheKey::new("src", Some("x"), at(1), 3, &tile(2, 6)),
        ];

        for variant in &variants {
            assert_ne!(&base, variant);
            assert_ne!(base.to_string(), variant.to_string());
        }
    }

    #[test]
    fn test_separator_lookalike_sources_stay_distinct() {
        let dotted = TileCacheKey::new("a.b", None, at(0), 0, &tile(0, 0));
        let dashed = TileCacheKey::new("a-b", None, at(0), 0, &tile(0, 0));

        // Same log string, different cache identity
        assert_eq!(dotted.to_string(), dashed.to_string());
        assert_ne!(dotted, dashed);
        assert!(dotted.belongs_to("a.b"));
        assert!(!dotted.belongs_to("a-b"));
    }
}

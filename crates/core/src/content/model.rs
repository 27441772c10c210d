use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Loose field bag used for create bodies and update patches.
pub type Fields = serde_json::Map<String, Value>;

/// Keys a caller may never overwrite through a patch.
const RESERVED_KEYS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Visibility of a record on the public pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }
}

/// One blog post, event or sermon.
///
/// The common columns are typed; everything type-specific (`summary`,
/// `location`, `speaker`, media urls, ...) lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Fields,
}

impl ContentRecord {
    /// Build a record from a create body, stamping `id` and both timestamps.
    /// Any `id`/timestamp keys in `fields` are ignored.
    pub fn from_fields(
        id: impl Into<String>,
        mut fields: Fields,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        for key in RESERVED_KEYS {
            fields.remove(key);
        }
        fields.insert("id".into(), Value::String(id.into()));
        fields.insert("createdAt".into(), serde_json::to_value(now)?);
        fields.insert("updatedAt".into(), serde_json::to_value(now)?);
        serde_json::from_value(Value::Object(fields))
    }

    /// Merge `patch` over this record and refresh `updatedAt`.
    /// `id` and `createdAt` survive any patch. A `null` value removes a
    /// type-specific field.
    pub fn apply_patch(&mut self, patch: &Fields, now: DateTime<Utc>) -> Result<(), serde_json::Error> {
        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        for (key, value) in patch {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() && key != "title" && key != "status" {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.insert("updatedAt".into(), serde_json::to_value(now)?);
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }

    pub fn is_published(&self) -> bool {
        self.status == ContentStatus::Published
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match field {
            "id" => Some(&self.id),
            "title" => Some(&self.title),
            _ => self.fields.get(field).and_then(Value::as_str),
        }
    }

    /// Last time either sink touched this record.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }

    /// The date a visitor sees: the `date` field for events and sermons,
    /// the creation time otherwise.
    pub fn display_date(&self) -> DateTime<Utc> {
        self.text("date").and_then(parse_date).unwrap_or(self.created_at)
    }
}

/// Parse the date formats the admin forms produce: RFC 3339, a bare
/// `YYYY-MM-DD`, or a `datetime-local` value without seconds.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn from_fields_ignores_reserved_keys() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let record = ContentRecord::from_fields(
            "abc",
            fields(json!({"id": "spoofed", "title": "Hello", "createdAt": "1999-01-01T00:00:00Z", "author": "Ruth"})),
            now,
        )
        .unwrap();

        assert_eq!(record.id, "abc");
        assert_eq!(record.title, "Hello");
        assert_eq!(record.status, ContentStatus::Draft);
        assert_eq!(record.created_at, now);
        assert_eq!(record.text("author"), Some("Ruth"));
        assert!(!record.fields.contains_key("id"));
    }

    #[test]
    fn serialized_record_is_flat_camel_case() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let record =
            ContentRecord::from_fields("1", fields(json!({"title": "T", "status": "published", "imageUrl": "/a.png"})), now)
                .unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "published");
        assert_eq!(value["imageUrl"], "/a.png");
        assert_eq!(value["createdAt"], "2024-03-01T09:00:00Z");
    }

    #[test]
    fn patch_keeps_identity_and_refreshes_updated_at() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let mut record =
            ContentRecord::from_fields("1", fields(json!({"title": "Hello", "summary": "old"})), created).unwrap();

        record
            .apply_patch(&fields(json!({"id": "2", "status": "published", "summary": null})), later)
            .unwrap();

        assert_eq!(record.id, "1");
        assert_eq!(record.title, "Hello");
        assert!(record.is_published());
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, later);
        assert!(record.text("summary").is_none());
    }

    #[test]
    fn patch_rejects_unknown_status() {
        let now = Utc::now();
        let mut record = ContentRecord::from_fields("1", fields(json!({"title": "Hello"})), now).unwrap();
        assert!(record.apply_patch(&fields(json!({"status": "archived"})), now).is_err());
    }

    #[test]
    fn parse_date_formats() {
        assert!(parse_date("2024-12-24T18:00:00Z").is_some());
        assert!(parse_date("2024-12-24T18:00").is_some());
        assert_eq!(
            parse_date("2024-12-24"),
            Some(Utc.with_ymd_and_hms(2024, 12, 24, 0, 0, 0).unwrap())
        );
        assert!(parse_date("Christmas Eve").is_none());
    }
}

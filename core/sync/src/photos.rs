//! Importing photo lists embedded in report documents.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use reportsync_common::Result;
use reportsync_local::{LocalStore, Photo};
use reportsync_remote::Document;

/// Fields that may hold the photo list, checked in order.
pub const PHOTO_FIELDS: [&str; 6] = [
    "photos",
    "photoUrls",
    "photoUrl",
    "imageUrls",
    "imageUrl",
    "images",
];

/// Keys that may hold the URL inside a photo object, checked in order.
pub const URL_KEYS: [&str; 7] = ["url", "photoUrl", "photoURL", "imageUrl", "imageURL", "src", "uri"];

/// Key of the caption inside a photo object.
pub const CAPTION_KEY: &str = "description";

/// A photo found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoEntry {
    pub url: String,
    pub caption: Option<String>,
}

/// First non-null photo field of the document, with its name.
pub fn photo_field(doc: &Document) -> Option<(&'static str, &Value)> {
    PHOTO_FIELDS
        .iter()
        .find_map(|name| doc.field(name).map(|value| (*name, value)))
}

/// Normalize a photo field value into entries.
///
/// Accepts a single URL string, a single object, or a list of either.
/// Entries without a usable URL are dropped.
pub fn entries_from_value(value: &Value) -> Vec<PhotoEntry> {
    match value {
        Value::Array(items) => items.iter().filter_map(entry_from_item).collect(),
        other => entry_from_item(other).into_iter().collect(),
    }
}

fn entry_from_item(item: &Value) -> Option<PhotoEntry> {
    let entry = match item {
        Value::String(url) => non_empty(url).map(|url| PhotoEntry { url, caption: None }),
        Value::Object(map) => entry_from_object(map),
        other => {
            debug!("Unrecognized photo entry: {}", other);
            None
        }
    };
    if entry.is_none() {
        debug!("Photo entry without URL ignored");
    }
    entry
}

fn entry_from_object(map: &Map<String, Value>) -> Option<PhotoEntry> {
    let url = URL_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty));

    if url.is_none() {
        debug!(
            "Photo object keys: {:?}",
            map.keys().map(String::as_str).collect::<Vec<_>>()
        );
    }

    url.map(|url| PhotoEntry {
        url,
        caption: map
            .get(CAPTION_KEY)
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// URLs are kept byte for byte; only the empty string is rejected.
fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

/// Photos carried by a report document.
pub fn extract_photos(doc: &Document) -> Vec<PhotoEntry> {
    match photo_field(doc) {
        Some((name, value)) => {
            debug!("Photo field {} found on {}", name, doc.id);
            entries_from_value(value)
        }
        None => {
            debug!("No photo field on {}; fields: {:?}", doc.id, doc.field_names());
            Vec::new()
        }
    }
}

/// Attach the document's photos to a report row.
///
/// URLs already present anywhere in the photo table are skipped. A failing
/// entry is logged and never stops the others.
///
/// # Returns
/// Number of photo rows created.
pub fn reconcile_photos(local: &dyn LocalStore, report_id: i64, doc: &Document) -> usize {
    let entries = extract_photos(doc);
    if entries.is_empty() {
        return 0;
    }

    let total = entries.len();
    let mut added = 0;
    for entry in entries {
        match attach(local, report_id, &entry) {
            Ok(true) => added += 1,
            Ok(false) => debug!("Photo already present: {}", entry.url),
            Err(e) => warn!("Failed to save photo {}: {}", entry.url, e),
        }
    }

    info!("Report {}: {}/{} photos imported", report_id, added, total);
    added
}

fn attach(local: &dyn LocalStore, report_id: i64, entry: &PhotoEntry) -> Result<bool> {
    if local.photo_by_url(&entry.url)?.is_some() {
        return Ok(false);
    }
    local.save_photo(&Photo::new(report_id, entry.url.as_str(), entry.caption.clone()))?;
    Ok(true)
}

/// Photo list in the shape written to report documents.
pub fn photos_payload(photos: &[Photo]) -> Value {
    Value::Array(
        photos
            .iter()
            .map(|photo| {
                let mut map = Map::new();
                map.insert("url".to_string(), Value::String(photo.url.clone()));
                map.insert(
                    CAPTION_KEY.to_string(),
                    photo.caption.clone().map_or(Value::Null, Value::String),
                );
                Value::Object(map)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reportsync_local::{PhotoRepository, Report, ReportRepository, SqliteStore, User, UserRepository};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(fields) => Document::new("r1", fields),
            _ => unreachable!(),
        }
    }

    fn store_with_report() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store.save_user(&User::new("a@x.com")).unwrap();
        let report = store
            .save_report(&Report::new(user.id.unwrap(), 1.0, 2.0))
            .unwrap();
        (store, report.id.unwrap())
    }

    #[test]
    fn test_single_string_field() {
        let entries = extract_photos(&doc(json!({"photos": "http://x/a.jpg"})));
        assert_eq!(
            entries,
            vec![PhotoEntry {
                url: "http://x/a.jpg".to_string(),
                caption: None
            }]
        );
    }

    #[test]
    fn test_field_priority_skips_null() {
        let entries = extract_photos(&doc(json!({
            "photos": null,
            "images": ["http://x/late.jpg"],
            "photoUrl": "http://x/early.jpg",
        })));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "http://x/early.jpg");
    }

    #[test]
    fn test_object_url_key_priority_and_caption() {
        let entries = extract_photos(&doc(json!({"photos": [
            {"src": "http://x/src.jpg", "imageURL": "http://x/img.jpg", "description": "front"},
            {"uri": ""},
            {"description": "no url"},
            42,
            "http://x/plain.jpg",
        ]})));

        assert_eq!(
            entries,
            vec![
                PhotoEntry {
                    url: "http://x/img.jpg".to_string(),
                    caption: Some("front".to_string())
                },
                PhotoEntry {
                    url: "http://x/plain.jpg".to_string(),
                    caption: None
                },
            ]
        );
    }

    #[test]
    fn test_single_object_field() {
        let entries = extract_photos(&doc(json!({"imageUrl": {"url": "http://x/o.jpg"}})));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_empty_string_is_no_photo() {
        assert!(extract_photos(&doc(json!({"photos": ""}))).is_empty());
    }

    #[test]
    fn test_reconcile_skips_known_urls() {
        let (store, report_id) = store_with_report();
        let document = doc(json!({"photos": ["http://x/1.jpg", "http://x/2.jpg", "http://x/1.jpg"]}));

        assert_eq!(reconcile_photos(&store, report_id, &document), 2);
        assert_eq!(reconcile_photos(&store, report_id, &document), 0);
        assert_eq!(store.photos_for_report(report_id).unwrap().len(), 2);
    }

    #[test]
    fn test_url_is_stored_verbatim() {
        let (store, report_id) = store_with_report();
        let document = doc(json!({"photos": [" http://x/1.jpg", "http://x/1.jpg"]}));

        assert_eq!(reconcile_photos(&store, report_id, &document), 2);
        assert!(store.photo_by_url(" http://x/1.jpg").unwrap().is_some());
        assert!(store.photo_by_url("http://x/1.jpg").unwrap().is_some());
    }

    #[test]
    fn test_payload_shape() {
        let photo = Photo::new(1, "http://x/1.jpg", Some("front".to_string()));
        assert_eq!(
            photos_payload(&[photo]),
            json!([{"url": "http://x/1.jpg", "description": "front"}])
        );
    }

    proptest! {
        #[test]
        fn prop_list_of_urls_keeps_non_empty(urls in proptest::collection::vec("[a-z ]{0,8}", 0..8)) {
            let value = Value::Array(urls.iter().cloned().map(Value::String).collect());
            let expected: Vec<&String> = urls.iter().filter(|u| !u.is_empty()).collect();
            let entries = entries_from_value(&value);
            prop_assert_eq!(entries.len(), expected.len());
            for (entry, url) in entries.iter().zip(expected) {
                prop_assert_eq!(&entry.url, url);
            }
        }
    }
}

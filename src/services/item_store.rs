use std::sync::Arc;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{Database, ItemKind, ItemRecord, NewItem};
use crate::error::{AppError, AppResult};
use crate::services::collection_store::CollectionStore;
use crate::utils::identifier::sanitize;

const FALLBACK_IMAGE_MIME: &str = "image/png";

/// Accepts payloads with or without trailing `=` padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: Option<String>,
    pub content: String,
    pub created_at: String,
}

/// Caller-supplied fields for a new item.
///
/// `image_data` is plain base64 without a data-URL prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveItem<'a> {
    pub kind: Option<ItemKind>,
    pub content: Option<&'a str>,
    pub title: Option<&'a str>,
    pub image_data: Option<&'a str>,
}

pub struct ItemStore {
    db: Arc<Database>,
    collections: Arc<CollectionStore>,
}

impl ItemStore {
    pub fn new(db: Arc<Database>, collections: Arc<CollectionStore>) -> Self {
        Self { db, collections }
    }

    pub fn save_item(&self, collection_name: &str, request: SaveItem<'_>) -> AppResult<Item> {
        let content = request.content.filter(|value| !value.trim().is_empty());
        let kind = match request.kind {
            Some(kind) => kind,
            None => classify_content(content.unwrap_or_default()),
        };
        let title = normalize_title(request.title);

        let image_bytes = match kind {
            ItemKind::Image => Some(decode_image(request.image_data, content)?),
            ItemKind::Text | ItemKind::Link => {
                if content.is_none() {
                    return Err(AppError::Validation(format!(
                        "{} item requires content",
                        kind.as_str()
                    )));
                }
                None
            }
        };

        let collection = self.collections.register(collection_name)?;
        let record = self.db.insert_item(
            collection.id,
            NewItem {
                kind,
                title,
                content: if image_bytes.is_some() { None } else { content },
                image_data: image_bytes.as_deref(),
            },
        )?;
        debug!(
            "saved {} item {} in collection {collection_name:?}",
            kind.as_str(),
            record.id
        );

        let mut item = item_from_record(record);
        if kind == ItemKind::Image {
            if let Some(content) = content {
                item.content = content.to_string();
            }
        }
        Ok(item)
    }

    /// Items of one collection, newest first. Unknown collections are empty.
    pub fn list_items(&self, collection_name: &str) -> AppResult<Vec<Item>> {
        let records = self.db.list_items(&sanitize(Some(collection_name)))?;
        Ok(records.into_iter().map(item_from_record).collect())
    }

    pub fn delete_item(&self, collection_name: &str, id: i64) -> AppResult<()> {
        if self.db.delete_item(&sanitize(Some(collection_name)), id)? {
            debug!("deleted item {id} from collection {collection_name:?}");
        }
        Ok(())
    }

    /// Overwrites the title; a blank title clears it.
    pub fn update_title(
        &self,
        collection_name: &str,
        id: i64,
        title: Option<&str>,
    ) -> AppResult<()> {
        let title = normalize_title(title);
        if self
            .db
            .update_title(&sanitize(Some(collection_name)), id, title)?
        {
            debug!("updated title of item {id} in collection {collection_name:?}");
        }
        Ok(())
    }
}

pub fn classify_content(content: &str) -> ItemKind {
    let lower = content.trim().to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return ItemKind::Link;
    }
    ItemKind::Text
}

/// Renders stored image bytes as a `data:` URL, sniffing the mime type.
pub fn image_data_url(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_IMAGE_MIME);
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn item_from_record(record: ItemRecord) -> Item {
    let content = match (record.kind, record.image_data) {
        (ItemKind::Image, Some(bytes)) => image_data_url(&bytes),
        _ => record.content.unwrap_or_default(),
    };
    Item {
        id: record.id,
        kind: record.kind,
        title: record.title,
        content,
        created_at: record.created_at,
    }
}

fn normalize_title(title: Option<&str>) -> Option<&str> {
    title.map(str::trim).filter(|value| !value.is_empty())
}

fn decode_image(image_data: Option<&str>, content: Option<&str>) -> AppResult<Vec<u8>> {
    let encoded = image_data
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| content.and_then(data_url_payload))
        .ok_or_else(|| AppError::Validation("image item requires image data".to_string()))?;

    let compact: String = encoded
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = LENIENT_BASE64
        .decode(compact)
        .map_err(|err| AppError::Validation(format!("image data is not valid base64: {err}")))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("image data is empty".to_string()));
    }
    Ok(bytes)
}

fn data_url_payload(content: &str) -> Option<&str> {
    let rest = content.trim().strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    meta.ends_with(";base64").then_some(payload)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;

    fn stores() -> (Arc<CollectionStore>, ItemStore) {
        let db = Arc::new(Database::new_in_memory().expect("db init"));
        let collections = Arc::new(CollectionStore::new(db.clone(), "default"));
        let items = ItemStore::new(db, collections.clone());
        (collections, items)
    }

    fn encoded_image(format: ImageFormat) -> Vec<u8> {
        let rgb = RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 0, 255]).expect("image");
        let mut output = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut output, format)
            .expect("encode");
        output.into_inner()
    }

    fn text(content: &str) -> SaveItem<'_> {
        SaveItem {
            kind: Some(ItemKind::Text),
            content: Some(content),
            ..SaveItem::default()
        }
    }

    #[test]
    fn text_round_trip_with_increasing_ids() {
        let (_, items) = stores();
        let first = items.save_item("work", text("earlier")).expect("first");
        let saved = items.save_item("work", text("hello")).expect("save");
        assert!(saved.id > first.id);

        let listed = items.list_items("work").expect("list");
        assert_eq!(listed[0], saved);
        assert_eq!(listed[0].content, "hello");
        assert_eq!(listed[0].kind, ItemKind::Text);
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn ids_keep_increasing_after_deletes() {
        let (_, items) = stores();
        let first = items.save_item("work", text("one")).expect("one");
        items.delete_item("work", first.id).expect("delete");
        let second = items.save_item("work", text("two")).expect("two");
        assert!(second.id > first.id);
    }

    #[test]
    fn image_round_trip_rebuilds_data_url() {
        let (_, items) = stores();
        let png = encoded_image(ImageFormat::Png);
        let encoded = STANDARD.encode(&png);
        let caller_content = format!("data:image/png;base64,{encoded}");

        let saved = items
            .save_item(
                "shots",
                SaveItem {
                    kind: Some(ItemKind::Image),
                    content: Some(&caller_content),
                    title: Some("  red and blue  "),
                    image_data: Some(&encoded),
                },
            )
            .expect("save image");
        assert_eq!(saved.content, caller_content);
        assert_eq!(saved.title.as_deref(), Some("red and blue"));

        let listed = items.list_items("shots").expect("list");
        let payload = listed[0]
            .content
            .strip_prefix("data:image/png;base64,")
            .expect("png data url");
        assert_eq!(STANDARD.decode(payload).expect("decode"), png);
    }

    #[test]
    fn image_mime_is_sniffed_from_bytes() {
        let jpeg = encoded_image(ImageFormat::Jpeg);
        assert!(image_data_url(&jpeg).starts_with("data:image/jpeg;base64,"));
        assert!(image_data_url(b"not an image").starts_with("data:image/png;base64,"));
    }

    #[test]
    fn image_bytes_fall_back_to_data_url_content() {
        let (_, items) = stores();
        let png = encoded_image(ImageFormat::Png);
        let content = format!("data:image/png;base64,{}", STANDARD.encode(&png));

        items
            .save_item(
                "shots",
                SaveItem {
                    kind: Some(ItemKind::Image),
                    content: Some(&content),
                    ..SaveItem::default()
                },
            )
            .expect("save from data url");
        assert_eq!(items.list_items("shots").expect("list")[0].content, content);
    }

    #[test]
    fn saved_image_without_content_reports_data_url() {
        let (_, items) = stores();
        let png = encoded_image(ImageFormat::Png);
        let encoded = STANDARD.encode(&png);
        let saved = items
            .save_item(
                "shots",
                SaveItem {
                    kind: Some(ItemKind::Image),
                    image_data: Some(&encoded),
                    ..SaveItem::default()
                },
            )
            .expect("save");
        assert_eq!(saved.content, format!("data:image/png;base64,{encoded}"));
    }

    #[test]
    fn rejects_invalid_saves_without_registering_collection() {
        let (collections, items) = stores();
        let blank = items.save_item("work", text("   ")).expect_err("blank text");
        assert!(matches!(blank, AppError::Validation(_)));

        let missing = items
            .save_item(
                "work",
                SaveItem {
                    kind: Some(ItemKind::Image),
                    ..SaveItem::default()
                },
            )
            .expect_err("image without data");
        assert!(matches!(missing, AppError::Validation(_)));

        let garbage = items
            .save_item(
                "work",
                SaveItem {
                    kind: Some(ItemKind::Image),
                    image_data: Some("@@not base64@@"),
                    ..SaveItem::default()
                },
            )
            .expect_err("bad base64");
        assert!(matches!(garbage, AppError::Validation(_)));

        assert!(collections.list_collections().expect("list").is_empty());
    }

    #[test]
    fn infers_link_when_type_is_missing() {
        let (_, items) = stores();
        let link = items
            .save_item(
                "work",
                SaveItem {
                    content: Some("  HTTPS://example.com/page "),
                    ..SaveItem::default()
                },
            )
            .expect("link");
        assert_eq!(link.kind, ItemKind::Link);

        let note = items
            .save_item(
                "work",
                SaveItem {
                    content: Some("see example.com"),
                    ..SaveItem::default()
                },
            )
            .expect("text");
        assert_eq!(note.kind, ItemKind::Text);
    }

    #[test]
    fn saving_registers_unknown_collection() {
        let (collections, items) = stores();
        items.save_item("Fresh", text("hi")).expect("save");
        let names: Vec<_> = collections
            .list_collections()
            .expect("list")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Fresh"]);
    }

    #[test]
    fn item_operations_resolve_collection_through_identifier() {
        let (collections, items) = stores();
        collections.create_collection("Work").expect("create");

        let saved = items.save_item("WORK", text("shouted")).expect("save");
        let listed = items.list_items("Work").expect("list");
        assert_eq!(listed, vec![saved.clone()]);
        assert_eq!(items.list_items("WORK").expect("list upper"), listed);

        items
            .update_title("work", saved.id, Some("quiet"))
            .expect("update");
        assert_eq!(
            items.list_items("Work").expect("list")[0].title.as_deref(),
            Some("quiet")
        );

        items.delete_item("WORK", saved.id).expect("delete");
        assert!(items.list_items("Work").expect("list").is_empty());

        let names: Vec<_> = collections
            .list_collections()
            .expect("collections")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Work"]);
    }

    #[test]
    fn decodes_unpadded_and_wrapped_base64() {
        let (_, items) = stores();
        let png = encoded_image(ImageFormat::Png);
        let encoded = STANDARD.encode(&png);
        let unpadded = encoded.trim_end_matches('=').to_string();
        let (head, tail) = encoded.split_at(encoded.len() / 2);
        let wrapped = format!("{head}\r\n{tail}\n");

        for payload in [unpadded, wrapped] {
            items
                .save_item(
                    "shots",
                    SaveItem {
                        kind: Some(ItemKind::Image),
                        image_data: Some(&payload),
                        ..SaveItem::default()
                    },
                )
                .expect("lenient decode");
        }

        for item in items.list_items("shots").expect("list") {
            let payload = item
                .content
                .strip_prefix("data:image/png;base64,")
                .expect("png data url");
            assert_eq!(STANDARD.decode(payload).expect("decode"), png);
        }
    }

    #[test]
    fn update_title_overwrites_and_clears() {
        let (_, items) = stores();
        let saved = items.save_item("work", text("body")).expect("save");

        items
            .update_title("work", saved.id, Some("Groceries"))
            .expect("set");
        assert_eq!(
            items.list_items("work").expect("list")[0].title.as_deref(),
            Some("Groceries")
        );

        items.update_title("work", saved.id, Some("  ")).expect("clear");
        assert_eq!(items.list_items("work").expect("list")[0].title, None);
    }

    #[test]
    fn missing_ids_are_noops() {
        let (_, items) = stores();
        items.delete_item("work", 404).expect("delete missing");
        items
            .update_title("work", 404, Some("nothing"))
            .expect("update missing");
    }

    #[test]
    fn new_and_unknown_collections_list_empty() {
        let (collections, items) = stores();
        collections.create_collection("Empty").expect("create");
        assert!(items.list_items("Empty").expect("list").is_empty());
        assert!(items.list_items("Nowhere").expect("list").is_empty());
    }

    #[test]
    fn deleting_collection_drops_its_items() {
        let (collections, items) = stores();
        items.save_item("Temp", text("soon gone")).expect("save");
        collections.delete_collection("Temp").expect("delete");

        assert!(collections.list_collections().expect("list").is_empty());
        assert!(items.list_items("Temp").expect("list").is_empty());

        collections.create_collection("Temp").expect("recreate");
        assert!(items.list_items("Temp").expect("list").is_empty());
    }

    #[test]
    fn data_url_payload_requires_base64_marker() {
        assert_eq!(data_url_payload("data:image/png;base64,AAAA"), Some("AAAA"));
        assert_eq!(data_url_payload("data:text/plain,hello"), None);
        assert_eq!(data_url_payload("AAAA"), None);
    }
}

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::db::{Collection, ItemKind};
use crate::error::{AppError, AppResult};
use crate::services::collection_store::CollectionStore;
use crate::services::item_store::{Item, ItemStore, SaveItem};

pub struct AppState {
    pub collections: Arc<CollectionStore>,
    pub items: Arc<ItemStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SaveItem,
    ListItems,
    DeleteItem,
    UpdateTitle,
    ListCollections,
    CreateCollection,
    DeleteCollection,
}

impl Operation {
    /// Accepts the canonical names plus the names older hosts still send.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "save-item" | "save-clipboard-item" => Some(Self::SaveItem),
            "list-items" | "get-clipboard-items" => Some(Self::ListItems),
            "delete-item" | "delete-clipboard-item" => Some(Self::DeleteItem),
            "update-title" | "update-clipboard-item-title" => Some(Self::UpdateTitle),
            "list-collections" | "get-collections" => Some(Self::ListCollections),
            "create-collection" => Some(Self::CreateCollection),
            "delete-collection" => Some(Self::DeleteCollection),
            _ => None,
        }
    }
}

/// One request line as sent by the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub request_id: Value,
    pub op: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveItemArgs {
    #[serde(rename = "type")]
    pub kind: Option<ItemKind>,
    pub content: Option<String>,
    pub image_data: Option<String>,
    pub title: Option<String>,
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionArgs {
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemArgs {
    pub id: ItemId,
    pub collection_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitleArgs {
    pub id: ItemId,
    pub collection_name: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameArgs {
    #[serde(default)]
    pub name: String,
}

/// Item ids arrive as numbers, or as strings when read back from DOM attributes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl ItemId {
    fn resolve(&self) -> AppResult<i64> {
        match self {
            ItemId::Number(id) => Ok(*id),
            ItemId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| AppError::Validation(format!("invalid item id '{text}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Item(Item),
    Items(Vec<Item>),
    Collections(Vec<Collection>),
    Done,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub request_id: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<Collection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(request_id: Value, payload: Payload) -> Self {
        let mut response = Self {
            request_id,
            success: true,
            item: None,
            items: None,
            collections: None,
            error: None,
        };
        match payload {
            Payload::Item(item) => response.item = Some(item),
            Payload::Items(items) => response.items = Some(items),
            Payload::Collections(collections) => response.collections = Some(collections),
            Payload::Done => {}
        }
        response
    }

    pub fn failed(request_id: Value, error: impl ToString) -> Self {
        Self {
            request_id,
            success: false,
            item: None,
            items: None,
            collections: None,
            error: Some(error.to_string()),
        }
    }
}

/// Parses one raw request line and runs it. Never fails: every problem becomes
/// a `success: false` response.
pub async fn dispatch_line(state: &Arc<AppState>, line: &str) -> Response {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(err) => return malformed(Value::Null, err),
    };
    let request_id = value.get("requestId").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => dispatch(state, envelope).await,
        Err(err) => malformed(request_id, err),
    }
}

fn malformed(request_id: Value, err: serde_json::Error) -> Response {
    warn!("rejected malformed request: {err}");
    Response::failed(
        request_id,
        AppError::Validation(format!("malformed request: {err}")),
    )
}

pub async fn dispatch(state: &Arc<AppState>, envelope: Envelope) -> Response {
    let Envelope {
        request_id,
        op,
        args,
    } = envelope;

    match run_operation(state, &op, args).await {
        Ok(payload) => Response::ok(request_id, payload),
        Err(err) => {
            warn!("{op} failed: {err}");
            Response::failed(request_id, err)
        }
    }
}

async fn run_operation(state: &Arc<AppState>, op: &str, args: Value) -> AppResult<Payload> {
    let operation = Operation::from_name(op)
        .ok_or_else(|| AppError::Validation(format!("unknown operation '{op}'")))?;

    match operation {
        Operation::SaveItem => save_item(state, parse_args(args)?)
            .await
            .map(Payload::Item),
        Operation::ListItems => {
            let args = named_string_arg(args, "collectionName");
            list_items(state, parse_args(args)?)
                .await
                .map(Payload::Items)
        }
        Operation::DeleteItem => delete_item(state, parse_args(args)?)
            .await
            .map(|_| Payload::Done),
        Operation::UpdateTitle => update_title(state, parse_args(args)?)
            .await
            .map(|_| Payload::Done),
        Operation::ListCollections => list_collections(state).await.map(Payload::Collections),
        Operation::CreateCollection => {
            create_collection(state, parse_args(named_string_arg(args, "name"))?)
                .await
                .map(|_| Payload::Done)
        }
        Operation::DeleteCollection => {
            delete_collection(state, parse_args(named_string_arg(args, "name"))?)
                .await
                .map(|_| Payload::Done)
        }
    }
}

pub async fn save_item(state: &Arc<AppState>, args: SaveItemArgs) -> AppResult<Item> {
    run_blocking(state, move |state| {
        let collection = effective_collection(state, args.collection_name.as_deref());
        state.items.save_item(
            &collection,
            SaveItem {
                kind: args.kind,
                content: args.content.as_deref(),
                title: args.title.as_deref(),
                image_data: args.image_data.as_deref(),
            },
        )
    })
    .await
}

pub async fn list_items(state: &Arc<AppState>, args: CollectionArgs) -> AppResult<Vec<Item>> {
    run_blocking(state, move |state| {
        let collection = effective_collection(state, args.collection_name.as_deref());
        state.items.list_items(&collection)
    })
    .await
}

pub async fn delete_item(state: &Arc<AppState>, args: DeleteItemArgs) -> AppResult<()> {
    let id = args.id.resolve()?;
    run_blocking(state, move |state| {
        let collection = effective_collection(state, args.collection_name.as_deref());
        state.items.delete_item(&collection, id)
    })
    .await
}

pub async fn update_title(state: &Arc<AppState>, args: UpdateTitleArgs) -> AppResult<()> {
    let id = args.id.resolve()?;
    run_blocking(state, move |state| {
        let collection = effective_collection(state, args.collection_name.as_deref());
        state
            .items
            .update_title(&collection, id, args.title.as_deref())
    })
    .await
}

pub async fn list_collections(state: &Arc<AppState>) -> AppResult<Vec<Collection>> {
    run_blocking(state, |state| state.collections.list_collections()).await
}

pub async fn create_collection(state: &Arc<AppState>, args: NameArgs) -> AppResult<()> {
    run_blocking(state, move |state| state.collections.create_collection(&args.name)).await
}

pub async fn delete_collection(state: &Arc<AppState>, args: NameArgs) -> AppResult<()> {
    run_blocking(state, move |state| state.collections.delete_collection(&args.name)).await
}

/// Older hosts pass the single argument of some operations as a bare string.
fn named_string_arg(args: Value, key: &str) -> Value {
    match args {
        Value::String(value) => {
            let mut object = Map::new();
            object.insert(key.to_string(), Value::String(value));
            Value::Object(object)
        }
        other => other,
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> AppResult<T> {
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|err| AppError::Validation(format!("invalid arguments: {err}")))
}

fn effective_collection(state: &AppState, requested: Option<&str>) -> String {
    requested
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| state.collections.default_collection())
        .to_string()
}

async fn run_blocking<T, F>(state: &Arc<AppState>, task: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> AppResult<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || task(&state))
        .await
        .map_err(|err| AppError::Internal(format!("storage task failed: {err}")))?
}

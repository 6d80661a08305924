pub mod collection_store;
pub mod item_store;

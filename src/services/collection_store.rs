use std::sync::Arc;

use tracing::debug;

use crate::db::{Collection, Database};
use crate::error::{AppError, AppResult};
use crate::utils::identifier::sanitize;

pub struct CollectionStore {
    db: Arc<Database>,
    default_collection: String,
}

impl CollectionStore {
    pub fn new(db: Arc<Database>, default_collection: impl Into<String>) -> Self {
        Self {
            db,
            default_collection: default_collection.into(),
        }
    }

    pub fn default_collection(&self) -> &str {
        &self.default_collection
    }

    /// Registered collections in creation order, without the default collection.
    pub fn list_collections(&self) -> AppResult<Vec<Collection>> {
        let hidden = sanitize(Some(&self.default_collection));
        let collections = self.db.list_collections()?;
        Ok(collections
            .into_iter()
            .filter(|collection| collection.identifier != hidden)
            .collect())
    }

    /// Registers `name`. Repeating a registered name is a no-op; a name whose
    /// identifier already belongs to another collection is rejected.
    pub fn create_collection(&self, name: &str) -> AppResult<()> {
        validate_name(name)?;
        let identifier = sanitize(Some(name));
        let (collection, created) = self.db.ensure_collection(name, &identifier)?;
        if created {
            debug!(
                "created collection {name:?} (identifier {})",
                collection.identifier
            );
        }
        Ok(())
    }

    /// Deletes the collection holding `name`'s identifier, items included.
    pub fn delete_collection(&self, name: &str) -> AppResult<()> {
        if self.db.delete_collection(&sanitize(Some(name)))? {
            debug!("deleted collection {name:?} and its items");
        }
        Ok(())
    }

    /// Returns the collection that owns `name`'s identifier, registering `name`
    /// when no collection does yet.
    pub(crate) fn register(&self, name: &str) -> AppResult<Collection> {
        let identifier = sanitize(Some(name));
        let (collection, created) = self.db.resolve_collection(name, &identifier)?;
        if created {
            debug!(
                "registered collection {name:?} (identifier {})",
                collection.identifier
            );
        }
        Ok(collection)
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "collection name must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub const CREATE_COLLECTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE CHECK (length(name) > 0),
  identifier TEXT NOT NULL UNIQUE,
  created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
  type TEXT NOT NULL CHECK (type IN ('text', 'link', 'image')),
  title TEXT,
  content TEXT,
  image_data BLOB,
  created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const CREATE_INDEX_COLLECTION_ITEMS: &str =
    "CREATE INDEX IF NOT EXISTS idx_items_collection ON items(collection_id, id DESC);";

pub const ADD_ITEMS_TITLE_COLUMN: &str = "ALTER TABLE items ADD COLUMN title TEXT;";

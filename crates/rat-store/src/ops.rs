//! Text read / versioned read / list / move helpers used by pipeline
//! execution to pull source files, landing-zone data, and table metadata
//! pointers out of object storage.

use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{Error as ObjectStoreError, GetOptions, ObjectStore};

use crate::error::StoreError;

/// Read a text object. Returns `Ok(None)` if the key doesn't exist.
pub async fn read_text(store: &dyn ObjectStore, key: &str) -> Result<Option<String>, StoreError> {
    let path = ObjectPath::from(key);
    match store.get(&path).await {
        Ok(result) => {
            let bytes = result.bytes().await?;
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::NotUtf8(key.to_string()))
        }
        Err(ObjectStoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read a specific version of a text object. Returns `Ok(None)` if the
/// key or version doesn't exist.
pub async fn read_text_version(
    store: &dyn ObjectStore,
    key: &str,
    version_id: &str,
) -> Result<Option<String>, StoreError> {
    let path = ObjectPath::from(key);
    let options = GetOptions {
        version: Some(version_id.to_string()),
        ..Default::default()
    };
    match store.get_opts(&path, options).await {
        Ok(result) => {
            let bytes = result.bytes().await?;
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::NotUtf8(key.to_string()))
        }
        Err(ObjectStoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List keys under `prefix`, optionally filtered to those ending in `suffix`.
pub async fn list_keys(
    store: &dyn ObjectStore,
    prefix: &str,
    suffix: Option<&str>,
) -> Result<Vec<String>, StoreError> {
    let prefix_path = ObjectPath::from(prefix);
    let mut stream = store.list(Some(&prefix_path));
    let mut keys = Vec::new();
    while let Some(meta) = stream.next().await {
        let meta = meta?;
        let key = meta.location.to_string();
        if suffix.map(|s| key.ends_with(s)).unwrap_or(true) {
            keys.push(key);
        }
    }
    Ok(keys)
}

/// Move a set of keys from `src_prefix` to `dest_prefix` by copy-then-delete.
/// Best-effort: a failure partway through leaves some keys already copied.
pub async fn move_keys(
    store: &dyn ObjectStore,
    src_keys: &[String],
    src_prefix: &str,
    dest_prefix: &str,
) -> Result<(), StoreError> {
    if src_keys.is_empty() {
        return Ok(());
    }
    for key in src_keys {
        let dest_key = key.replacen(src_prefix, dest_prefix, 1);
        let from = ObjectPath::from(key.as_str());
        let to = ObjectPath::from(dest_key);
        store.copy(&from, &to).await?;
    }
    for key in src_keys {
        let path = ObjectPath::from(key.as_str());
        store.delete(&path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn read_text_returns_none_for_missing_key() {
        let store = InMemory::new();
        let result = read_text(&store, "does/not/exist.sql").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn read_text_round_trips_written_object() {
        let store = InMemory::new();
        let path = ObjectPath::from("bronze/orders/model.sql");
        store
            .put(&path, Bytes::from_static(b"select 1").into())
            .await
            .unwrap();
        let result = read_text(&store, "bronze/orders/model.sql").await.unwrap();
        assert_eq!(result, Some("select 1".to_string()));
    }

    #[tokio::test]
    async fn list_keys_filters_by_suffix() {
        let store = InMemory::new();
        store
            .put(&ObjectPath::from("landing/a.csv"), Bytes::from_static(b"x").into())
            .await
            .unwrap();
        store
            .put(&ObjectPath::from("landing/b.json"), Bytes::from_static(b"x").into())
            .await
            .unwrap();
        let keys = list_keys(&store, "landing/", Some(".csv")).await.unwrap();
        assert_eq!(keys, vec!["landing/a.csv".to_string()]);
    }

    #[tokio::test]
    async fn move_keys_copies_then_deletes_source() {
        let store = InMemory::new();
        store
            .put(&ObjectPath::from("landing/orders/a.csv"), Bytes::from_static(b"x").into())
            .await
            .unwrap();
        move_keys(
            &store,
            &["landing/orders/a.csv".to_string()],
            "landing/",
            "archive/",
        )
        .await
        .unwrap();
        assert!(read_text(&store, "landing/orders/a.csv").await.unwrap().is_none());
        assert_eq!(
            read_text(&store, "archive/orders/a.csv").await.unwrap(),
            Some("x".to_string())
        );
    }
}

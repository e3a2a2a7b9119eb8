//! Content fetching for a single directory.

use serde_json::Value;

use crate::error::SyncError;
use crate::models::{DirectoryPath, RemoteEntry};
use crate::remote::TreeClient;

/// Fetch the entries directly inside `path` (non-recursive).
///
/// A directory that no longer exists on the remote yields an empty list.
pub async fn fetch_entries(
    client: &dyn TreeClient,
    path: &DirectoryPath,
) -> Result<Vec<RemoteEntry>, SyncError> {
    let data = client
        .directory(path)
        .await
        .map_err(|e| SyncError::fetch(path, e))?;
    entries_from_response(path, &data)
}

/// Map a raw directory response to [`RemoteEntry`] values.
pub fn entries_from_response(
    path: &DirectoryPath,
    data: &Value,
) -> Result<Vec<RemoteEntry>, SyncError> {
    let object = data
        .get("repository")
        .filter(|r| r.is_object())
        .map(|r| r.get("object").unwrap_or(&Value::Null))
        .ok_or_else(|| SyncError::fetch(path, "response has no 'repository' object"))?;

    if object.is_null() {
        return Ok(Vec::new());
    }

    let entries = object
        .get("entries")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::fetch(path, "directory object is not a tree"))?;

    entries
        .iter()
        .map(|entry| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::fetch(path, "entry without a name"))?;
            let raw_text = entry
                .get("object")
                .and_then(|o| o.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(RemoteEntry {
                name: name.to_string(),
                raw_text,
            })
        })
        .collect()
}

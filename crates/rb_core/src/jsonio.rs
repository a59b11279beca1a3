use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;

/// Read and decode a JSON file. A missing file is `JSON_NOT_FOUND`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    if !path.exists() {
        return Err(AppError::new("JSON_NOT_FOUND", "JSON file not found")
            .with_details(format!("path={}", path.display())));
    }
    let bytes = fs::read(path)
        .map_err(|e| AppError::new("JSON_READ_FAILED", "Failed to read JSON file").with_path(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::new("JSON_DECODE_FAILED", "Failed to decode JSON file").with_path(path, e))
}

/// Like [`read_json`] but a missing file yields `T::default()`.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, AppError> {
    if !path.exists() {
        return Ok(T::default());
    }
    read_json(path)
}

/// Pretty-print `value` to `path`. Writes go to a `.tmp` sibling first and are
/// renamed into place so readers never observe a half-written file.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new("JSON_WRITE_FAILED", "Failed to create parent directory")
                    .with_path(parent, e)
            })?;
        }
    }
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("JSON_ENCODE_FAILED", "Failed to encode JSON").with_details(e.to_string())
    })?;
    fs::write(&tmp, json.as_bytes())
        .map_err(|e| AppError::new("JSON_WRITE_FAILED", "Failed to write JSON file").with_path(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("JSON_WRITE_FAILED", "Failed to finalize JSON write").with_details(format!(
            "tmp={}; dest={}; err={}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn write_creates_parent_dirs_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.json");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u32);
        write_json_pretty(&path, &map).expect("write");

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
        let back: BTreeMap<String, u32> = read_json(&path).expect("read");
        assert_eq!(back, map);
    }

    #[test]
    fn missing_file_has_distinct_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_json::<Vec<String>>(&dir.path().join("nope.json")).expect_err("missing");
        assert_eq!(err.code, "JSON_NOT_FOUND");

        let empty: Vec<String> = read_json_or_default(&dir.path().join("nope.json")).expect("default");
        assert!(empty.is_empty());
    }

    #[test]
    fn malformed_file_is_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").expect("write");
        let err = read_json::<serde_json::Value>(&path).expect_err("bad");
        assert_eq!(err.code, "JSON_DECODE_FAILED");
    }
}

//! Resolves a job's `data_url` to its ordered set of input splits,
//! expanding a directory URL to the set of regular files it contains,
//! ordered lexicographically.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Error, Result};

/// `file://`, `nfs://`, and bare-path forms are all resolved to a
/// local filesystem path. Unlike program URLs, a coordinator never
/// needs to fetch `data_url` remotely: it runs on the same
/// shared-storage mount the path already names, so `http(s)://` data
/// sources aren't recognized here.
fn local_path(data_url: &str) -> Result<PathBuf> {
    match Url::parse(data_url) {
        Ok(url) => match url.scheme() {
            "file" | "nfs" => Ok(PathBuf::from(url.path())),
            other => Err(Error::InvalidUrl(data_url.to_string(), format!("unsupported data_url scheme `{other}`"))),
        },
        Err(_) => Ok(PathBuf::from(data_url)),
    }
}

/// Returns the ordered, canonical-path list of regular files `data_url`
/// names. A directory expands to its regular-file entries sorted
/// lexicographically by name; a single file resolves to itself. An
/// empty or unreadable result is a validation error, so submission
/// fails with 4xx and no `job_id`.
pub fn resolve_input_files(data_url: &str) -> Result<Vec<String>> {
    let path = local_path(data_url)?;
    let metadata = fs::metadata(&path).map_err(|e| Error::Validation(format!("cannot read data_url `{data_url}`: {e}")))?;

    let files = if metadata.is_dir() {
        let mut entries: Vec<(String, PathBuf)> = fs::read_dir(&path)
            .map_err(|e| Error::Validation(format!("cannot list directory `{}`: {e}", path.display())))?
            .filter_map(|entry| entry.ok())
            .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
            .filter(|(_, p)| p.is_file())
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, p)| p).collect()
    } else {
        vec![path]
    };

    if files.is_empty() {
        return Err(Error::Validation(format!("data_url `{data_url}` resolved to an empty input set")));
    }

    Ok(files.into_iter().map(|p| p.to_string_lossy().to_string()).collect())
}

/// Extracts the registry-lookup job directory root (`<SHARED_ROOT or
/// local root>/jobs/<job_id>`) that map/reduce output paths are built
/// under.
pub fn job_dir(root: &str, job_id: &str) -> String {
    Path::new(root).join("jobs").join(job_id).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn directory_expands_sorted() {
        let dir = tempdir().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            File::create(dir.path().join(name)).unwrap().write_all(b"x").unwrap();
        }
        let url = format!("file://{}", dir.path().display());
        let files = resolve_input_files(&url).unwrap();
        let names: Vec<_> = files.iter().map(|f| Path::new(f).file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn single_file_resolves_to_itself() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("only.txt");
        File::create(&file).unwrap().write_all(b"x").unwrap();
        let files = resolve_input_files(file.to_str().unwrap()).unwrap();
        assert_eq!(files, vec![file.to_string_lossy().to_string()]);
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        assert!(resolve_input_files(&url).is_err());
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(resolve_input_files("/no/such/path").is_err());
    }
}

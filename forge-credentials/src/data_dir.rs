use std::path::PathBuf;

use dirs::home_dir;

/// Returns the path to the runtime's data directory, overridable via the
/// `FORGE_DATA_DIR` environment variable. Defaults to `~/.forge`.
///
/// - If `FORGE_DATA_DIR` is set, the value must exist and be a directory;
///   it is canonicalized and this function errs otherwise.
/// - If unset, the default path is returned without checking existence.
pub fn find_data_dir() -> std::io::Result<PathBuf> {
    let env = std::env::var("FORGE_DATA_DIR")
        .ok()
        .filter(|val| !val.is_empty());
    find_data_dir_from_env(env.as_deref())
}

fn find_data_dir_from_env(data_dir_env: Option<&str>) -> std::io::Result<PathBuf> {
    match data_dir_env {
        Some(val) => {
            let path = PathBuf::from(val);
            let metadata = std::fs::metadata(&path).map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("FORGE_DATA_DIR points to {val:?}, but that path does not exist"),
                ),
                _ => std::io::Error::new(
                    err.kind(),
                    format!("failed to read FORGE_DATA_DIR {val:?}: {err}"),
                ),
            })?;
            if !metadata.is_dir() {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("FORGE_DATA_DIR points to {val:?}, but that path is not a directory"),
                ))
            } else {
                path.canonicalize().map_err(|err| {
                    std::io::Error::new(
                        err.kind(),
                        format!("failed to canonicalize FORGE_DATA_DIR {val:?}: {err}"),
                    )
                })
            }
        }
        None => {
            let mut p = home_dir().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "could not find home directory")
            })?;
            p.push(".forge");
            Ok(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::find_data_dir_from_env;
    use dirs::home_dir;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_fatal() {
        let temp_home = TempDir::new().unwrap();
        let missing = temp_home.path().join("missing-data-dir");
        let missing_str = missing.to_str().unwrap();

        let err = find_data_dir_from_env(Some(missing_str)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("FORGE_DATA_DIR"));
    }

    #[test]
    fn file_path_is_fatal() {
        let temp_home = TempDir::new().unwrap();
        let file_path = temp_home.path().join("data-dir.txt");
        fs::write(&file_path, "not a directory").unwrap();

        let err = find_data_dir_from_env(Some(file_path.to_str().unwrap())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn valid_directory_canonicalizes() {
        let temp_home = TempDir::new().unwrap();
        let resolved = find_data_dir_from_env(Some(temp_home.path().to_str().unwrap())).unwrap();
        assert_eq!(resolved, temp_home.path().canonicalize().unwrap());
    }

    #[test]
    fn without_env_uses_default_home_dir() {
        let resolved = find_data_dir_from_env(None).unwrap();
        let mut expected = home_dir().unwrap();
        expected.push(".forge");
        assert_eq!(resolved, expected);
    }
}

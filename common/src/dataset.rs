use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs::{read, read_dir};
use tracing::debug;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Invalid file pattern")]
    Pattern(#[from] regex::Error),
    #[error("Reading {}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("No file in {} matches {pattern}", .dir.display())]
    NoInputFiles { dir: PathBuf, pattern: String },
    #[error("Parsing {}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },
}

type Result<T> = core::result::Result<T, DatasetError>;

/// Lists the regular files in `dir` whose file name matches `pattern`,
/// sorted by file name.
pub async fn find_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let regex = Regex::new(pattern)?;
    let io_err = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut items = read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = items.next_entry().await.map_err(io_err)? {
        if !entry.file_type().await.map_err(io_err)?.is_file() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str() {
            Some(name) if regex.is_match(name) => files.push(entry.path()),
            _ => debug!("Skipping {:?}", name),
        }
    }

    if files.is_empty() {
        return Err(DatasetError::NoInputFiles {
            dir: dir.to_path_buf(),
            pattern: pattern.to_owned(),
        });
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Deserializes every row of a headed CSV file.
pub async fn read_csv_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let data = read(path).await.map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_slice())
        .deserialize()
        .collect::<core::result::Result<Vec<T>, _>>()
        .map_err(|source| DatasetError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Concatenates the rows of all `files`, in order.
pub async fn read_all<T: DeserializeOwned>(files: &[PathBuf]) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for file in files {
        let mut rows = read_csv_records(file).await?;
        debug!("Read {} rows from {}", rows.len(), file.display());
        records.append(&mut rows);
    }
    Ok(records)
}

/// Sorted distinct values of one column.
pub fn distinct<T, K, F>(records: &[T], key: F) -> Vec<K>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    records.iter().map(key).sorted().dedup().collect()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Row {
        name: String,
        value: u32,
    }

    async fn write_files(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            tokio::fs::write(dir.path().join(name), content).await.unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn finds_matching_files_sorted() {
        let dir = write_files(&[
            ("service_b.csv", ""),
            ("service_a.csv", ""),
            ("other.csv", ""),
            ("service.txt", ""),
        ])
        .await;
        tokio::fs::create_dir(dir.path().join("service_dir.csv"))
            .await
            .unwrap();

        let files = find_files(dir.path(), r"^service.*\.csv$").await.unwrap();
        let names = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, ["service_a.csv", "service_b.csv"]);
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() {
        let dir = write_files(&[("notes.md", "")]).await;
        let err = find_files(dir.path(), r"^service.*\.csv$").await.unwrap_err();
        assert!(matches!(err, DatasetError::NoInputFiles { .. }));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_files(&dir.path().join("missing"), ".*").await.unwrap_err();
        assert!(matches!(err, DatasetError::Io { .. }));
    }

    #[tokio::test]
    async fn invalid_pattern_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_files(dir.path(), "(").await.unwrap_err();
        assert!(matches!(err, DatasetError::Pattern(_)));
    }

    #[tokio::test]
    async fn reads_and_concatenates_all_files() {
        let dir = write_files(&[
            ("a.csv", "name,value,extra\nx,1,ignored\ny,2,ignored\n"),
            ("b.csv", "value,name\n3,z\n"),
        ])
        .await;
        let files = find_files(dir.path(), r"\.csv$").await.unwrap();

        let rows: Vec<Row> = read_all(&files).await.unwrap();
        assert_eq!(
            rows,
            vec![
                Row { name: "x".into(), value: 1 },
                Row { name: "y".into(), value: 2 },
                Row { name: "z".into(), value: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn missing_column_names_the_file() {
        let dir = write_files(&[("broken.csv", "name\nx\n")]).await;
        let err = read_csv_records::<Row>(&dir.path().join("broken.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Csv { .. }));
        assert!(err.to_string().contains("broken.csv"));
    }

    #[tokio::test]
    async fn cause_is_reported_once() {
        let dir = write_files(&[("broken.csv", "name,value\nx,nope\n")]).await;
        let path = dir.path().join("broken.csv");
        let err = read_csv_records::<Row>(&path).await.unwrap_err();

        assert_eq!(err.to_string(), format!("Parsing {}", path.display()));
        let cause = std::error::Error::source(&err).unwrap().to_string();
        let report = format!("{:#}", eyre::Report::new(err));
        assert_eq!(report.matches(&cause).count(), 1);
    }

    #[test]
    fn distinct_values_are_sorted() {
        let rows = vec![
            Row { name: "b".into(), value: 3 },
            Row { name: "a".into(), value: 1 },
            Row { name: "b".into(), value: 3 },
        ];
        assert_eq!(distinct(&rows, |r| r.value), vec![1, 3]);
        assert_eq!(distinct(&rows, |r| r.name.clone()), vec!["a", "b"]);
    }
}

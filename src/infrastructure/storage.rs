//! Durable outputs of a crawl run
//!
//! Experiences are pretty-printed JSON files named `<id>.json`, listings and
//! failure logs are plain text with one URL per line.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::crawl_error::CrawlResult;
use crate::domain::Experience;

async fn ensure_parent(path: &Path) -> CrawlResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Writes through a `.tmp` sibling renamed over `path`; `path` is either absent
/// or complete.
async fn write_atomically(path: &Path, content: &[u8]) -> CrawlResult<()> {
    ensure_parent(path).await?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Overwrites any previous document at `path`.
pub async fn write_experience(path: &Path, experience: &Experience) -> CrawlResult<()> {
    let json = serde_json::to_string_pretty(experience)?;
    write_atomically(path, json.as_bytes()).await?;
    debug!("Saved experience {} to {}", experience.id, path.display());
    Ok(())
}

pub async fn write_url_list(path: &Path, urls: &[String]) -> CrawlResult<()> {
    let mut content = String::with_capacity(urls.iter().map(|u| u.len() + 1).sum());
    for url in urls {
        content.push_str(url);
        content.push('\n');
    }
    write_atomically(path, content.as_bytes()).await?;
    debug!("Saved {} urls to {}", urls.len(), path.display());
    Ok(())
}

pub fn failure_log_path(dir: &Path, kind: &str) -> PathBuf {
    dir.join(format!("failed_urls_{kind}.txt"))
}

/// Appends `url` to the failure log of `kind`, creating it when needed.
pub async fn append_failure(dir: &Path, kind: &str, url: &str) -> CrawlResult<PathBuf> {
    fs::create_dir_all(dir).await?;
    let path = failure_log_path(dir, kind);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(format!("{url}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

/// Non-blank lines, trimmed.
pub async fn read_url_list(path: &Path) -> CrawlResult<Vec<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `*.txt` files directly inside `dir`, sorted by name.
pub async fn list_url_files(dir: &Path) -> CrawlResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_record_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric experience id from the `ID` query parameter, or the trailing digits
/// of the path. A non-numeric `ID` rejects the URL.
pub fn experience_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key.eq_ignore_ascii_case("id")) {
        let id = id.trim();
        if !id.is_empty() {
            return is_record_id(id).then(|| id.to_string());
        }
    }
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let digits: String = segment
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    is_record_id(&digits).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    #[case("https://www.erowid.org/experiences/exp.php?ID=1234", Some("1234"))]
    #[case("https://www.erowid.org/experiences/exp.php?format=pdf&ID=77", Some("77"))]
    #[case("https://example.org/reports/exp5678", Some("5678"))]
    #[case("https://example.org/reports/5678/", Some("5678"))]
    #[case("https://www.erowid.org/experiences/exp.php", None)]
    #[case("not a url", None)]
    #[case("https://www.erowid.org/experiences/exp.php?ID=../x", None)]
    #[case("https://www.erowid.org/experiences/exp.php?ID=../../escaped", None)]
    #[case("https://www.erowid.org/experiences/exp.php?ID=abc", None)]
    #[case("https://www.erowid.org/experiences/exp.php?ID=12a", None)]
    fn test_experience_id_from_url(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(experience_id_from_url(url).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_failure_log_appends_across_calls() {
        let dir = tempdir().unwrap();
        append_failure(dir.path(), "MissingTitle", "https://a").await.unwrap();
        let path = append_failure(dir.path(), "MissingTitle", "https://b").await.unwrap();

        assert_eq!(path, dir.path().join("failed_urls_MissingTitle.txt"));
        assert_eq!(read_url_list(&path).await.unwrap(), vec!["https://a", "https://b"]);
    }

    #[tokio::test]
    async fn test_url_list_round_trip_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/0_1000.txt");
        write_url_list(&path, &["https://a".to_string(), "https://b".to_string()])
            .await
            .unwrap();
        fs::write(dir.path().join("nested/extra.txt"), "\n  https://c  \n\n")
            .await
            .unwrap();
        fs::write(dir.path().join("nested/notes.md"), "ignored").await.unwrap();

        let files = list_url_files(&dir.path().join("nested")).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("0_1000.txt"));
        assert_eq!(read_url_list(&files[1]).await.unwrap(), vec!["https://c"]);
    }

    #[tokio::test]
    async fn test_write_experience_uses_document_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("42.json");
        let experience = Experience::from_json(
            "42",
            r#"{"title":"t","story_paragraphs":["p"],"substances_details":[],
                "substances_main":[],"metadata":{"body_weight":""},"tags":[]}"#,
        )
        .unwrap();

        fs::write(&path, "stale").await.unwrap();
        write_experience(&path, &experience).await.unwrap();
        assert!(!dir.path().join("42.json.tmp").exists());
        let reloaded = Experience::from_json("42", &fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(reloaded, experience);
    }
}

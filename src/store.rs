//! Read-only access to published artifacts for the HTTP API.

use anyhow::{Context, Result, bail};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::{ARTIFACT_EXTENSION, ArtifactInfo, ArtifactStore};
use crate::utils::get_random_user_agent;

/// Listing plus per-file fetch. `fetch` yields `None` for unknown files.
pub trait DocumentStore: Send + Sync {
    fn list(&self) -> BoxFuture<'_, Result<Vec<ArtifactInfo>>>;
    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Artifacts in a local directory, as written by the scraper.
pub struct LocalStore {
    artifacts: ArtifactStore,
}

impl LocalStore {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        // plain file names only
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return None;
        }
        Some(self.artifacts.dir().join(name))
    }
}

impl DocumentStore for LocalStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<ArtifactInfo>>> {
        Box::pin(async move { self.artifacts.list() })
    }

    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let Some(path) = self.resolve(name) else {
                return Ok(None);
            };
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type", default)]
    kind: String,
}

const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
/// Raw file bodies, without the 1 MB limit of the base64 JSON form.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// Artifacts committed to a GitHub repository, read through the contents
/// API.
pub struct GitHubStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubStore {
    pub fn new(owner: &str, repo: &str, path: &str, token: Option<String>) -> Result<Self> {
        Self::with_base_url("https://api.github.com", owner, repo, path, token)
    }

    pub fn with_base_url(api: &str, owner: &str, repo: &str, path: &str, token: Option<String>) -> Result<Self> {
        if owner.is_empty() || repo.is_empty() {
            bail!("GitHub store needs both an owner and a repository name");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(get_random_user_agent())
            .build()?;

        let base_url = format!(
            "{}/repos/{}/{}/contents/{}",
            api.trim_end_matches('/'),
            owner,
            repo,
            path.trim_matches('/')
        );

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url).header("Accept", accept);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }
}

impl DocumentStore for GitHubStore {
    fn list(&self) -> BoxFuture<'_, Result<Vec<ArtifactInfo>>> {
        Box::pin(async move {
            let response = self
                .get(&self.base_url, JSON_MEDIA_TYPE)
                .send()
                .await
                .context("Failed to list repository contents")?;

            if !response.status().is_success() {
                bail!("GitHub API error: {}", response.status());
            }

            let entries: Vec<ContentEntry> = response
                .json()
                .await
                .context("Failed to decode repository listing")?;

            let suffix = format!(".{}", ARTIFACT_EXTENSION);
            let mut files: Vec<ArtifactInfo> = entries
                .into_iter()
                .filter(|e| e.kind != "dir" && e.name.ends_with(&suffix))
                .map(|e| ArtifactInfo {
                    name: e.name,
                    size: e.size,
                })
                .collect();
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        })
    }

    fn fetch<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let url = format!("{}/{}", self.base_url, name);
            let response = self
                .get(&url, RAW_MEDIA_TYPE)
                .send()
                .await
                .with_context(|| format!("Failed to fetch {name}"))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !response.status().is_success() {
                bail!("GitHub API error: {}", response.status());
            }

            let content = response
                .text()
                .await
                .with_context(|| format!("Failed to read {name}"))?;
            Ok(Some(content))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves one canned HTTP response and hands back the request it saw.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).to_lowercase()
        });

        (addr, server)
    }

    #[tokio::test]
    async fn test_github_fetch_reads_raw_body() {
        let csv = "SN,Stock Symbol\n1,NABIL\n";
        let (addr, server) = serve_once("200 OK", csv).await;
        let store = GitHubStore::with_base_url(&addr, "me", "nepse-data", "data", Some("secret".into())).unwrap();

        let content = store.fetch("floorsheet_2025-06-25.csv").await.unwrap();
        assert_eq!(content.as_deref(), Some(csv));

        let request = server.await.unwrap();
        assert!(request.starts_with("get /repos/me/nepse-data/contents/data/floorsheet_2025-06-25.csv "));
        assert!(request.contains("accept: application/vnd.github.raw"));
        assert!(request.contains("authorization: token secret"));
    }

    #[tokio::test]
    async fn test_github_fetch_missing_file() {
        let (addr, server) = serve_once("404 Not Found", "{}").await;
        let store = GitHubStore::with_base_url(&addr, "me", "nepse-data", "data", None).unwrap();

        assert_eq!(store.fetch("floorsheet_2020-01-01.csv").await.unwrap(), None);
        server.await.unwrap();
    }

    #[test]
    fn test_listing_json() {
        let raw = r#"[
            {"name": "floorsheet_2025-06-25.csv", "size": 120, "type": "file"},
            {"name": "README.md", "size": 10, "type": "file"},
            {"name": "archive", "size": 0, "type": "dir"}
        ]"#;
        let entries: Vec<ContentEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].size, 120);
        assert_eq!(entries[2].kind, "dir");
    }

    #[test]
    fn test_github_store_requires_repo() {
        assert!(GitHubStore::new("", "repo", "data", None).is_err());
        let store = GitHubStore::with_base_url("http://localhost:1/", "me", "nepse-data", "/data/", None).unwrap();
        assert_eq!(store.base_url, "http://localhost:1/repos/me/nepse-data/contents/data");
    }

    #[tokio::test]
    async fn test_local_store_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("floorsheet_2025-06-25.csv"), "SN\n1\n").unwrap();
        let store = LocalStore::new(ArtifactStore::new(tmp.path(), "floorsheet"));

        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            store.fetch("floorsheet_2025-06-25.csv").await.unwrap().as_deref(),
            Some("SN\n1\n")
        );
        assert_eq!(store.fetch("floorsheet_2020-01-01.csv").await.unwrap(), None);
        assert_eq!(store.fetch("../secret.csv").await.unwrap(), None);
    }
}

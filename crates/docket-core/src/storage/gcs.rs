use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{ObjectStore, Result, StorageLocator, mime_type};
use crate::auth::TokenSource;
use crate::error::StorageError;
use crate::models::config::StorageConfig;

/// Cloud Storage JSON API client.
pub struct GcsStore {
    client: reqwest::Client,
    tokens: TokenSource,
    endpoint: String,
}

impl GcsStore {
    pub fn new(config: &StorageConfig, tokens: TokenSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            tokens,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn upload_url(&self, locator: &StorageLocator) -> Result<Url> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &locator.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &locator.object);
        Ok(url)
    }

    fn download_url(&self, locator: &StorageLocator) -> Result<Url> {
        let mut url = self.object_url(locator)?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn object_url(&self, locator: &StorageLocator) -> Result<Url> {
        self.url(&["storage", "v1", "b", &locator.bucket, "o", &locator.object])
    }

    fn list_url(&self, bucket: &str, prefix: &str, page_token: Option<&str>) -> Result<Url> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    /// Endpoint with percent-encoded path segments; object names may contain `/`.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StorageError::InvalidLocator(format!("{}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidLocator(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload(&self, local: &Path, locator: &StorageLocator) -> Result<()> {
        let bytes = tokio::fs::read(local).await?;
        let token = self.tokens.token().await?;
        let size = bytes.len();

        debug!("Uploading {} ({} bytes) to {}", local.display(), size, locator);

        let response = self
            .client
            .post(self.upload_url(locator)?)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, mime_type(local))
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        info!("Archived {} to {}", local.display(), locator);
        Ok(())
    }

    async fn download(&self, locator: &StorageLocator, dest: &Path) -> Result<()> {
        let token = self.tokens.token().await?;

        let response = self
            .client
            .get(self.download_url(locator)?)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        debug!("Downloaded {} ({} bytes) to {}", locator, bytes.len(), dest.display());
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageLocator>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.tokens.token().await?;
            let response = self
                .client
                .get(self.list_url(bucket, prefix, page_token.as_deref())?)
                .bearer_auth(token)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StorageError::Api { status, body });
            }

            let page: ObjectList = response.json().await?;
            objects.extend(
                page.items
                    .into_iter()
                    .map(|item| StorageLocator::new(bucket, item.name)),
            );

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.object.cmp(&b.object));
        Ok(objects)
    }

    async fn delete(&self, locator: &StorageLocator) -> Result<()> {
        let token = self.tokens.token().await?;

        let response = self
            .client
            .delete(self.object_url(locator)?)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        info!("Deleted {}", locator);
        Ok(())
    }
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ObjectList {
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectItem {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> GcsStore {
        let config = StorageConfig {
            endpoint: server.uri(),
            ..Default::default()
        };
        GcsStore::new(&config, TokenSource::Static("tok".into())).unwrap()
    }

    #[test]
    fn test_urls_encode_object_names() {
        let config = StorageConfig::default();
        let store = GcsStore::new(&config, TokenSource::None).unwrap();
        let loc = StorageLocator::new("prod", "a b/inv.pdf");

        assert_eq!(
            store.download_url(&loc).unwrap().as_str(),
            "https://storage.googleapis.com/storage/v1/b/prod/o/a%20b%2Finv.pdf?alt=media"
        );
        assert_eq!(
            store.upload_url(&loc).unwrap().as_str(),
            "https://storage.googleapis.com/upload/storage/v1/b/prod/o?uploadType=media&name=a+b%2Finv.pdf"
        );
    }

    #[tokio::test]
    async fn test_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/prod/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "data/inv.pdf"))
            .and(header("authorization", "Bearer tok"))
            .and(header("content-type", "application/pdf"))
            .and(body_bytes(b"%PDF".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "data/inv.pdf"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"%PDF").unwrap();

        store(&server)
            .upload(file.path(), &StorageLocator::new("prod", "data/inv.pdf"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/prod/o/in%2Finv.pdf"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"content".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("inv.pdf");
        store(&server)
            .download(&StorageLocator::new("prod", "in/inv.pdf"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let err = store(&server)
            .upload(file.path(), &StorageLocator::new("prod", "x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/scratch/o"))
            .and(query_param("prefix", "adhoc/"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"name": "adhoc/a/inv.pdf", "size": "10"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/scratch/o"))
            .and(query_param("prefix", "adhoc/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"name": "adhoc/b/inv.pdf"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let objects = store(&server).list("scratch", "adhoc/").await.unwrap();
        let names: Vec<String> = objects.iter().map(|o| o.to_string()).collect();
        assert_eq!(
            names,
            vec!["gs://scratch/adhoc/a/inv.pdf", "gs://scratch/adhoc/b/inv.pdf"]
        );
    }

    #[tokio::test]
    async fn test_list_empty_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/scratch/o"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"kind": "storage#objects"})))
            .mount(&server)
            .await;

        assert!(store(&server).list("scratch", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/b/prod/o/in%2Finv.pdf"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/b/prod/o/gone.pdf"))
            .respond_with(ResponseTemplate::new(404).set_body_string("No such object"))
            .mount(&server)
            .await;

        let store = store(&server);
        store.delete(&StorageLocator::new("prod", "in/inv.pdf")).await.unwrap();
        let err = store
            .delete(&StorageLocator::new("prod", "gone.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Api { status: 404, .. }));
    }
}

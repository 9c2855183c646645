use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::io::ReaderStream;

use super::{
    AlbumAddResult, AssetFilter, RemoteAlbum, RemoteAsset, RemoteClient, RemoteError,
    UploadResponse,
};
use crate::asset::CandidateAsset;
use crate::config::ServerConfig;

/// Page size for asset searches.
const SEARCH_PAGE_SIZE: usize = 1000;

/// [`RemoteClient`] for servers speaking the Immich REST API.
pub struct HttpClient {
    base_url: String,
    api_key: String,
    device_id: String,
    client: Client,
}

#[derive(Deserialize)]
struct UploadBody {
    id: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct SearchBody {
    assets: SearchPage,
}

#[derive(Deserialize)]
struct SearchPage {
    items: Vec<RemoteAsset>,
    #[serde(rename = "nextPage")]
    next_page: Option<String>,
}

impl HttpClient {
    pub fn new(server: &ServerConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(server.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: server.url.trim_end_matches('/').to_string(),
            api_key: server.api_key.clone(),
            device_id: server.device_id.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
    }

    /// Send a request and decode the JSON body of a successful response.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let resp = self.authorized(request).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        check_status(status, &text)?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(format!("{e}: {text}")))
    }

    async fn search_page(&self, filter: &AssetFilter, page: usize) -> Result<SearchPage, RemoteError> {
        let mut body = json!({
            "page": page,
            "size": SEARCH_PAGE_SIZE,
            "withArchived": filter.with_archived,
        });
        if let Some(name) = &filter.original_file_name {
            body["originalFileName"] = json!(name);
        }
        let resp: SearchBody = self
            .send_json(self.client.post(self.url("search/metadata")).json(&body))
            .await?;
        Ok(resp.assets)
    }

    /// Copy the sidecar description onto a freshly uploaded asset. The upload
    /// form has no field for it.
    async fn set_description(&self, asset_id: &str, body: &Value) -> Result<(), RemoteError> {
        let url = self.url(&format!("assets/{asset_id}"));
        let _: Value = self.send_json(self.client.put(url).json(body)).await?;
        Ok(())
    }
}

/// Body of the asset update carrying a description, if there is one to send.
fn description_update(asset: &CandidateAsset) -> Option<Value> {
    let description = asset.description.as_deref()?.trim();
    if description.is_empty() {
        return None;
    }
    Some(json!({ "description": description }))
}

fn check_status(status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(RemoteError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    Ok(())
}

#[async_trait::async_trait]
impl RemoteClient for HttpClient {
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<RemoteAsset>, RemoteError> {
        let mut assets = Vec::new();
        let mut page = 1;
        loop {
            let resp = self.search_page(filter, page).await?;
            assets.extend(resp.items);
            match resp.next_page.and_then(|p| p.parse().ok()) {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        log::debug!("Server holds {} matching assets", assets.len());
        Ok(assets)
    }

    async fn upload_asset(&self, asset: &CandidateAsset) -> Result<UploadResponse, RemoteError> {
        let io_err = |source| RemoteError::Io {
            path: asset.path.clone(),
            source,
        };
        let file = tokio::fs::File::open(&asset.path).await.map_err(io_err)?;
        let meta = file.metadata().await.map_err(io_err)?;

        let modified = meta
            .modified()
            .ok()
            .map(DateTime::<Utc>::from)
            .or(asset.created)
            .unwrap_or_else(Utc::now);
        let created = asset.created.unwrap_or(modified);

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), meta.len())
            .file_name(asset.name.clone())
            .mime_str(asset.kind.mime_type(&asset.path))?;
        let form = Form::new()
            .text("deviceAssetId", asset.device_asset_id())
            .text("deviceId", self.device_id.clone())
            .text("fileCreatedAt", created.to_rfc3339())
            .text("fileModifiedAt", modified.to_rfc3339())
            .text("isFavorite", "false")
            .part("assetData", part);

        let body: UploadBody = self
            .send_json(self.client.post(self.url("assets")).multipart(form))
            .await?;
        let duplicate = body.status == "duplicate";
        if !duplicate {
            if let Some(update) = description_update(asset) {
                if let Err(e) = self.set_description(&body.id, &update).await {
                    log::warn!("Uploaded {} but could not set its description: {e}", asset.upload_key);
                }
            }
        }
        Ok(UploadResponse {
            duplicate,
            id: body.id,
        })
    }

    async fn delete_assets(&self, ids: &[String]) -> Result<(), RemoteError> {
        let body = json!({ "ids": ids, "force": false });
        let resp = self
            .authorized(self.client.delete(self.url("assets")).json(&body))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        check_status(status, &text)
    }

    async fn list_albums(&self) -> Result<Vec<RemoteAlbum>, RemoteError> {
        self.send_json(self.client.get(self.url("albums"))).await
    }

    async fn create_album(&self, name: &str, asset_ids: &[String]) -> Result<RemoteAlbum, RemoteError> {
        let body = json!({ "albumName": name, "assetIds": asset_ids });
        self.send_json(self.client.post(self.url("albums")).json(&body))
            .await
    }

    async fn add_assets_to_album(
        &self,
        album_id: &str,
        asset_ids: &[String],
    ) -> Result<Vec<AlbumAddResult>, RemoteError> {
        let body = json!({ "ids": asset_ids });
        let url = self.url(&format!("albums/{album_id}/assets"));
        self.send_json(self.client.put(url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(url: &str) -> ServerConfig {
        ServerConfig {
            url: url.into(),
            api_key: "key".into(),
            ..Default::default()
        }
    }

    #[test]
    fn urls_are_joined_under_api() {
        let client = HttpClient::new(&server("http://localhost:2283/")).unwrap();
        assert_eq!(client.url("albums"), "http://localhost:2283/api/albums");
        assert_eq!(
            client.url("albums/abc/assets"),
            "http://localhost:2283/api/albums/abc/assets"
        );
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, ""),
            Err(RemoteError::Unauthorized { status: 401 })
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            Err(RemoteError::Status { status: 500, .. })
        ));
        assert!(check_status(StatusCode::CREATED, "").is_ok());
    }

    #[test]
    fn search_page_decodes() {
        let json = r#"{"assets": {"total": 1, "count": 1, "items": [{"id": "x", "originalFileName": "a.jpg"}], "nextPage": null}}"#;
        let body: SearchBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.assets.items.len(), 1);
        assert!(body.assets.next_page.is_none());
    }

    #[test]
    fn description_update_body() {
        use crate::scan::MediaKind;
        use std::collections::BTreeSet;

        let mut asset = CandidateAsset {
            name: "a.jpg".into(),
            path: "a.jpg".into(),
            upload_key: "a.jpg".into(),
            kind: MediaKind::Image,
            created: None,
            albums: BTreeSet::new(),
            partner_shared: false,
            description: None,
        };
        assert!(description_update(&asset).is_none());

        asset.description = Some("  ".into());
        assert!(description_update(&asset).is_none());

        asset.description = Some("Sunset at the pier\n".into());
        assert_eq!(
            description_update(&asset),
            Some(json!({ "description": "Sunset at the pier" }))
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_fatal() {
        let client = HttpClient::new(&server("http://127.0.0.1:9")).unwrap();
        let err = client.list_albums().await.unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }
}

//! folders served over http
//!
//! A folder url (always ending in `/`) answers GET with a [Listing](super::Listing) as text.
//! A file url answers GET with its content and accepts PUT to replace it.
//!
//! The root url may instead answer with a packed archive (any non `text/*` content type).
use super::remote::{RemoteFolder, Transport};
use super::Listing;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use std::sync::Arc;

pub type HttpFolder = RemoteFolder<HttpTransport>;

#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    root: Url,
    root_name: String,
}

impl HttpTransport {
    pub fn new(client: Client, root: Url) -> Self {
        let root = folder_url(root);
        Self {
            client,
            root_name: root.to_string(),
            root,
        }
    }

    fn url_for(&self, path: &str, is_folder: bool) -> Option<Url> {
        if path.is_empty() {
            return Some(self.root.clone());
        }
        let relative = if is_folder {
            format!("{path}/")
        } else {
            path.to_string()
        };
        match self.root.join(&relative) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::error!(root = %self.root, path, %err, "invalid asset url");
                None
            }
        }
    }

    async fn get(&self, url: Url) -> Option<Bytes> {
        get(&self.client, url).await.map(|(bytes, _)| bytes)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn root_name(&self) -> &str {
        &self.root_name
    }

    async fn fetch_listing(&self, path: &str) -> Option<Bytes> {
        self.get(self.url_for(path, true)?).await
    }

    async fn fetch_file(&self, path: &str) -> Option<Bytes> {
        self.get(self.url_for(path, false)?).await
    }

    async fn upload(&self, path: &str, bytes: Bytes) -> bool {
        let Some(url) = self.url_for(path, false) else {
            return false;
        };
        tracing::debug!(uri = %url, len = bytes.len(), "uploading");
        match self.client.put(url.clone()).body(bytes).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::error!(status = %response.status(), uri = %url, "upload failed");
                false
            }
            Err(err) => {
                tracing::error!(uri = %url, %err, "upload failed");
                false
            }
        }
    }

    fn writable(&self) -> bool {
        true
    }
}

/// What the root url answered with
#[derive(Debug)]
pub enum HttpRoot {
    Listed(HttpFolder),
    Packed(Bytes),
}

/// Fetches the root url and decides between a listing and a packed archive
///
/// Returns `None` when the request fails (logged).
pub async fn open_root(client: Client, root: Url) -> Option<HttpRoot> {
    let transport = Arc::new(HttpTransport::new(client, root));
    let (bytes, content_type) = get(&transport.client, transport.root.clone()).await?;

    let is_text = content_type
        .as_deref()
        .map(|content_type| content_type.trim_start().starts_with("text/"))
        .unwrap_or(true);
    if !is_text {
        tracing::info!(root = %transport.root, ?content_type, "root is a packed archive");
        return Some(HttpRoot::Packed(bytes));
    }

    let listing = Listing::parse(&String::from_utf8_lossy(&bytes));
    Some(HttpRoot::Listed(RemoteFolder::with_listing(
        transport, listing,
    )))
}

async fn get(client: &Client, url: Url) -> Option<(Bytes, Option<String>)> {
    tracing::trace!(uri = %url, "GET");
    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(uri = %url, %err, "request failed");
            return None;
        }
    };
    if !response.status().is_success() {
        tracing::error!(status = %response.status(), uri = %url, "request failed");
        return None;
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    match response.bytes().await {
        Ok(bytes) => Some((bytes, content_type)),
        Err(err) => {
            tracing::error!(uri = %url, %err, "response body failed");
            None
        }
    }
}

fn folder_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

use super::CacheError;
use crate::history::WorkIdentity;
use async_trait::async_trait;
use tracing::*;
use url::Url;

/// A build cache store reached over the network.
///
/// Errors returned by a remote store never fail a build on their own: they count towards
/// disabling the remote for the rest of the build.
///
#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug {
    fn pull_enabled(&self) -> bool;

    fn push_enabled(&self) -> bool;

    async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError>;

    async fn put(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<(), CacheError>;

    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Talks to an HTTP cache server that serves entries at `<base_url>/<key>`.
///
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: Url,
    pull: bool,
    push: bool,
}

impl HttpRemoteStore {
    pub fn new(client: reqwest::Client, base_url: Url, pull: bool, push: bool) -> Self {
        Self {
            client,
            base_url,
            pull,
            push,
        }
    }

    fn entry_url(&self, key: &WorkIdentity) -> Result<Url, CacheError> {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            key.as_str()
        )
        .parse::<Url>()
        .map_err(|err| CacheError::InvalidUrl {
            key: key.to_string(),
            err,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn pull_enabled(&self) -> bool {
        self.pull
    }

    fn push_enabled(&self) -> bool {
        self.push
    }

    #[tracing::instrument(name = "HttpRemoteStore::get", skip(self))]
    async fn get(&self, key: &WorkIdentity) -> Result<Option<Vec<u8>>, CacheError> {
        let url = self.entry_url(key)?;
        let response = self.client.get(url.clone()).send().await?;

        match response.status().as_u16() {
            200 => Ok(Some(response.bytes().await?.to_vec())),
            404 => Ok(None),
            status => Err(CacheError::UnexpectedStatus { url, status }),
        }
    }

    #[tracing::instrument(name = "HttpRemoteStore::put", skip(self, payload))]
    async fn put(&self, key: &WorkIdentity, payload: Vec<u8>) -> Result<(), CacheError> {
        let url = self.entry_url(key)?;
        let size = payload.len();
        let response = self.client.put(url.clone()).body(payload).send().await?;

        if response.status().is_success() {
            debug!("Pushed {} bytes to {}", size, url);
            return Ok(());
        }

        Err(CacheError::UnexpectedStatus {
            url,
            status: response.status().as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(server: &mockito::Server) -> HttpRemoteStore {
        let url: Url = format!("{}/cache/", server.url()).parse().unwrap();
        HttpRemoteStore::new(reqwest::Client::new(), url, true, true)
    }

    #[tokio::test]
    async fn found_entries_are_hits() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/cache/abc")
            .with_status(200)
            .with_body(b"payload")
            .create_async()
            .await;

        let remote = store(&server).await;
        assert_eq!(
            remote.get(&"abc".into()).await.unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn not_found_entries_are_misses() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/cache/abc")
            .with_status(404)
            .create_async()
            .await;

        let remote = store(&server).await;
        assert!(remote.get(&"abc".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_errors_are_errors() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/cache/abc")
            .with_status(500)
            .create_async()
            .await;

        let remote = store(&server).await;
        assert_matches!(
            remote.get(&"abc".into()).await,
            Err(CacheError::UnexpectedStatus { status: 500, .. })
        );
    }

    #[tokio::test]
    async fn pushes_payloads_with_put() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("PUT", "/cache/abc")
            .match_body("payload")
            .with_status(201)
            .create_async()
            .await;

        let remote = store(&server).await;
        remote.put(&"abc".into(), b"payload".to_vec()).await.unwrap();
        m.assert_async().await;
    }
}

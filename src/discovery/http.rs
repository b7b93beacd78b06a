use super::Discovery;
use crate::error::ConfdError;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

pub struct HttpDiscovery {
    client: reqwest::Client,
    url: String,
}

impl HttpDiscovery {
    /// Build a client whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConfdError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ConfdError::Fetch {
                url: url.clone(),
                source,
            })?;
        Ok(Self { client, url })
    }

    fn fetch_err(&self, source: reqwest::Error) -> ConfdError {
        ConfdError::Fetch {
            url: self.url.clone(),
            source,
        }
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn fetch(&self) -> Result<Vec<u8>, ConfdError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| self.fetch_err(e))?;

        let body = response.bytes().await.map_err(|e| self.fetch_err(e))?;
        debug!("Fetched {} bytes from {}", body.len(), self.url);
        Ok(body.to_vec())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn returns_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/discover"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"base_ports":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let discovery =
            HttpDiscovery::new(format!("{}/v1/discover", server.uri()), TIMEOUT).unwrap();
        let body = discovery.fetch().await.unwrap();
        assert_eq!(body, br#"{"base_ports":[]}"#);
    }

    #[tokio::test]
    async fn server_error_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let discovery = HttpDiscovery::new(server.uri(), TIMEOUT).unwrap();
        let err = discovery.fetch().await.unwrap_err();
        assert!(matches!(err, ConfdError::Fetch { .. }));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let discovery = HttpDiscovery::new(server.uri(), Duration::from_millis(100)).unwrap();
        let err = discovery.fetch().await.unwrap_err();
        match err {
            ConfdError::Fetch { source, .. } => assert!(source.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_fetch_error() {
        // Bind then drop a listener to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let discovery = HttpDiscovery::new(format!("http://127.0.0.1:{port}/"), TIMEOUT).unwrap();
        let err = discovery.fetch().await.unwrap_err();
        assert!(matches!(err, ConfdError::Fetch { .. }));
        assert_eq!(discovery.endpoint(), format!("http://127.0.0.1:{port}/"));
    }
}

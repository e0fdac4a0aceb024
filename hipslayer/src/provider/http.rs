//! HTTP client abstraction for testability

use std::time::Duration;

use super::types::FetchError;
use crate::codec;
use crate::raster::Raster;

/// Default upstream request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Performs a GET request and decodes the body as PNG or JPEG.
    fn get_image(&self, url: &str) -> Result<Raster, FetchError> {
        let bytes = self.get(url)?;
        codec::decode(&bytes).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("hipslayer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(format!("Request failed: {}", e))
            }
        })?;

        // Check HTTP status
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Http(format!("HTTP {} from {}", status, url)));
        }

        // Read response body
        response.bytes().map(|b| b.to_vec()).map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(format!("Failed to read response: {}", e))
            }
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Mock HTTP client for testing
    pub struct MockHttpClient {
        pub response: Result<Vec<u8>, FetchError>,
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.response.clone()
        }
    }

    /// Mock client answering per URL and recording every request.
    #[derive(Default)]
    pub struct RoutedHttpClient {
        pub routes: HashMap<String, Vec<u8>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl RoutedHttpClient {
        pub fn with_route(mut self, url: &str, body: Vec<u8>) -> Self {
            self.routes.insert(url.to_string(), body);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    impl HttpClient for RoutedHttpClient {
        fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().push(url.to_string());
            self.routes
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        }
    }

    #[test]
    fn test_mock_client_success() {
        let mock = MockHttpClient {
            response: Ok(vec![1, 2, 3, 4]),
        };

        let result = mock.get("http://example.com");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mock_client_error() {
        let mock = MockHttpClient {
            response: Err(FetchError::Http("Test error".to_string())),
        };

        let result = mock.get("http://example.com");
        assert!(result.is_err());
    }

    #[test]
    fn test_get_image_decodes() {
        let png = crate::codec::TileFormat::Png
            .encode(&Raster::filled(2, 2, &[1, 2, 3, 4]))
            .unwrap();
        let mock = MockHttpClient { response: Ok(png) };
        let raster = mock.get_image("http://example.com/a.png").unwrap();
        assert_eq!(raster.pixel(1, 1), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_get_image_reports_decode_failure() {
        let mock = MockHttpClient {
            response: Ok(b"<html>".to_vec()),
        };
        assert!(matches!(
            mock.get_image("http://example.com/a.png"),
            Err(FetchError::Decode { .. })
        ));
    }

    #[test]
    fn test_routed_client_records_requests() {
        let client = RoutedHttpClient::default().with_route("http://a/b", vec![1]);
        assert_eq!(client.get("http://a/b").unwrap(), vec![1]);
        assert!(matches!(client.get("http://a/c"), Err(FetchError::NotFound(_))));
        assert_eq!(client.requested(), vec!["http://a/b", "http://a/c"]);
    }
}

//! An [`AssetAccessor`] backed by `reqwest`. Blocking by design: accessors
//! are only ever called from worker threads.

use std::time::Duration;

use strata_tiles::{AssetAccessor, AssetRequest, AssetResponse, Error};

pub struct WebAssetAccessor {
    client: reqwest::blocking::Client,
}

impl Default for WebAssetAccessor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl WebAssetAccessor {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    fn execute(
        &self,
        builder: reqwest::blocking::RequestBuilder,
        method: &str,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<AssetRequest, Error> {
        let mut builder = builder;
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().map_err(|e| Error::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let data = response.bytes().map_err(|e| Error::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        log::trace!("{method} {url} -> {status} ({} bytes)", data.len());

        Ok(AssetRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.to_vec(),
            response: Some(AssetResponse {
                status,
                content_type,
                headers: response_headers,
                data,
            }),
        })
    }
}

impl AssetAccessor for WebAssetAccessor {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<AssetRequest, Error> {
        self.execute(self.client.get(url), "GET", url, headers)
    }

    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<AssetRequest, Error> {
        let parsed = reqwest::Method::from_bytes(method.as_bytes()).map_err(|_| Error::Request {
            url: url.to_string(),
            message: format!("invalid method {method:?}"),
        })?;
        let builder = self.client.request(parsed, url).body(body.to_vec());
        self.execute(builder, method, url, headers)
    }
}

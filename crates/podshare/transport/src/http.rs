//! reqwest-backed object-store client.

use crate::auth::{Anonymous, TokenProvider};
use crate::{Method, PodClient, PodRequest, PodResponse, TransportError, TransportResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;

/// HTTP client for a pod server.
pub struct HttpPodClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpPodClient {
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            tokens: Arc::new(Anonymous),
        })
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| format!("invalid header name `{}`", name))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|_| format!("invalid value for header `{}`", name))?;
    Ok((header_name, header_value))
}

#[async_trait]
impl PodClient for HttpPodClient {
    async fn send(&self, request: PodRequest) -> TransportResult<PodResponse> {
        let url = Url::parse(&request.uri).map_err(|err| {
            TransportError::InvalidRequest(format!("{}: {}", request.uri, err))
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let (name, value) = header(name, value).map_err(TransportError::InvalidRequest)?;
            headers.insert(name, value);
        }
        if let Some(pair) = self.tokens.token_pair(request.method, &request.uri).await? {
            for (name, value) in pair.headers() {
                let (name, value) = header(&name, &value).map_err(TransportError::Credentials)?;
                headers.insert(name, value);
            }
        }

        let mut builder = self
            .client
            .request(reqwest_method(request.method), url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response.text().await?;

        tracing::debug!(method = %request.method, uri = %request.uri, status, "pod request");
        Ok(PodResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StaticTokens, TokenPair};
    use crate::TEXT_TURTLE;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn attaches_token_pair_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/notes/a.ttl.acr"))
            .and(header("authorization", "DPoP access-123"))
            .and(header("dpop", "proof-xyz"))
            .and(header("content-type", TEXT_TURTLE))
            .and(body_string("<#root> a <#x> ."))
            .respond_with(ResponseTemplate::new(205))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPodClient::new(Duration::from_secs(5))
            .unwrap()
            .with_tokens(Arc::new(StaticTokens(TokenPair {
                access_token: "access-123".to_string(),
                proof: "proof-xyz".to_string(),
            })));

        let response = client
            .send(PodRequest::put(
                format!("{}/notes/a.ttl.acr", server.uri()),
                TEXT_TURTLE,
                "<#root> a <#x> .",
            ))
            .await
            .unwrap();
        assert_eq!(response.status, 205);
    }

    #[tokio::test]
    async fn malformed_requests_fail_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = HttpPodClient::new(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.send(PodRequest::get("not a uri")).await,
            Err(TransportError::InvalidRequest(_))
        ));
        let bad_header = PodRequest::get(format!("{}/notes/", server.uri()))
            .with_header("x-note", "line\nbreak");
        assert!(matches!(
            client.send(bad_header).await,
            Err(TransportError::InvalidRequest(_))
        ));

        let client = client.with_tokens(Arc::new(StaticTokens(TokenPair {
            access_token: "access\r\n".to_string(),
            proof: "proof".to_string(),
        })));
        assert!(matches!(
            client
                .send(PodRequest::get(format!("{}/notes/", server.uri())))
                .await,
            Err(TransportError::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn surfaces_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", "<http://www.w3.org/ns/ldp#BasicContainer>; rel=\"type\"")
                    .set_body_string("<> a <http://www.w3.org/ns/ldp#Container> ."),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpPodClient::new(Duration::from_secs(5)).unwrap();
        let listing = client
            .send(PodRequest::get(format!("{}/notes/", server.uri())))
            .await
            .unwrap();
        assert!(listing.is_success());
        assert!(listing.is_container());
        assert!(listing.body.contains("ldp#Container"));

        let missing = client
            .send(PodRequest::get(format!("{}/missing", server.uri())))
            .await
            .unwrap();
        assert!(missing.is_not_found());
    }
}

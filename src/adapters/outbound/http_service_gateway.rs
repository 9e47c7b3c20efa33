//! HTTP Service Gateway
//!
//! Implements ServiceGateway against the load balancer's JSON API.
//!
//! Requests go to `{base}/{services_path}[/{name}]` with a bearer token.
//! All four operations share [`HttpServiceGateway::execute`], which sends
//! the request, drains the body and classifies the status against the
//! operation's [`StatusPolicy`].

use crate::config::{ClientConfig, ConfigError, LocationAuth};
use crate::domain::entities::Ingress;
use crate::domain::envelope::{EnvelopeError, Service, ServiceStream, StreamStep};
use crate::domain::ports::{Endpoint, GatewayError, Operation, ServiceGateway};
use crate::infrastructure::cancel::CancelToken;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

const JSON_CONTENT: &str = "application/json";

/// Statuses an operation treats as success, and whether 404 means absent.
#[derive(Debug, Clone, Copy)]
struct StatusPolicy {
    success: &'static [StatusCode],
    not_found_is_absent: bool,
}

impl StatusPolicy {
    fn accepts(&self, status: StatusCode) -> bool {
        self.success.contains(&status)
    }

    fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::List | Operation::Ingress => Self {
                success: &[StatusCode::OK],
                not_found_is_absent: false,
            },
            Operation::Get => Self {
                success: &[StatusCode::OK],
                not_found_is_absent: true,
            },
            Operation::Sync => Self {
                success: &[StatusCode::OK, StatusCode::CREATED],
                not_found_is_absent: false,
            },
            Operation::Delete => Self {
                success: &[StatusCode::NO_CONTENT],
                not_found_is_absent: false,
            },
        }
    }
}

/// A completed exchange with its body fully read.
#[derive(Debug)]
struct Exchange {
    status: StatusCode,
    location: Option<String>,
    body: Bytes,
}

#[derive(Debug)]
enum Outcome {
    Success(Exchange),
    Absent(Exchange),
}

impl Outcome {
    fn into_exchange(self) -> Exchange {
        match self {
            Self::Success(exchange) | Self::Absent(exchange) => exchange,
        }
    }
}

/// Streaming result of a list call.
///
/// The response body is read chunk by chunk and each service is yielded
/// as soon as its array element is complete. The first malformed element
/// yields a [`GatewayError::Decode`] and ends the list. Dropping the list
/// early drops the response and closes its connection.
#[derive(Debug)]
pub struct ServiceList {
    url: String,
    response: Option<reqwest::Response>,
    stream: ServiceStream,
    cancel: CancelToken,
}

impl ServiceList {
    /// URL the list was fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next service in the list, or `None` once the array is exhausted.
    pub async fn next_service(&mut self) -> Option<Result<Service, GatewayError>> {
        loop {
            match self.stream.step() {
                StreamStep::Item(Ok(service)) => return Some(Ok(service)),
                StreamStep::Item(Err(source)) => {
                    self.response = None;
                    return Some(Err(GatewayError::Decode {
                        operation: Operation::List,
                        url: self.url.clone(),
                        source,
                    }));
                }
                StreamStep::End => {
                    self.response = None;
                    return None;
                }
                StreamStep::NeedMore => {}
            }

            match self.read_chunk().await {
                Ok(Some(chunk)) => self.stream.push(&chunk),
                Ok(None) => self.stream.end_input(),
                Err(err) => {
                    self.response = None;
                    self.stream.abort();
                    return Some(Err(err));
                }
            }
        }
    }

    /// Drain the remaining services into a vector, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<Service>, GatewayError> {
        let mut services = Vec::new();
        while let Some(service) = self.next_service().await {
            services.push(service?);
        }
        Ok(services)
    }

    /// Adapt the list into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Service, GatewayError>> {
        stream::unfold(self, |mut list| async move {
            list.next_service().await.map(|item| (item, list))
        })
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, GatewayError> {
        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };
        let chunk = self
            .cancel
            .run(response.chunk())
            .await
            .map_err(|_| GatewayError::Cancelled {
                operation: Operation::List,
                url: self.url.clone(),
            })?
            .map_err(|source| GatewayError::Transport {
                operation: Operation::List,
                url: self.url.clone(),
                source,
            })?;
        if chunk.is_none() {
            self.response = None;
        }
        Ok(chunk)
    }
}

/// Gateway to the load balancer API over HTTP.
///
/// Holds one `reqwest::Client`, so connections are pooled and reused
/// across calls. Cloning the gateway shares that pool.
#[derive(Debug, Clone)]
pub struct HttpServiceGateway {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpServiceGateway {
    /// Create a gateway with its own connection pool.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a gateway on top of an existing client.
    pub fn with_client(
        config: ClientConfig,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch the service collection and decode it element by element.
    ///
    /// Returns once the status line and headers are in; the body is read
    /// as the list is consumed.
    pub async fn list_stream(
        &self,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<ServiceList, GatewayError> {
        let operation = Operation::List;
        let url = self.collection_url(operation, endpoint.base_url())?;
        let request = self.request(Method::GET, url.clone(), Some(endpoint.token()));
        let response = self.send(operation, request, &url, cancel).await?;

        if !StatusPolicy::for_operation(operation).accepts(response.status()) {
            let exchange = Self::read_exchange(operation, &url, response, cancel).await?;
            return Err(Self::unexpected(operation, &url, exchange));
        }
        tracing::debug!("{} streaming, url={}", operation, url);

        Ok(ServiceList {
            url: url.to_string(),
            response: Some(response),
            stream: ServiceStream::incremental(),
            cancel: cancel.clone(),
        })
    }

    fn invalid_url(operation: Operation, url: &str, reason: impl ToString) -> GatewayError {
        GatewayError::InvalidUrl {
            operation,
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// `{base}/{services_path}`
    fn collection_url(&self, operation: Operation, base_url: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(base_url).map_err(|e| Self::invalid_url(operation, base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| Self::invalid_url(operation, base_url, "URL cannot be a base"))?
            .pop_if_empty()
            .extend(self.config.services_segments());
        Ok(url)
    }

    /// `{base}/{services_path}/{name}`, with `name` encoded as one segment.
    fn service_url(
        &self,
        operation: Operation,
        base_url: &str,
        name: &str,
    ) -> Result<Url, GatewayError> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(Self::invalid_url(
                operation,
                base_url,
                format!("invalid service name '{}'", name),
            ));
        }
        let mut url = self.collection_url(operation, base_url)?;
        url.path_segments_mut()
            .map_err(|_| Self::invalid_url(operation, base_url, "URL cannot be a base"))?
            .push(name);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, JSON_CONTENT)
            .header(USER_AGENT, self.config.user_agent.as_str());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    /// Send a request and wait for the status line and headers.
    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
        url: &Url,
        cancel: &CancelToken,
    ) -> Result<reqwest::Response, GatewayError> {
        tracing::debug!("{} request, url={}", operation, url);

        cancel
            .run(request.send())
            .await
            .map_err(|_| GatewayError::Cancelled {
                operation,
                url: url.to_string(),
            })?
            .map_err(|source| GatewayError::Transport {
                operation,
                url: url.to_string(),
                source,
            })
    }

    /// Read the whole body so the connection can go back to the pool.
    async fn read_exchange(
        operation: Operation,
        url: &Url,
        response: reqwest::Response,
        cancel: &CancelToken,
    ) -> Result<Exchange, GatewayError> {
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let body = cancel
            .run(response.bytes())
            .await
            .map_err(|_| GatewayError::Cancelled {
                operation,
                url: url.to_string(),
            })?
            .map_err(|source| GatewayError::Transport {
                operation,
                url: url.to_string(),
                source,
            })?;

        Ok(Exchange {
            status,
            location,
            body,
        })
    }

    /// Send a request, read the whole response and classify its status.
    ///
    /// The body is drained on every path, so the connection goes back to
    /// the pool whether the call succeeds or not.
    async fn execute(
        &self,
        operation: Operation,
        request: RequestBuilder,
        url: &Url,
        cancel: &CancelToken,
    ) -> Result<Outcome, GatewayError> {
        let response = self.send(operation, request, url, cancel).await?;
        let exchange = Self::read_exchange(operation, url, response, cancel).await?;
        Self::classify(operation, url, exchange)
    }

    fn classify(
        operation: Operation,
        url: &Url,
        exchange: Exchange,
    ) -> Result<Outcome, GatewayError> {
        let policy = StatusPolicy::for_operation(operation);

        if policy.accepts(exchange.status) {
            tracing::debug!(
                "{} ok, url={} status={} bytes={}",
                operation,
                url,
                exchange.status,
                exchange.body.len()
            );
            return Ok(Outcome::Success(exchange));
        }

        if policy.not_found_is_absent && exchange.status == StatusCode::NOT_FOUND {
            tracing::debug!("{} not found, url={}", operation, url);
            return Ok(Outcome::Absent(exchange));
        }

        Err(Self::unexpected(operation, url, exchange))
    }

    fn unexpected(operation: Operation, url: &Url, exchange: Exchange) -> GatewayError {
        let body = String::from_utf8_lossy(&exchange.body).trim().to_string();
        tracing::warn!(
            "{} failed, url={} status={}",
            operation,
            url,
            exchange.status
        );
        GatewayError::UnexpectedStatus {
            operation,
            url: url.to_string(),
            status: exchange.status,
            body,
        }
    }

    fn decode<T: DeserializeOwned>(
        operation: Operation,
        url: &Url,
        body: &[u8],
    ) -> Result<T, GatewayError> {
        serde_json::from_slice(body).map_err(|e| GatewayError::Decode {
            operation,
            url: url.to_string(),
            source: EnvelopeError::from(e),
        })
    }

    /// An empty body carries no ingress; anything else must be a JSON array.
    fn decode_ingress(
        operation: Operation,
        url: &Url,
        body: &[u8],
    ) -> Result<Vec<Ingress>, GatewayError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Self::decode(operation, url, body)
    }

    /// Whether the follow-up to `target` should carry the bearer token.
    fn location_token<'a>(&self, origin: &Url, target: &Url, token: &'a str) -> Option<&'a str> {
        match self.config.location_auth {
            LocationAuth::Always => Some(token),
            LocationAuth::SameOrigin if origin.origin() == target.origin() => Some(token),
            LocationAuth::SameOrigin | LocationAuth::Never => None,
        }
    }

    /// Follow a `Location` header to the service's ingress list.
    ///
    /// Relative locations resolve against the URL of the request that
    /// returned them.
    async fn fetch_ingress(
        &self,
        origin: &Url,
        location: &str,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Vec<Ingress>, GatewayError> {
        let operation = Operation::Ingress;
        let url = origin
            .join(location)
            .map_err(|e| Self::invalid_url(operation, location, e))?;
        let token = self.location_token(origin, &url, endpoint.token());

        let request = self.request(Method::GET, url.clone(), token);
        let exchange = self
            .execute(operation, request, &url, cancel)
            .await?
            .into_exchange();

        Self::decode_ingress(operation, &url, &exchange.body)
    }
}

#[async_trait]
impl ServiceGateway for HttpServiceGateway {
    async fn list(
        &self,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Vec<Service>, GatewayError> {
        let services = self.list_stream(endpoint, cancel).await?.collect_all().await?;
        tracing::debug!("listed {} services", services.len());
        Ok(services)
    }

    async fn get(
        &self,
        name: &str,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Option<Service>, GatewayError> {
        let operation = Operation::Get;
        let url = self.service_url(operation, endpoint.base_url(), name)?;
        let request = self.request(Method::GET, url.clone(), Some(endpoint.token()));

        let exchange = match self.execute(operation, request, &url, cancel).await? {
            Outcome::Success(exchange) => exchange,
            Outcome::Absent(_) => return Ok(None),
        };

        let mut service: Service = Self::decode(operation, &url, &exchange.body)?;
        if let Some(location) = &exchange.location {
            service.ingress = self.fetch_ingress(&url, location, endpoint, cancel).await?;
        }
        Ok(Some(service))
    }

    async fn sync(
        &self,
        service: &Service,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Vec<Ingress>, GatewayError> {
        let operation = Operation::Sync;
        let url = self.service_url(operation, endpoint.base_url(), service.name())?;
        let body = serde_json::to_vec(service).map_err(|source| GatewayError::Encode {
            operation,
            url: url.to_string(),
            source,
        })?;
        let request = self
            .request(Method::PUT, url.clone(), Some(endpoint.token()))
            .body(body);

        let exchange = self
            .execute(operation, request, &url, cancel)
            .await?
            .into_exchange();
        tracing::info!(
            "service synced, name={} type={} status={}",
            service.name(),
            service.kind(),
            exchange.status
        );

        match &exchange.location {
            Some(location) => self.fetch_ingress(&url, location, endpoint, cancel).await,
            None => Self::decode_ingress(operation, &url, &exchange.body),
        }
    }

    async fn delete(
        &self,
        name: &str,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        let operation = Operation::Delete;
        let url = self.service_url(operation, endpoint.base_url(), name)?;
        let request = self.request(Method::DELETE, url.clone(), Some(endpoint.token()));

        self.execute(operation, request, &url, cancel).await?;
        tracing::info!("service deleted, name={}", name);
        Ok(())
    }
}

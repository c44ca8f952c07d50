use std::fmt;

use futures::future::BoxFuture;
use headers::{Authorization, HeaderMapExt};
use http::{HeaderMap, Request, header::HeaderValue};
use hyper::{
    body::{Body, HttpBody},
    client::{Client, HttpConnector},
};
use hyper_openssl::HttpsConnector;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::{Instrument, Span};

use crate::{
    internal_events::{AboutToSendHttpRequest, GotHttpError, GotHttpResponse},
    tls::{TlsError, TlsSettings, tls_connector_builder},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HttpError {
    #[snafu(display("Failed to build TLS connector: {}", source))]
    BuildTlsConnector { source: TlsError },
    #[snafu(display("Failed to build HTTPS connector: {}", source))]
    MakeHttpsConnector { source: openssl::error::ErrorStack },
    #[snafu(display("Invalid user agent {:?}: {}", user_agent, source))]
    InvalidUserAgent {
        user_agent: String,
        source: http::header::InvalidHeaderValue,
    },
    #[snafu(display("Failed to build HTTP request: {}", source))]
    BuildRequest { source: http::Error },
    #[snafu(display("Failed to make HTTP(S) request: {}", source))]
    CallRequest { source: hyper::Error },
}

pub struct HttpClient<B = Body> {
    client: Client<HttpsConnector<HttpConnector>, B>,
    span: Span,
    user_agent: HeaderValue,
}

impl<B> HttpClient<B>
where
    B: fmt::Debug + HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<crate::Error>,
{
    pub fn new(tls_settings: &TlsSettings) -> Result<HttpClient<B>, HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let tls = tls_connector_builder(tls_settings).context(BuildTlsConnectorSnafu)?;
        let mut https = HttpsConnector::with_connector(http, tls).context(MakeHttpsConnectorSnafu)?;

        let settings = tls_settings.clone();
        https.set_callback(move |c, _uri| {
            settings.apply_connect_configuration(c);
            Ok(())
        });

        let client = Client::builder().build(https);

        let user_agent = format!("{}/{}", crate::get_app_name(), crate::get_version());
        let user_agent = HeaderValue::from_str(&user_agent)
            .with_context(|_| InvalidUserAgentSnafu { user_agent })?;

        let span = tracing::info_span!("http");

        Ok(HttpClient {
            client,
            span,
            user_agent,
        })
    }

    pub fn send(
        &self,
        mut request: Request<B>,
    ) -> BoxFuture<'static, Result<http::Response<Body>, HttpError>> {
        let _enter = self.span.enter();

        default_request_headers(&mut request, &self.user_agent);

        emit!(AboutToSendHttpRequest { request: &request });

        let response = self.client.request(request);

        let fut = async move {
            // The request is not sent until the future is polled.
            let before = std::time::Instant::now();
            let response_result = response.await;
            let roundtrip = before.elapsed();

            let response = response_result
                .inspect_err(|error| {
                    emit!(GotHttpError { error, roundtrip });
                })
                .context(CallRequestSnafu)?;

            emit!(GotHttpResponse {
                response: &response,
                roundtrip
            });
            Ok(response)
        }
        .instrument(self.span.clone());

        Box::pin(fut)
    }
}

fn default_request_headers<B>(request: &mut Request<B>, user_agent: &HeaderValue) {
    if !request.headers().contains_key("User-Agent") {
        request
            .headers_mut()
            .insert("User-Agent", user_agent.clone());
    }

    if !request.headers().contains_key("Accept-Encoding") {
        // Compressed responses are not decoded.
        request
            .headers_mut()
            .insert("Accept-Encoding", HeaderValue::from_static("identity"));
    }
}

impl<B> Clone for HttpClient<B> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            span: self.span.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<B> fmt::Debug for HttpClient<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &self.client)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Credentials attached to every request sent to a source.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "strategy")]
pub enum Auth {
    Basic { user: String, password: String },
    Bearer { token: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"**REDACTED**")
                .finish(),
            Auth::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"**REDACTED**")
                .finish(),
        }
    }
}

impl Auth {
    pub fn apply<B>(&self, req: &mut Request<B>) {
        self.apply_headers_map(req.headers_mut())
    }

    pub fn apply_headers_map(&self, map: &mut HeaderMap) {
        match &self {
            Auth::Basic { user, password } => {
                let auth = Authorization::basic(user, password);
                map.typed_insert(auth);
            }
            Auth::Bearer { token } => match Authorization::bearer(token) {
                Ok(auth) => map.typed_insert(auth),
                Err(error) => error!(message = "Invalid bearer token.", %error),
            },
        }
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::SecondsFormat;
use http::{Request, StatusCode};
use hyper::Body;
use snafu::{ResultExt, ensure};
use url::Url;

use super::api::{MATRIX, QueryResponse, ResponseStatus};
use crate::{
    event::{Matrix, TimeRange},
    http::{Auth, BuildRequestSnafu, HttpClient, HttpError},
    internal_events::{PrometheusHealthcheckError, PrometheusRangeQueryCompleted, PrometheusRangeQueryError},
    sources::{
        ApiSnafu, DecodeSnafu, EmptyQuerySnafu, HttpStatusSnafu, QueryError, ReadBodySnafu,
        RequestSnafu, SourceClient, UnauthorizedSnafu, UnexpectedResultTypeSnafu,
    },
};

const QUERY_RANGE_PATH: [&str; 3] = ["api", "v1", "query_range"];
const HEALTHY_PATH: [&str; 2] = ["-", "healthy"];

/// Issues `query_range` requests with a per-call timeout.
#[derive(Clone, Debug)]
pub struct PrometheusClient {
    client: HttpClient,
    endpoint: Url,
    auth: Option<Auth>,
    timeout: Duration,
}

impl PrometheusClient {
    /// `endpoint` must be an http(s) URL that can be a base.
    pub fn new(client: HttpClient, endpoint: Url, auth: Option<Auth>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            auth,
            timeout,
        }
    }

    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn query_range_url(&self, query: &str, range: &TimeRange) -> Url {
        let mut url = self.url_for(&QUERY_RANGE_PATH);
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("start", &range.start().to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("end", &range.end().to_rfc3339_opts(SecondsFormat::Millis, true))
            .append_pair("step", &range.step().as_secs_f64().to_string());
        url
    }

    fn get(&self, url: &Url) -> Result<Request<Body>, HttpError> {
        let mut request = Request::get(url.as_str())
            .header("Accept", "application/json")
            .body(Body::empty())
            .context(BuildRequestSnafu)?;
        if let Some(auth) = &self.auth {
            auth.apply(&mut request);
        }
        Ok(request)
    }

    async fn check_health(&self) -> crate::Result<()> {
        let request = self.get(&self.url_for(&HEALTHY_PATH))?;
        let response = tokio::time::timeout(self.timeout, self.client.send(request))
            .await
            .map_err(|_| format!("Timed out after {:?}.", self.timeout))??;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("Unexpected status: {status}.").into())
        }
    }

    async fn fetch(&self, query: &str, range: &TimeRange) -> Result<Matrix, QueryError> {
        ensure!(!query.trim().is_empty(), EmptyQuerySnafu { query });

        let url = self.query_range_url(query, range);
        let request = self.get(&url).context(RequestSnafu { query })?;
        let response = self
            .client
            .send(request)
            .await
            .context(RequestSnafu { query })?;

        let (parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .context(ReadBodySnafu { query })?;

        if matches!(parts.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return UnauthorizedSnafu {
                query,
                status: parts.status,
            }
            .fail();
        }

        // Prometheus reports query errors with a JSON body on 4xx and 5xx.
        let response: QueryResponse = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(_) if !parts.status.is_success() => {
                return HttpStatusSnafu {
                    query,
                    status: parts.status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                }
                .fail();
            }
            Err(error) => return Err(error).context(DecodeSnafu { query }),
        };

        if response.status == ResponseStatus::Error || !parts.status.is_success() {
            return ApiSnafu {
                query,
                error_type: response.error_type.unwrap_or_else(|| parts.status.to_string()),
                error: response.error.unwrap_or_default(),
            }
            .fail();
        }

        let Some(data) = response.data else {
            return Ok(Matrix::default());
        };
        ensure!(
            data.result_type == MATRIX,
            UnexpectedResultTypeSnafu {
                query,
                result_type: data.result_type,
            }
        );
        serde_json::from_value(data.result).context(DecodeSnafu { query })
    }
}

#[async_trait]
impl SourceClient for PrometheusClient {
    async fn query_range(&self, query: &str, range: &TimeRange) -> Result<Matrix, QueryError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.fetch(query, range)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::TimedOut {
                query: query.to_owned(),
                timeout: self.timeout,
            }),
        };

        match &result {
            Ok(matrix) => emit!(PrometheusRangeQueryCompleted {
                query,
                series: matrix.series.len(),
                points: matrix.point_count(),
                elapsed: start.elapsed(),
            }),
            Err(error) => emit!(PrometheusRangeQueryError {
                query,
                error,
                error_type: error.error_type(),
            }),
        }
        result
    }

    async fn healthcheck(&self) -> crate::Result<()> {
        let result = self.check_health().await;
        if let Err(error) = &result {
            emit!(PrometheusHealthcheckError {
                endpoint: self.endpoint.as_str(),
                error,
            });
        }
        result
    }
}

//! PostgREST-dialect HTTP backend.
//!
//! Tables live under `{base}/rest/v1/{table}`, filters are query pairs of
//! the form `col=eq.value` (or `gte.`, `lte.`, and an `or=(...ilike...)`
//! group for text search), and stored procedures are `POST`ed to
//! `{base}/rest/v1/rpc/{function}`. Requests carry the anon key as `apikey`
//! and the session's access token (or the anon key) as bearer.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use super::{Filter, Order, Query, RemoteBackend, Row};
use crate::error::{BackendError, ConfigError};
use crate::session::SessionContext;
use crate::storage::BackendConfig;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

pub struct RestBackend {
    client: reqwest::Client,
    base: Url,
    anon_key: String,
    session: SessionContext,
}

/// Error body PostgREST sends with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl RestBackend {
    pub fn new(
        base_url: &str,
        anon_key: impl Into<String>,
        session: SessionContext,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: normalize_base(base_url)?,
            anon_key: anon_key.into(),
            session,
        })
    }

    pub fn from_config(config: &BackendConfig, session: SessionContext) -> Result<Self, ConfigError> {
        if !config.is_configured() {
            return Err(ConfigError::BackendNotConfigured);
        }
        Self::new(&config.url, config.anon_key.clone(), session)
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|e| BackendError::new(format!("invalid endpoint {path}: {e}")))
    }

    fn table_url(&self, table: &str, query: &Query) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(columns) = &query.columns {
                pairs.append_pair("select", columns);
            }
            for filter in &query.filters {
                match filter {
                    Filter::Eq(column, value) => {
                        pairs.append_pair(column, &format!("eq.{value}"));
                    }
                    Filter::Gte(column, bound) => {
                        pairs.append_pair(column, &format!("gte.{bound}"));
                    }
                    Filter::Lte(column, bound) => {
                        pairs.append_pair(column, &format!("lte.{bound}"));
                    }
                    Filter::Search(columns, needle) => {
                        pairs.append_pair("or", &search_group(columns, needle));
                    }
                }
            }
            if let Some((column, order)) = &query.order {
                let dir = match order {
                    Order::Asc => "asc",
                    Order::Desc => "desc",
                };
                pairs.append_pair("order", &format!("{column}.{dir}"));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    async fn rows(&self, builder: RequestBuilder) -> Result<Vec<Row>, BackendError> {
        let response = check(builder.send().await?).await?;
        match response.json::<Row>().await? {
            Row::Array(rows) => Ok(rows),
            Row::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn first_row(&self, builder: RequestBuilder) -> Result<Row, BackendError> {
        self.rows(builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(BackendError::no_rows)
    }
}

/// `(a.ilike."%x%",b.ilike."%x%")` with the needle quoted so commas and
/// parentheses in it stay literal.
fn search_group(columns: &[String], needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('"', "\\\"");
    let parts: Vec<String> = columns
        .iter()
        .map(|column| format!("{column}.ilike.\"%{escaped}%\""))
        .collect();
    format!("({})", parts.join(","))
}

fn normalize_base(base_url: &str) -> Result<Url, ConfigError> {
    let trimmed = base_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|e| ConfigError::InvalidValue {
        key: "backend.url".into(),
        message: e.to_string(),
    })
}

/// Pass successful responses through; turn error bodies into [`BackendError`].
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
    let (code, message) = match body {
        Some(body) => (body.code, body.message.or(body.msg)),
        None => (None, None),
    };
    let message = message.unwrap_or_else(|| format!("HTTP {status}"));
    Err(match code {
        Some(code) => BackendError::with_code(code, message),
        None => BackendError::new(message),
    })
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        let url = self.table_url(table, query)?;
        self.rows(self.request(Method::GET, url)).await
    }

    async fn select_single(&self, table: &str, query: &Query) -> Result<Row, BackendError> {
        let url = self.table_url(table, query)?;
        let response = check(
            self.request(Method::GET, url)
                .header("Accept", SINGLE_OBJECT)
                .send()
                .await?,
        )
        .await?;
        Ok(response.json::<Row>().await?)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        let url = self.table_url(table, &Query::new())?;
        self.first_row(
            self.request(Method::POST, url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&row),
        )
        .await
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        query: &Query,
    ) -> Result<Vec<Row>, BackendError> {
        let url = self.table_url(table, query)?;
        self.rows(
            self.request(Method::PATCH, url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&patch),
        )
        .await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        let url = self.table_url(table, query)?;
        self.rows(
            self.request(Method::DELETE, url)
                .header("Prefer", RETURN_REPRESENTATION),
        )
        .await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, BackendError> {
        let mut url = self.table_url(table, &Query::new())?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        self.first_row(
            self.request(Method::POST, url)
                .header("Prefer", format!("resolution=merge-duplicates,{RETURN_REPRESENTATION}"))
                .json(&row),
        )
        .await
    }

    async fn rpc(&self, function: &str, args: Row) -> Result<Row, BackendError> {
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        let response = check(self.request(Method::POST, url).json(&args).send().await?).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Row::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| BackendError::new(format!("invalid rpc response: {e}")))
    }
}

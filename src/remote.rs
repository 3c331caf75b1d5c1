//! Client for the JSON API, used by `container-control remote ...`.

use crate::model::{Action, ContainerId, GroupId};
use anyhow::{Context, Result};
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, username: String, api_key: String) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid base url {base_url}"))?;
        let http = reqwest::Client::builder()
            .user_agent(format!("container-control/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            username,
            api_key,
        })
    }

    fn url(&self, path: &str, extra: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid api path {path}"))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("username", &self.username)
                .append_pair("api_key", &self.api_key);
            for (k, v) in extra {
                q.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn decode(resp: reqwest::Response) -> Result<(StatusCode, Value)> {
        let status = resp.status();
        let body: Value = resp.json().await.context("response was not JSON")?;
        if !status.is_success() {
            let msg = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            anyhow::bail!("{status}: {msg}");
        }
        Ok((status, body))
    }

    pub async fn control(&self, container_id: ContainerId, action: Action) -> Result<Value> {
        let url = self.base_url.join("/api/control").context("invalid api path")?;
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "username": self.username,
                "api_key": self.api_key,
                "container_id": container_id,
                "action": action,
            }))
            .send()
            .await
            .context("control request failed")?;
        Ok(Self::decode(resp).await?.1)
    }

    pub async fn status(&self, container_id: ContainerId) -> Result<Value> {
        let url = self.url("/api/status", &[("container_id", container_id.to_string())])?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("status request failed")?;
        Ok(Self::decode(resp).await?.1)
    }

    /// Control a group. With `wait == false` the server answers 202 with a job id.
    pub async fn control_group(&self, group_id: GroupId, action: Action, wait: bool) -> Result<Value> {
        let url = self
            .base_url
            .join("/api/control_group")
            .context("invalid api path")?;
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "username": self.username,
                "api_key": self.api_key,
                "group_id": group_id,
                "action": action,
                "wait": wait,
            }))
            .send()
            .await
            .context("group control request failed")?;
        Ok(Self::decode(resp).await?.1)
    }

    pub async fn group_status(&self, group_id: GroupId) -> Result<Value> {
        let url = self.url("/api/group_status", &[("group_id", group_id.to_string())])?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("group status request failed")?;
        Ok(Self::decode(resp).await?.1)
    }

    pub async fn job(&self, job_id: &str) -> Result<Value> {
        let url = self.url(&format!("/api/jobs/{job_id}"), &[])?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("job request failed")?;
        Ok(Self::decode(resp).await?.1)
    }

    /// Poll a job until it reports `finished`.
    pub async fn wait_for_job(&self, job_id: &str, every: Duration) -> Result<Value> {
        loop {
            let snapshot = self.job(job_id).await?;
            if snapshot.get("state").and_then(|s| s.as_str()) == Some("finished") {
                return Ok(snapshot);
            }
            tracing::debug!(job_id, progress = %snapshot, "Job still running");
            tokio::time::sleep(every).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_credentials_and_params() {
        let client = ApiClient::new("http://127.0.0.1:5000", "alice".into(), "k y".into()).unwrap();
        let url = client
            .url("/api/status", &[("container_id", "7".into())])
            .unwrap();
        assert_eq!(url.path(), "/api/status");
        assert_eq!(
            url.query(),
            Some("username=alice&api_key=k+y&container_id=7")
        );
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(ApiClient::new("not a url", "a".into(), "b".into()).is_err());
    }
}

use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::gcp::gce::compute::Compute;
use crate::gcp::gce::types::*;
use crate::gcp::get_access_token;
use crate::gcp::types::TokenSource;

const GCE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Compute Engine REST client.
#[derive(Debug, Clone)]
pub struct GceClient {
    base_url: String,
    tokens: TokenSource,
}

impl GceClient {
    pub fn new(tokens: TokenSource) -> Self {
        Self::with_base_url(GCE_API_BASE, tokens)
    }

    pub fn with_base_url(base_url: &str, tokens: TokenSource) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn aggregated_list_url(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.url(&format!("projects/{}/aggregated/instances", project)))
            .map_err(|e| Error::InvalidConfig(format!("bad API base URL: {}", e)))?;
        if !filter.is_empty() || page_token.is_some() {
            let mut qp = url.query_pairs_mut();
            if !filter.is_empty() {
                qp.append_pair("filter", filter);
            }
            if let Some(t) = page_token {
                qp.append_pair("pageToken", t);
            }
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let request = crate::client::CLIENT.get(&url);
        self.send(Method::GET, url, request).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: String, body: &B) -> Result<T> {
        let request = crate::client::CLIENT.post(&url).json(body);
        self.send(Method::POST, url, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        request: RequestBuilder,
    ) -> Result<T> {
        let token = get_access_token(&self.tokens)
            .await
            .map_err(Error::Auth)?;
        let res = request
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await?;
            return Err(Error::Api {
                method: method.to_string(),
                url,
                status,
                body,
            });
        }

        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Compute for GceClient {
    async fn get_instance(&self, project: &str, zone: &str, instance: &str) -> Result<Instance> {
        self.get(self.url(&format!(
            "projects/{}/zones/{}/instances/{}",
            project, zone, instance
        )))
        .await
    }

    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
    ) -> Result<Operation> {
        self.post(
            self.url(&format!(
                "projects/{}/zones/{}/instances/{}/stop",
                project, zone, instance
            )),
            &serde_json::json!({}),
        )
        .await
    }

    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> Result<Operation> {
        self.post(
            self.url(&format!("projects/{}/zones/{}/instances", project, zone)),
            request,
        )
        .await
    }

    async fn attach_disk(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        request: &AttachDiskRequest,
    ) -> Result<Operation> {
        self.post(
            self.url(&format!(
                "projects/{}/zones/{}/instances/{}/attachDisk",
                project, zone, instance
            )),
            request,
        )
        .await
    }

    async fn list_instances_page(
        &self,
        project: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<InstanceAggregatedList> {
        let url = self.aggregated_list_url(project, filter, page_token)?;
        self.get(url.to_string()).await
    }

    async fn insert_snapshot(
        &self,
        project: &str,
        request: &SnapshotRequest,
    ) -> Result<Operation> {
        self.post(
            self.url(&format!("projects/{}/global/snapshots", project)),
            request,
        )
        .await
    }

    async fn insert_image(&self, project: &str, request: &ImageRequest) -> Result<Operation> {
        self.post(
            self.url(&format!("projects/{}/global/images", project)),
            request,
        )
        .await
    }

    async fn set_image_iam_policy(
        &self,
        project: &str,
        image: &str,
        request: &SetPolicyRequest,
    ) -> Result<Policy> {
        self.post(
            self.url(&format!(
                "projects/{}/global/images/{}/setIamPolicy",
                project, image
            )),
            request,
        )
        .await
    }

    async fn insert_disk(
        &self,
        project: &str,
        zone: &str,
        request: &DiskRequest,
    ) -> Result<Operation> {
        self.post(
            self.url(&format!("projects/{}/zones/{}/disks", project, zone)),
            request,
        )
        .await
    }

    async fn get_zone_operation(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Operation> {
        self.get(self.url(&format!(
            "projects/{}/zones/{}/operations/{}",
            project, zone, name
        )))
        .await
    }

    async fn get_region_operation(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Operation> {
        self.get(self.url(&format!(
            "projects/{}/regions/{}/operations/{}",
            project, region, name
        )))
        .await
    }

    async fn get_global_operation(&self, project: &str, name: &str) -> Result<Operation> {
        self.get(self.url(&format!("projects/{}/global/operations/{}", project, name)))
            .await
    }
}

//! REST implementation of [`IRemoteStore`]
//!
//! Endpoints (relative to the configured base URL):
//!
//! | Operation          | Request                                  |
//! |--------------------|------------------------------------------|
//! | server versions    | `GET  /v1/sync/versions`                 |
//! | pull               | `GET  /v1/tables/{table}?since={n}`      |
//! | push               | `POST /v1/tables/{table}/mutations`      |
//! | resolve identity   | `GET  /v1/identities?email={email}`      |
//!
//! Requests made on behalf of an identity carry its id in the
//! `X-Identity-Id` header; the server scopes rows by it.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use finos_core::domain::{Email, Identity, PendingMutation, TableName};
use finos_core::ports::{IRemoteStore, PullBatch, PushOutcome};

use crate::client::{parse_json, RestClient};

const IDENTITY_HEADER: &str = "X-Identity-Id";

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    #[serde(default)]
    versions: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    mutations: &'a [PendingMutation],
}

/// `IRemoteStore` backed by the FinOS REST API
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: RestClient,
}

impl RestRemoteStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }

    fn scoped(&self, method: Method, path: &str, identity: &Identity) -> RequestBuilder {
        self.client
            .request(method, path)
            .header(IDENTITY_HEADER, identity.id().to_string())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for RestRemoteStore {
    #[tracing::instrument(skip(self, identity), fields(identity = %identity.email()))]
    async fn server_versions(&self, identity: &Identity) -> Result<BTreeMap<TableName, u64>> {
        let path = "/v1/sync/versions";
        let response = self
            .client
            .execute(path, || self.scoped(Method::GET, path, identity))
            .await?;
        let body: VersionsResponse = parse_json(path, response).await?;

        let mut versions = BTreeMap::new();
        for (name, version) in body.versions {
            match TableName::new(name.clone()) {
                Ok(table) => {
                    versions.insert(table, version);
                }
                Err(e) => warn!(table = %name, error = %e, "Ignoring invalid table name from server"),
            }
        }
        debug!(tables = versions.len(), "Fetched server versions");
        Ok(versions)
    }

    #[tracing::instrument(skip(self, identity), fields(identity = %identity.email(), table = %table))]
    async fn pull(&self, identity: &Identity, table: &TableName, since: u64) -> Result<PullBatch> {
        let path = format!("/v1/tables/{}", table.as_str());
        let since = since.to_string();
        let response = self
            .client
            .execute(&path, || {
                self.scoped(Method::GET, &path, identity)
                    .query(&[("since", since.as_str())])
            })
            .await?;
        let batch: PullBatch = parse_json(&path, response).await?;
        debug!(
            records = batch.records.len(),
            server_version = batch.server_version,
            "Pulled table"
        );
        Ok(batch)
    }

    #[tracing::instrument(skip(self, identity, mutations), fields(identity = %identity.email(), table = %table, count = mutations.len()))]
    async fn push(
        &self,
        identity: &Identity,
        table: &TableName,
        mutations: &[PendingMutation],
    ) -> Result<PushOutcome> {
        let path = format!("/v1/tables/{}/mutations", table.as_str());
        let body = PushRequest { mutations };
        let response = self
            .client
            .execute(&path, || {
                self.scoped(Method::POST, &path, identity).json(&body)
            })
            .await?;
        let outcome: PushOutcome = parse_json(&path, response).await?;
        if !outcome.rejected.is_empty() {
            warn!(
                rejected = outcome.rejected.len(),
                "Server rejected some mutations"
            );
        }
        Ok(outcome)
    }

    #[tracing::instrument(skip(self), fields(email = %email))]
    async fn resolve_identity(&self, email: &Email) -> Result<Identity> {
        self.client
            .get_json("/v1/identities", &[("email", email.as_str().to_string())])
            .await
            .with_context(|| format!("Failed to resolve identity for {email}"))
    }
}

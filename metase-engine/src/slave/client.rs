//! Orchestrator side of the fetch RPC.

use serde::de::DeserializeOwned;

use super::{fetch_path, FetchEnvelope};
use crate::error::{EngineError, Result};
use crate::router::SlaveNode;
use crate::signing::{unix_now, Signer};
use crate::types::{FetchDescriptor, RawResult, RequestKind};

/// Calls slave fetch endpoints with signed requests.
#[derive(Debug, Clone)]
pub struct SlaveClient {
    client: reqwest::Client,
    signer: Signer,
    api_version: u32,
}

impl SlaveClient {
    /// Create a client that signs with `signer` and targets `api_version`.
    pub fn new(client: reqwest::Client, signer: Signer, api_version: u32) -> Self {
        Self {
            client,
            signer,
            api_version,
        }
    }

    /// Ask `slave` to fetch one result page of `source` and extract it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rpc`] if the slave is unreachable or answers
    /// with a failure status.
    pub async fn fetch_page(
        &self,
        slave: &SlaveNode,
        source: &str,
        descriptor: &FetchDescriptor,
    ) -> Result<Vec<RawResult>> {
        self.call(slave, source, RequestKind::Page, descriptor).await
    }

    /// Ask `slave` to resolve an indirection link of `source`.
    ///
    /// `Ok(None)` means the slave fetched the link but found no redirect.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rpc`] if the slave is unreachable or answers
    /// with a failure status.
    pub async fn resolve_url(
        &self,
        slave: &SlaveNode,
        source: &str,
        descriptor: &FetchDescriptor,
    ) -> Result<Option<String>> {
        self.call(slave, source, RequestKind::Url, descriptor).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        slave: &SlaveNode,
        source: &str,
        kind: RequestKind,
        descriptor: &FetchDescriptor,
    ) -> Result<T> {
        let body = serde_json::to_vec(descriptor)
            .map_err(|e| EngineError::Rpc(format!("cannot encode descriptor: {e}")))?;
        let params = self.signer.sign_now(&body, source, kind, unix_now())?;
        let endpoint = format!("http://{}{}", slave.address, fetch_path(self.api_version));

        tracing::trace!(slave = %slave.address, source, rtype = %kind, url = %descriptor.url, "fetch rpc");
        let response = self
            .client
            .post(&endpoint)
            .query(&[
                ("name", params.name.as_str()),
                ("rtype", params.rtype.as_str()),
                ("timestamp", params.timestamp.as_str()),
                ("nonce", params.nonce.as_str()),
                ("signature", params.signature.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| EngineError::Rpc(format!("{}: {e}", slave.address)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Rpc(format!(
                "{} answered {} for {source}/{kind}",
                slave.address,
                status.as_u16()
            )));
        }

        let envelope: FetchEnvelope<T> = response
            .json()
            .await
            .map_err(|e| EngineError::Rpc(format!("{}: bad reply: {e}", slave.address)))?;
        Ok(envelope.data)
    }
}

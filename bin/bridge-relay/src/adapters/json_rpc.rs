//! JSON-RPC 2.0 client for the bridge contract of the foreign chain.

use bridge_relay::ports::{
    ActionProofSubmission,
    Destination,
    ForeignChain,
    ScheduleChangeSubmission,
    SubmissionResult,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};

pub const CHANGE_SCHEDULE_METHOD: &str = "bridge_changeSchedule";
pub const PROVE_ACTION_METHOD: &str = "bridge_proveAction";

#[derive(Debug, Serialize)]
struct Request<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Params<'a, P>,
}

#[derive(Debug, Serialize)]
struct Params<'a, P> {
    account: &'a str,
    submission: P,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: i64,
    message: String,
}

pub struct JsonRpcForeignChain {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcForeignChain {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P>(
        &self,
        destination: &Destination,
        method: &'static str,
        submission: P,
    ) -> anyhow::Result<SubmissionResult>
    where
        P: Serialize + Send,
    {
        let url = url::Url::parse(&destination.endpoint)?;
        let request = Request {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params: Params {
                account: &destination.account,
                submission,
            },
        };

        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(SubmissionResult::rejected(format!(
                "{method} answered with HTTP status {status}"
            )))
        }

        let response = response.json::<Response>().await?;
        match response {
            Response {
                error: Some(error), ..
            } => Ok(SubmissionResult::rejected(format!(
                "{} (code {})",
                error.message, error.code
            ))),
            Response {
                result: Some(result),
                ..
            } => Ok(SubmissionResult::accepted(result_text(result))),
            Response {
                result: None,
                error: None,
            } => Err(anyhow::anyhow!(
                "{method} response carries neither a result nor an error"
            )),
        }
    }
}

/// A bare string result is the transaction hash; any other result is kept as
/// compact JSON.
fn result_text(result: serde_json::Value) -> String {
    match result {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl ForeignChain for JsonRpcForeignChain {
    async fn submit_schedule_change(
        &self,
        destination: &Destination,
        submission: ScheduleChangeSubmission,
    ) -> anyhow::Result<SubmissionResult> {
        self.call(destination, CHANGE_SCHEDULE_METHOD, submission)
            .await
    }

    async fn submit_action_proof(
        &self,
        destination: &Destination,
        submission: ActionProofSubmission,
    ) -> anyhow::Result<SubmissionResult> {
        self.call(destination, PROVE_ACTION_METHOD, submission)
            .await
    }
}

// Long-poll loops for group updates (member side) and inputs (host side).
//
// A loop is strictly sequential: poll N+1 is only issued once the caller
// asks for the next batch, so two polls of one loop never overlap and the
// caller's processing time never loses an in-flight result. On any error
// the loop delivers it once and finishes; restarting means creating a new
// loop from the last good marker. A `PollStop` handle cancels
// deterministically, even while a request is in flight.

use std::marker::PhantomData;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::client::Knecht;
use crate::error::KnechtError;
use crate::groups::Permission;

/// One host-originated change visible to a polling member.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntry {
    /// Group data field the change applies to.
    pub field: String,
    /// New value, when the change is a write.
    #[serde(default)]
    pub value: Option<Value>,
    /// Grant, when the change is a permission change.
    #[serde(default)]
    pub permission: Option<Permission>,
}

/// Updates delivered to a polling member, filtered server-side to fields
/// the member is allowed to see.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBatch {
    pub updates: Vec<UpdateEntry>,
    /// Marker the next poll resumes from.
    pub marker: u64,
}

/// One member-submitted input delivered to the polling host.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberInput {
    pub member: String,
    pub input: Value,
}

/// Inputs delivered to a polling host.
#[derive(Debug, Clone, Deserialize)]
pub struct InputBatch {
    pub inputs: Vec<MemberInput>,
    /// Marker the next poll resumes from.
    pub marker: u64,
}

/// A batch type a poll loop can fetch.
pub trait PollBatch: DeserializeOwned {
    /// Request path the loop polls.
    const PATH: &'static str;
    /// Marker the next poll should resume from.
    fn marker(&self) -> u64;
}

impl PollBatch for UpdateBatch {
    const PATH: &'static str = "/groups/updates";
    fn marker(&self) -> u64 {
        self.marker
    }
}

impl PollBatch for InputBatch {
    const PATH: &'static str = "/groups/input";
    fn marker(&self) -> u64 {
        self.marker
    }
}

/// Handle for stopping a poll loop from outside, cloneable and usable
/// from another task.
#[derive(Debug, Clone)]
pub struct PollStop {
    tx: watch::Sender<bool>,
}

impl PollStop {
    /// Signal the loop to finish. An in-flight poll is abandoned; the
    /// loop's next `next()` call returns `None`.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// A sequential long-poll loop, produced by [`Knecht::updates`] and
/// [`Knecht::inputs`].
#[derive(Debug)]
pub struct PollLoop<B> {
    client: Knecht,
    group: String,
    marker: u64,
    id: Uuid,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    finished: bool,
    _batch: PhantomData<B>,
}

/// Member-side loop over host-originated updates.
pub type UpdatePoll = PollLoop<UpdateBatch>;
/// Host-side loop over member-submitted inputs.
pub type InputPoll = PollLoop<InputBatch>;

impl<B: PollBatch> PollLoop<B> {
    fn new(client: Knecht, group: String, marker: u64) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let id = Uuid::new_v4();
        tracing::debug!("poll loop {id} for group {group} starting at marker {marker}");
        PollLoop {
            client,
            group,
            marker,
            id,
            stop_tx,
            stop_rx,
            finished: false,
            _batch: PhantomData,
        }
    }

    /// Marker the next poll will use.
    pub fn marker(&self) -> u64 {
        self.marker
    }

    /// Whether the loop has delivered an error or been stopped. A
    /// finished loop only ever returns `None`.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle for stopping this loop.
    pub fn stop_handle(&self) -> PollStop {
        PollStop {
            tx: self.stop_tx.clone(),
        }
    }

    /// Fetch the next batch. `Some(Ok(..))` carries the batch and advances
    /// the marker; `Some(Err(..))` is delivered exactly once, after which
    /// the loop is finished. Stop signals yield `None` immediately.
    ///
    /// The poll goes through the relogin wrapper, so an expired session is
    /// refreshed transparently without breaking the loop.
    pub async fn next(&mut self) -> Option<Result<B, KnechtError>> {
        if self.finished || *self.stop_rx.borrow() {
            self.finished = true;
            return None;
        }

        let group = self.group.clone();
        let marker = self.marker.to_string();
        let client = &self.client;
        let poll = client.with_relogin(|auth| {
            let group = group.as_str();
            let marker = marker.as_str();
            async move {
                let resp = client
                    .request_auth(
                        &auth,
                        Method::GET,
                        B::PATH,
                        &[("group_name", group), ("marker", marker)],
                        None,
                    )
                    .await;
                let resp = Knecht::check(resp)?;
                serde_json::from_value::<B>(resp.body)
                    .map_err(|e| KnechtError::Server(format!("malformed poll response: {e}")))
            }
        });
        let mut stop_rx = self.stop_rx.clone();

        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => {
                tracing::debug!("poll loop {} stopped", self.id);
                self.finished = true;
                None
            }
            result = poll => match result {
                Ok(batch) => {
                    self.marker = batch.marker();
                    Some(Ok(batch))
                }
                Err(e) => {
                    tracing::warn!("poll loop {} finished: {e}", self.id);
                    self.finished = true;
                    Some(Err(e))
                }
            }
        }
    }

    /// Adapt the loop into a stream that ends when the loop finishes.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<B, KnechtError>> {
        futures::stream::unfold(self, |mut poll| async move {
            poll.next().await.map(|item| (item, poll))
        })
    }
}

impl Knecht {
    /// Start polling host-originated updates for `group` (member side).
    /// `from_marker` is 0 for a fresh start, or the last delivered marker
    /// when resuming.
    pub fn updates(&self, group: &str, from_marker: u64) -> UpdatePoll {
        PollLoop::new(self.clone(), group.to_string(), from_marker)
    }

    /// Start polling member-submitted inputs for `group` (host side).
    pub fn inputs(&self, group: &str, from_marker: u64) -> InputPoll {
        PollLoop::new(self.clone(), group.to_string(), from_marker)
    }
}

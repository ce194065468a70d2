use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::quality::Ranking;
use crate::service::Track;

/// A replacement decision the reconciler needs made for one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceRequest {
    /// Position of the track in the playlist, starting at 0
    pub position: usize,
    pub current: Track,
    /// All alternatives, best first; at least one is a strict upgrade
    pub ranking: Ranking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Leave the current track in place
    Keep,
    /// Replace with `ranking.candidates[index]`
    Replace(usize),
}

/// Decides which alternative (if any) replaces a track.
///
/// Implementations may answer immediately or wait for a human.
#[async_trait]
pub trait Chooser: Send {
    async fn choose(&mut self, request: &ChoiceRequest) -> Result<Choice>;
}

/// Always takes the best strict upgrade
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticChooser;

#[async_trait]
impl Chooser for AutomaticChooser {
    async fn choose(&mut self, request: &ChoiceRequest) -> Result<Choice> {
        Ok(match request.ranking.best_upgrade() {
            Some(_) => Choice::Replace(0),
            None => Choice::Keep,
        })
    }
}

/// A request waiting for an answer from the other end of a [`ChannelChooser`]
#[derive(Debug)]
pub struct PendingChoice {
    pub request: ChoiceRequest,
    reply: oneshot::Sender<Choice>,
}

impl PendingChoice {
    pub fn respond(self, choice: Choice) {
        if self.reply.send(choice).is_err() {
            tracing::debug!("Choice for track {} was no longer awaited", self.request.position);
        }
    }
}

/// Forwards every request over a channel and waits for the reply
#[derive(Debug, Clone)]
pub struct ChannelChooser {
    requests: mpsc::Sender<PendingChoice>,
}

impl ChannelChooser {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingChoice>) {
        let (requests, rx) = mpsc::channel(buffer);
        (Self { requests }, rx)
    }
}

#[async_trait]
impl Chooser for ChannelChooser {
    async fn choose(&mut self, request: &ChoiceRequest) -> Result<Choice> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PendingChoice {
                request: request.clone(),
                reply,
            })
            .await
            .map_err(|_| Error::Prompt("decision receiver was dropped".to_string()))?;

        response
            .await
            .map_err(|_| Error::Prompt("decision was abandoned".to_string()))
    }
}

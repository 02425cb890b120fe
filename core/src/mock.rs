//! In-memory transports for tests and demonstrations.
//!
//! [`MockCard`] stands in for a reader with a card, [`MockService`] for the remote service.
//! Both record everything they are given so tests can assert on the traffic.

use std::collections::VecDeque;
use std::thread::sleep;
use std::time::Duration;

use crate::card::{CardTransport, Response};
use crate::protocol::Request;
use crate::remote::RemoteService;
use crate::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Card was removed")]
    Removed,

    #[error("Not connected to the card")]
    NotConnected,

    #[error("No reply queued for request #{0}")]
    NoReply(usize),

    #[error("{0}")]
    Injected(String),
}

/// A scripted card reader.
///
/// Responses are handed out in the order they were queued; once the queue is drained every
/// command is answered with an empty payload and `90 00`.
#[derive(Debug)]
pub struct MockCard {
    /// Presence checks that report no card before the card shows up. `None` means never.
    absent_polls: Option<usize>,
    responses: VecDeque<Response>,
    /// Transmits that succeed before the card is pulled out.
    remove_after: Option<usize>,

    pub polls: usize,
    pub connected: bool,
    pub transmitted: Vec<Vec<u8>>,
}

impl MockCard {
    /// A card already lying on the reader.
    pub fn present() -> Self {
        Self::present_after(0)
    }

    /// A card that shows up on the `polls + 1`-th presence check.
    pub fn present_after(polls: usize) -> Self {
        Self {
            absent_polls: Some(polls),
            responses: VecDeque::new(),
            remove_after: None,
            polls: 0,
            connected: false,
            transmitted: Vec::new(),
        }
    }

    /// A reader nobody ever presents a card to.
    pub fn absent() -> Self {
        Self {
            absent_polls: None,
            ..Self::present()
        }
    }

    /// Queues a response.
    pub fn respond(mut self, payload: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        self.responses.push_back(Response::new(payload, sw1, sw2));
        self
    }

    /// Makes every transmit after the first `count` fail as if the card was removed.
    pub fn remove_after(mut self, count: usize) -> Self {
        self.remove_after = Some(count);
        self
    }
}

impl CardTransport for MockCard {
    fn wait_for_card(&mut self, timeout: Duration) -> Result<bool, BoxError> {
        self.polls += 1;

        match self.absent_polls {
            Some(n) if self.polls > n => Ok(true),
            _ => {
                sleep(timeout);
                Ok(false)
            }
        }
    }

    fn connect(&mut self) -> Result<(), BoxError> {
        self.connected = true;
        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> Result<Response, BoxError> {
        if !self.connected {
            return Err(Error::NotConnected.into());
        }

        if matches!(self.remove_after, Some(n) if self.transmitted.len() >= n) {
            return Err(Error::Removed.into());
        }

        self.transmitted.push(command.to_vec());

        Ok(self
            .responses
            .pop_front()
            .unwrap_or_else(|| Response::new(vec![], 0x90, 0x00)))
    }
}

/// A scripted remote service.
///
/// Each request consumes the next queued reply body.
#[derive(Debug, Default)]
pub struct MockService {
    replies: VecDeque<Result<String, String>>,

    pub requests: Vec<Request>,
}

impl MockService {
    pub fn new() -> Self {
        Default::default()
    }

    /// Queues a reply body, returned verbatim.
    pub fn reply(mut self, body: impl Into<String>) -> Self {
        self.replies.push_back(Ok(body.into()));
        self
    }

    /// Queues a transport failure.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.replies.push_back(Err(message.into()));
        self
    }

    /// Number of requests that carried response frames.
    pub fn result_requests(&self) -> usize {
        self.requests.iter().filter(|r| r.rapdu.is_some()).count()
    }
}

impl RemoteService for MockService {
    fn send(&mut self, request: &Request) -> Result<String, BoxError> {
        self.requests.push(request.clone());

        match self.replies.pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(Error::Injected(message).into()),
            None => Err(Error::NoReply(self.requests.len()).into()),
        }
    }
}

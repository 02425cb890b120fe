//! The relay loop: drives the command/response exchange between the service and the card.
//!
//! A run goes through the following states:
//!
//! 1. **Init**: the opening request is sent and the first reply decoded.
//! 2. **AwaitingCard**: a card is waited for and connected to.
//! 3. **Exchanging**: while the current reply carries commands and the round bound has not been
//!    reached, every command is executed in order and the responses are posted back.
//! 4. **Done**: the final reply is returned as an [`Outcome`], ending the run.
//!
//! Any failure aborts the run with an [`Error`]. Nothing is retried: a repeated request could
//! repeat side effects on the card.

use std::ops::ControlFlow;
use std::time::Duration;

use crate::card::{self, AcquireOptions, CardSession, CardTransport};
use crate::frame::{self, CommandFrame, ResponseFrame};
use crate::protocol::{Reply, Request, RequestTemplate};
use crate::remote::RemoteService;
use crate::{BoxError, CancelToken};

/// Upper bound of exchange rounds in a run.
pub const MAX_ROUNDS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No card was presented within {0:?}")]
    CardTimeout(Duration),

    #[error("Card is unavailable: {0}")]
    CardUnavailable(#[source] BoxError),

    #[error("Round {round}: command #{index} is malformed: {source}")]
    MalformedFrame {
        round: usize,
        index: usize,
        source: frame::Error,
    },

    #[error("Round {round}: card transmission failed after {completed} command(s): {source}")]
    Transmit {
        round: usize,
        completed: usize,
        source: BoxError,
    },

    #[error("Round {round}: could not decode the reply of the service: {source}")]
    ReplyDecode {
        round: usize,
        source: serde_json::Error,
    },

    #[error("Round {round}: request to the service failed: {source}")]
    Remote { round: usize, source: BoxError },

    #[error("Cancelled")]
    Cancelled,
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The round the run was aborted in. Round 0 is the opening request.
    pub fn round(&self) -> Option<usize> {
        match self {
            Error::MalformedFrame { round, .. }
            | Error::Transmit { round, .. }
            | Error::ReplyDecode { round, .. }
            | Error::Remote { round, .. } => Some(*round),
            _ => None,
        }
    }
}

impl From<card::Error> for Error {
    fn from(e: card::Error) -> Self {
        match e {
            card::Error::Timeout(timeout) => Error::CardTimeout(timeout),
            card::Error::Connect(e) => Error::CardUnavailable(e),
            card::Error::Cancelled => Error::Cancelled,
            e => Error::CardUnavailable(Box::new(e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Exchange rounds allowed before the run is stopped.
    pub max_rounds: usize,

    /// Time allowed for the card to be presented.
    pub card_timeout: Duration,

    /// Length of one presence check while waiting for the card.
    pub poll_interval: Duration,

    /// Pause between connecting to the card and the first command.
    pub settle_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let acquire = AcquireOptions::default();

        Self {
            max_rounds: MAX_ROUNDS,
            card_timeout: acquire.timeout,
            poll_interval: acquire.poll_interval,
            settle_delay: acquire.settle_delay,
        }
    }
}

impl RelayConfig {
    pub fn acquire_options(&self) -> AcquireOptions {
        AcquireOptions {
            timeout: self.card_timeout,
            poll_interval: self.poll_interval,
            settle_delay: self.settle_delay,
        }
    }
}

/// How a run that was not aborted ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The service stopped issuing commands.
    Finished,

    /// The service was still issuing commands when the round bound was reached.
    RoundLimit,
}

/// Result of a run that was not aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The last reply of the service, to be presented.
    pub reply: Reply,

    /// Exchange rounds performed.
    pub rounds: usize,

    pub completion: Completion,
}

enum State<C: CardTransport> {
    Init {
        card: C,
    },
    AwaitingCard {
        card: C,
        reply: Reply,
    },
    Exchanging {
        session: CardSession<C>,
        reply: Reply,
        round: usize,
    },
}

/// Relays commands of a remote service to a card.
pub struct Relay<R: RemoteService> {
    remote: R,
    template: RequestTemplate,
    config: RelayConfig,
}

impl<R: RemoteService> Relay<R> {
    pub fn new(remote: R, template: RequestTemplate, config: RelayConfig) -> Self {
        Self {
            remote,
            template,
            config,
        }
    }

    /// Performs one run against the card.
    ///
    /// The card is acquired once, after the opening request, and used for the whole run.
    /// `cancel` is checked before every request, while waiting for the card and before every
    /// transmission.
    pub fn run<C: CardTransport>(&mut self, card: C, cancel: &CancelToken) -> Result<Outcome> {
        let mut state = State::Init { card };

        loop {
            state = match self.step(state, cancel)? {
                ControlFlow::Continue(state) => state,
                ControlFlow::Break(outcome) => return Ok(outcome),
            };
        }
    }

    fn step<C: CardTransport>(
        &mut self,
        state: State<C>,
        cancel: &CancelToken,
    ) -> Result<ControlFlow<Outcome, State<C>>> {
        match state {
            State::Init { card } => {
                info!("Sending initial card reading request");
                let reply = self.exchange(Request::initial(&self.template), 0, cancel)?;

                Ok(ControlFlow::Continue(State::AwaitingCard { card, reply }))
            }
            State::AwaitingCard { card, reply } => {
                info!(
                    "Present a card within {} seconds",
                    self.config.card_timeout.as_secs()
                );
                let session = CardSession::acquire(card, &self.config.acquire_options(), cancel)?;

                Ok(ControlFlow::Continue(State::Exchanging {
                    session,
                    reply,
                    round: 0,
                }))
            }
            State::Exchanging {
                mut session,
                reply,
                round,
            } => {
                if reply.is_final() {
                    info!("Service finished after {} round(s)", round);

                    return Ok(ControlFlow::Break(Outcome {
                        reply,
                        rounds: round,
                        completion: Completion::Finished,
                    }));
                }

                if round >= self.config.max_rounds {
                    warning!(
                        "Service still issues commands after {} round(s), giving up",
                        round
                    );

                    return Ok(ControlFlow::Break(Outcome {
                        reply,
                        rounds: round,
                        completion: Completion::RoundLimit,
                    }));
                }

                let round = round + 1;
                info!(
                    "Round {}: received {} command(s)",
                    round,
                    reply.commands().len()
                );

                let results = execute_batch(&mut session, reply.commands(), round, cancel)?;
                let reply = self.exchange(
                    Request::with_results(&self.template, results),
                    round,
                    cancel,
                )?;

                Ok(ControlFlow::Continue(State::Exchanging {
                    session,
                    reply,
                    round,
                }))
            }
        }
    }

    fn exchange(&mut self, request: Request, round: usize, cancel: &CancelToken) -> Result<Reply> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(
            "Sending {} response frame(s)",
            request.rapdu.as_ref().map_or(0, Vec::len)
        );

        let body = self
            .remote
            .send(&request)
            .map_err(|source| Error::Remote { round, source })?;

        Reply::parse(&body).map_err(|source| Error::ReplyDecode { round, source })
    }
}

/// Executes a command batch in order, returning the responses in the same order.
fn execute_batch<C: CardTransport>(
    session: &mut CardSession<C>,
    commands: &[CommandFrame],
    round: usize,
    cancel: &CancelToken,
) -> Result<Vec<ResponseFrame>> {
    let mut results = Vec::with_capacity(commands.len());
    let start = session.executed();

    for (index, command) in commands.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!("CAPDU: {}", command);

        let rx = match session.execute(command) {
            Ok(rx) => rx,
            Err(card::Error::Malformed(source)) => {
                return Err(Error::MalformedFrame {
                    round,
                    index,
                    source,
                })
            }
            Err(card::Error::Transmit(source)) => {
                return Err(Error::Transmit {
                    round,
                    completed: session.executed() - start,
                    source,
                })
            }
            Err(e) => return Err(e.into()),
        };

        debug!("RAPDU: {}", rx);
        results.push(rx);
    }

    Ok(results)
}

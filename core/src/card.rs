use std::time::{Duration, Instant};

use crate::frame::{self, CommandFrame, ResponseFrame};
use crate::{BoxError, CancelToken};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No card was presented within {0:?}")]
    Timeout(Duration),

    #[error("Could not connect to the card: {0}")]
    Connect(#[source] BoxError),

    #[error("Malformed command frame: {0}")]
    Malformed(#[from] frame::Error),

    #[error("Card transmission failed: {0}")]
    Transmit(#[source] BoxError),

    #[error("Cancelled")]
    Cancelled,
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// A response received from the card: the payload and the trailer (SW1, SW2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub payload: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    pub fn new(payload: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self { payload, sw1, sw2 }
    }

    /// Splits raw response octets into payload and trailer.
    /// Returns `None` when the trailer is missing.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Option<Self> {
        let sw2 = bytes.pop()?;
        let sw1 = bytes.pop()?;

        Some(Self::new(bytes, sw1, sw2))
    }

    /// Encodes the response as a hexadecimal response frame.
    pub fn to_frame(&self) -> ResponseFrame {
        frame::encode(&self.payload, self.sw1, self.sw2)
    }
}

/// A channel to a card reader.
///
/// Implementations only move bytes; they never interpret them.
pub trait CardTransport {
    /// Blocks until a card is present or `timeout` elapses.
    /// Returns whether a card is present.
    fn wait_for_card(&mut self, timeout: Duration) -> std::result::Result<bool, BoxError>;

    /// Establishes the low-level connection to the present card.
    fn connect(&mut self) -> std::result::Result<(), BoxError>;

    /// Transmits a command to the card, then receives a response from them.
    fn transmit(&mut self, command: &[u8]) -> std::result::Result<Response, BoxError>;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn wait_for_card(&mut self, timeout: Duration) -> std::result::Result<bool, BoxError> {
        (**self).wait_for_card(timeout)
    }

    fn connect(&mut self) -> std::result::Result<(), BoxError> {
        (**self).connect()
    }

    fn transmit(&mut self, command: &[u8]) -> std::result::Result<Response, BoxError> {
        (**self).transmit(command)
    }
}

/// How long and how patiently to wait for a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Total time allowed for the card to be presented.
    pub timeout: Duration,

    /// Length of one presence check; cancellation is observed between checks.
    pub poll_interval: Duration,

    /// Pause after connecting, before the first command is sent.
    pub settle_delay: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// An established session with exactly one card.
///
/// Commands are executed one at a time through `&mut self`.
#[derive(Debug)]
pub struct CardSession<T: CardTransport> {
    transport: T,
    executed: usize,
}

impl<T: CardTransport> CardSession<T> {
    /// Waits for a card to be presented, then connects to them.
    pub fn acquire(mut transport: T, options: &AcquireOptions, cancel: &CancelToken) -> Result<Self> {
        debug!("Waiting for a card");

        let deadline = Instant::now() + options.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            // The card is checked at least once, even with a zero timeout.
            let slice = options
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            if transport.wait_for_card(slice).map_err(Error::Connect)? {
                break;
            }

            if Instant::now() >= deadline {
                return Err(Error::Timeout(options.timeout));
            }

            info!("Still waiting for your card...");
        }

        transport.connect().map_err(Error::Connect)?;
        debug!("Connected to your card");

        if !cancel.sleep(options.settle_delay) {
            return Err(Error::Cancelled);
        }

        Ok(Self {
            transport,
            executed: 0,
        })
    }

    /// Executes a command frame on the card and returns the response frame.
    pub fn execute(&mut self, command: &CommandFrame) -> Result<ResponseFrame> {
        let tx = command.decode()?;
        debug!("TX: {}", hex::encode(&tx));

        let response = self.transport.transmit(&tx).map_err(Error::Transmit)?;
        let rx = response.to_frame();
        debug!("RX: {}", rx);

        self.executed += 1;

        Ok(rx)
    }

    /// Number of commands executed successfully during this session.
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Releases the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCard;

    fn quick() -> AcquireOptions {
        AcquireOptions {
            timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_response_from_bytes() {
        assert_eq!(
            Some(Response::new(vec![0x01, 0x02], 0x90, 0x00)),
            Response::from_bytes(vec![0x01, 0x02, 0x90, 0x00]),
        );
        assert_eq!(
            Some(Response::new(vec![], 0x6A, 0x82)),
            Response::from_bytes(vec![0x6A, 0x82]),
        );
        assert_eq!(None, Response::from_bytes(vec![0x90]));
    }

    #[test]
    fn test_execute() {
        let card = MockCard::present().respond(vec![0x90, 0x00], 0x90, 0x00);
        let mut session = CardSession::acquire(card, &quick(), &CancelToken::new()).unwrap();

        let rx = session.execute(&"00A4040000".into()).unwrap();

        assert_eq!(rx, "90009000");
        assert_eq!(1, session.executed());

        let card = session.into_inner();
        assert!(card.connected);
        assert_eq!(vec![vec![0x00, 0xA4, 0x04, 0x00, 0x00]], card.transmitted);
    }

    #[test]
    fn test_acquire_after_polls() {
        let card = MockCard::present_after(2);
        let session = CardSession::acquire(card, &quick(), &CancelToken::new()).unwrap();

        assert_eq!(3, session.into_inner().polls);
    }

    #[test]
    fn test_acquire_timeout() {
        let card = MockCard::absent();

        assert!(matches!(
            CardSession::acquire(card, &quick(), &CancelToken::new()),
            Err(Error::Timeout(_)),
        ));
    }

    #[test]
    fn test_acquire_zero_timeout() {
        let options = AcquireOptions {
            timeout: Duration::ZERO,
            ..quick()
        };

        let session = CardSession::acquire(MockCard::present(), &options, &CancelToken::new());
        assert_eq!(1, session.unwrap().into_inner().polls);

        assert!(matches!(
            CardSession::acquire(MockCard::absent(), &options, &CancelToken::new()),
            Err(Error::Timeout(Duration::ZERO)),
        ));
    }

    #[test]
    fn test_acquire_settles() {
        let options = AcquireOptions {
            settle_delay: Duration::from_millis(200),
            ..quick()
        };

        let start = Instant::now();
        CardSession::acquire(MockCard::present(), &options, &CancelToken::new()).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_acquire_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            CardSession::acquire(MockCard::present(), &quick(), &cancel),
            Err(Error::Cancelled),
        ));
    }

    #[test]
    fn test_execute_malformed() {
        let mut session =
            CardSession::acquire(MockCard::present(), &quick(), &CancelToken::new()).unwrap();

        assert!(matches!(
            session.execute(&"00A".into()),
            Err(Error::Malformed(frame::Error::OddLength)),
        ));
        assert!(session.into_inner().transmitted.is_empty());
    }

    #[test]
    fn test_execute_removed() {
        let card = MockCard::present().respond(vec![], 0x90, 0x00).remove_after(1);
        let mut session = CardSession::acquire(card, &quick(), &CancelToken::new()).unwrap();

        session.execute(&"00B0000000".into()).unwrap();
        assert!(matches!(
            session.execute(&"00B0000000".into()),
            Err(Error::Transmit(_)),
        ));
        assert_eq!(1, session.executed());
    }
}

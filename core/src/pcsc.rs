//! PC/SC support for cardrelay.
//! Can be enabled by turning `pcsc` feature on.
//!
//! ## What is PC/SC?
//! PC/SC (Personal Computer/Smart Card) is an abstraction layer for communicating with Smart Cards
//! from Windows. Using this layer, applications can connect to any devices that supports PC/SC,
//! without depending on their driver implementation. Windows and macOS supports PC/SC by themselves,
//! Linux also supports by installing pcsc-lite shared library.
//!
//! ## Usage
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use cardrelay::card::{AcquireOptions, CardSession};
//! use cardrelay::pcsc::Context;
//! use cardrelay::CancelToken;
//!
//! let ctx = Context::try_new().unwrap();
//! let reader = ctx.open(None).unwrap();
//!
//! let mut session =
//!     CardSession::acquire(reader, &AcquireOptions::default(), &CancelToken::new()).unwrap();
//! let rx = session.execute(&"00A4040000".into()).unwrap();
//! ```

use std::ffi::CString;
use std::time::Duration;

use pcsc::{Card, Protocols, ReaderState, Scope, ShareMode, State, MAX_BUFFER_SIZE_EXTENDED};

use crate::card::{CardTransport, Response};
use crate::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error occurred while communicating with PC/SC: {0}")]
    PcscError(#[from] pcsc::Error),

    #[error("Reader not found on PC/SC service")]
    ReaderNotFound,

    #[error("Not connected to a card")]
    NotConnected,

    #[error("Card returned {0} octet(s), too short for a status word")]
    ShortResponse(usize),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Room for the longest extended-length response: 65536 octets of data and the status word.
const RECEIVE_BUFFER_SIZE: usize = MAX_BUFFER_SIZE_EXTENDED;

/// PC/SC context.
pub struct Context {
    ctx: pcsc::Context,
}

impl Context {
    /// Creates a PC/SC context in user scope.
    pub fn try_new() -> Result<Self> {
        Ok(Self {
            ctx: pcsc::Context::establish(Scope::User).map_err(Error::PcscError)?,
        })
    }

    /// Lists the names of the readers known to the PC/SC service.
    pub fn readers(&self) -> Result<Vec<String>> {
        Ok(self
            .ctx
            .list_readers_owned()
            .map_err(Error::PcscError)?
            .into_iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Opens the reader with the given name, or the first one found.
    pub fn open(&self, name: Option<&str>) -> Result<Reader> {
        let readers = self.ctx.list_readers_owned().map_err(Error::PcscError)?;
        let reader = match name {
            Some(name) => readers
                .into_iter()
                .find(|r| r.to_string_lossy() == name),
            None => readers.into_iter().next(),
        }
        .ok_or(Error::ReaderNotFound)?;

        debug!("Using device: {}", reader.to_string_lossy());

        Ok(Reader::new(self.ctx.clone(), reader))
    }
}

/// A PC/SC reader, holding the connection to the card once it is established.
pub struct Reader {
    ctx: pcsc::Context,
    name: CString,
    card: Option<Card>,
}

impl Reader {
    fn new(ctx: pcsc::Context, name: CString) -> Self {
        Self {
            ctx,
            name,
            card: None,
        }
    }

    pub fn name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    fn is_present(&self, timeout: Duration) -> Result<bool> {
        let mut states = [ReaderState::new(self.name.clone(), State::UNAWARE)];

        // An unaware query returns the current state at once.
        match self.ctx.get_status_change(Duration::ZERO, &mut states) {
            Ok(()) | Err(pcsc::Error::Timeout) => {}
            Err(e) => return Err(Error::PcscError(e)),
        }
        if states[0].event_state().contains(State::PRESENT) {
            return Ok(true);
        }

        states[0].sync_current_state();

        match self.ctx.get_status_change(timeout, &mut states) {
            Ok(()) => Ok(states[0].event_state().contains(State::PRESENT)),
            Err(pcsc::Error::Timeout) => Ok(false),
            Err(e) => Err(Error::PcscError(e)),
        }
    }

    /// Transmits an APDU command to the card, then receives a response from them.
    pub fn transmit(&self, tx: &[u8]) -> Result<Vec<u8>> {
        let card = self.card.as_ref().ok_or(Error::NotConnected)?;

        let mut rx = vec![0u8; RECEIVE_BUFFER_SIZE];
        let rx = card.transmit(tx, &mut rx).map_err(Error::PcscError)?;

        Ok(Vec::from(rx))
    }
}

impl CardTransport for Reader {
    fn wait_for_card(&mut self, timeout: Duration) -> std::result::Result<bool, BoxError> {
        Ok(self.is_present(timeout)?)
    }

    fn connect(&mut self) -> std::result::Result<(), BoxError> {
        let card = self
            .ctx
            .connect(&self.name, ShareMode::Shared, Protocols::ANY)
            .map_err(Error::PcscError)?;
        self.card = Some(card);

        Ok(())
    }

    fn transmit(&mut self, command: &[u8]) -> std::result::Result<Response, BoxError> {
        let rx = Reader::transmit(self, command)?;
        let len = rx.len();

        Ok(Response::from_bytes(rx).ok_or(Error::ShortResponse(len))?)
    }
}

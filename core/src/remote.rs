//! The channel to the remote issuing service.

use crate::protocol::Request;
use crate::BoxError;

/// A request/response channel to the issuing service.
///
/// Connection state such as headers and cookies belongs to the implementation and is set up
/// before the relay starts; the relay only sends requests.
pub trait RemoteService {
    /// Sends a card-reading request and returns the raw reply body.
    ///
    /// The body is decoded by the caller, so a transport must not reject a reply only because
    /// it is not the expected JSON.
    fn send(&mut self, request: &Request) -> Result<String, BoxError>;
}

impl<T: RemoteService + ?Sized> RemoteService for &mut T {
    fn send(&mut self, request: &Request) -> Result<String, BoxError> {
        (**self).send(request)
    }
}

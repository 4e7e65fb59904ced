use thiserror::Error;

use causerie_api::ApiError;
use causerie_net::SocketError;
use causerie_store::StoreError;

/// Errors surfaced by [`ChatSession`] actions that re-throw (add-friend,
/// profile update). Everything else records into the state's error slot and
/// swallows.
///
/// [`ChatSession`]: crate::ChatSession
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("尚未登录")]
    NotSignedIn,
}

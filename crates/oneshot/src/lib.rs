mod errors;
mod oneshot;

pub use errors::ReceiveError;
pub use errors::SendError;
pub use oneshot::channel;
pub use oneshot::OneshotReceiver;
pub use oneshot::OneshotSender;

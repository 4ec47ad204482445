use crate::protocol::CommandMessage;

/// Receiver of command messages arriving on a client's connection, typically
/// replies correlated with a request through `header.sequence_id`.
///
/// Called from the client's dispatch task; implementations should not block.
pub trait CommListener: Send + Sync {
    fn on_message(&self, msg: &CommandMessage);
}

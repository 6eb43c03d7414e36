//! Transfer Protocol Engine
//!
//! Files move over an open data channel as one metadata text frame followed
//! by binary chunks. The send path applies cooperative backpressure on the
//! channel's buffered amount; the receive path reassembles chunks with one
//! cursor per channel.

mod channel;
mod files;
mod frame;
mod receiver;
mod sender;

pub use channel::{ChannelMessage, TransferChannel};
pub use files::{safe_file_name, ReceivedFile, ReceivedFiles};
pub use frame::{InboundFrame, TransferMetadata};
pub use receiver::{ReceiveMode, ReceiveProgress, TransferReceiver};
pub use sender::{send_file, send_path, SendReport};

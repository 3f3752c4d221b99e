//! Routing of framed packets to handlers by packet id.

mod dispatcher;

pub use dispatcher::{DispatchError, Dispatcher, PacketHandler};

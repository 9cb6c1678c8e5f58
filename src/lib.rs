pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod pose;
pub mod producer;
pub mod workspace;

pub use config::Config;
pub use error::{DecodeError, ListenerError};
pub use listener::{PacketHandler, PacketListener, StopHandle};
pub use pose::{Landmark, PoseSnapshot, UpperBodyPacket};
pub use workspace::{FusionWorkspace, SyncObservation};

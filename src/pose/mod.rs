pub mod packet;
pub mod snapshot;

pub use packet::{HmdPose, Joint, UpperBodyPacket, Vec3};
pub use snapshot::{Landmark, PoseSnapshot};

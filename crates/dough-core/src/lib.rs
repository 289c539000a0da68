pub mod errors;
pub mod events;
pub mod ids;
pub mod model;

pub use errors::DecodeError;
pub use events::{Envelope, PushEvent};
pub use ids::{ConnectionId, MemberId};
pub use model::{decode_members, FrontingEntry, Member, MemberStatus, MentalLevel, MentalState};

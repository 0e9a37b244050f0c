pub mod catalogue;
pub mod peer;
pub mod session;

pub use catalogue::{BeaconProfile, Room};
pub use peer::PeerRegistration;
pub use session::{
    AllUsersPresenceDay, CurrentOccupant, PresenceSession, RoomOccupants, SessionChange,
    UserPresenceDay, UserPresenceDetail,
};

//! Domain model (keys, members, patches, windows, outcomes, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod member;
pub mod outcome;
pub mod patch;
pub mod window;

pub use self::errors::{ConfigError, ErrorKind, PatchError, RollcallError};
pub use self::events::Notification;
pub use self::ids::MemberKey;
pub use self::member::{Member, MemberStatus};
pub use self::outcome::{ActionOutcome, ActionPhase};
pub use self::patch::{ChangeKind, ChangeNotice, MemberPatch};
pub use self::window::{ActionWindow, parse_time_of_day};

//! Network Layer
//!
//! Everything that talks to the host: the sync protocol, the inbound router,
//! the collaborator traits and the session that ties them to the dice and
//! initiative logic. This layer is asynchronous; `dice/` and `initiative/`
//! never await.

pub mod log;
pub mod protocol;
pub mod router;
pub mod platform;
pub mod loopback;
pub mod session;

pub use log::{LogEntry, ThrowLog, DEFAULT_LOG_CAPACITY};
pub use protocol::{
    decode, encode, ClientId, DiceLog, Envelope, FetchInitiative, Inbound, InitiativeReport,
    ProtocolError, Recipients, Sender, SetInitiative, SyncMessage, ThrowAssignment,
};
pub use router::{Dispatch, SyncRouter};
pub use platform::{
    BusError, ChatChannel, DicePlatform, Identity, IdentityDirectory, PlatformError, PlatformEvent,
    SyncBus,
};
pub use loopback::{
    BoardConnection, LocalBoard, RecordingChat, ScriptedDicePlatform, StaticDirectory, Submission,
};
pub use session::{CombatHelm, HelmError, HelmEvent, ThrowKind, HELP_TEXT, INITIATIVE_LABEL_PREFIX};

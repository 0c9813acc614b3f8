//! USRP network streaming engine

pub mod logic;
pub mod message;
pub mod metadata;
pub mod udp;

pub use logic::{DigitalMode, LogicStats, UsrpLogic};
pub use message::{StationInfo, UsrpHeader, UsrpMessage};
pub use metadata::{classify, Metadata, TalkerInfo};
pub use udp::{create_socket, listen_addr, resolve_peer};

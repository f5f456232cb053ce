pub mod call;
pub mod error;
pub mod frame;
pub mod plan;
pub mod publish;
pub mod reply;
pub mod station_config;
pub mod status;


pub use call::CallRequest;
pub use error::{Result, ZeroError};
pub use frame::{ByteCommand, FrameType, ReceivedRequest, WireMessage};
pub use plan::{PlanType, ZeroPlan};
pub use publish::{PublishItem, ZeroNetEventType};
pub use reply::{ReplyMessage, ResultKind, ZeroResult};
pub use station_config::{StationConfig, StationKind};
pub use status::{ApiResult, ApiStatus, ClientResultKind, RemoteStatus};

pub mod client;
pub mod manage;
pub mod pool;

pub use client::{
    generate_request_id, AlwaysReady, ApiClient, CallContext, CallOutcome, CallPhase,
    ClientConfig, Readiness,
};
pub use manage::{CommandResult, ManageClient};
pub use pool::{ConnectionPool, EndpointResolver, PoolConfig, PooledSocket, StaticResolver};

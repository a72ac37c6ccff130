//! Envelope validation, JSON-RPC 2.0 adapter, wire message types, and the
//! audit log writer shared by every Agent League System service.

pub mod audit;
pub mod envelope;
pub mod error;
pub mod jsonrpc;
pub mod messages;
pub mod retry;
pub mod token;
pub mod validate;

pub use envelope::{AgentKind, Envelope, MessageType, RawEnvelope, Sender, PROTOCOL_VERSION};
pub use error::{ErrorCode, ErrorPayload, LeagueError};
pub use jsonrpc::{rpc_error_code, RpcErrorObject, RpcParams, RpcRequest, RpcResponse, LEAGUE_HANDLE_METHOD};

//! Maps RPC calls onto the session manager. Transport-agnostic: the socket handler
//! only frames and unframes.

use crate::SharedWorld;
use rccar_shared::protocol::{Input, Method, RpcRequest, RpcResponse};
use serde_json::Value;

/// Execute one call against the shared world. Never panics on client data; every
/// failure becomes an error response with the caller's id.
pub fn handle_request(world: &SharedWorld, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let Some(method) = Method::parse(&request.method) else {
        tracing::debug!(method = %request.method, "unknown method");
        return RpcResponse::err(id, format!("rpc: can't find method {}", request.method));
    };

    match method {
        Method::Join => {
            let name: String = match request.param() {
                Ok(name) => name,
                Err(e) => return RpcResponse::err(id, e),
            };
            let joined = world.lock().join(&name);
            match joined {
                Ok(profile) => match serde_json::to_value(profile) {
                    Ok(value) => RpcResponse::ok(id, value),
                    Err(e) => RpcResponse::err(id, e.to_string()),
                },
                Err(e) => RpcResponse::err(id, e.to_string()),
            }
        }
        Method::Update => {
            let input: Input = match request.param() {
                Ok(input) => input,
                Err(e) => return RpcResponse::err(id, e),
            };
            let output = world.lock().update(&input);
            match serde_json::to_value(output) {
                Ok(value) => RpcResponse::ok(id, value),
                Err(e) => RpcResponse::err(id, e.to_string()),
            }
        }
        Method::Bye => {
            let name: String = match request.param() {
                Ok(name) => name,
                Err(e) => return RpcResponse::err(id, e),
            };
            world.lock().bye(&name);
            RpcResponse::ok(id, Value::String(String::new()))
        }
    }
}

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// === Client -> Server ===

/// Driver command sent with every Update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Input {
    pub name: String,
    /// Nominally [-1, 1]; clamped by the server before use.
    #[serde(default)]
    pub steering: f64,
    #[serde(default)]
    pub accel: f64,
    #[serde(default)]
    pub brake: f64,
}

// === Server -> Client ===

/// Position and orientation of one rigid body.
///
/// `quaternion` is scalar-first: `[w, x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Attitude {
    pub position: [f64; 3],
    pub quaternion: [f64; 4],
}

impl Default for Attitude {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            quaternion: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VehicleWire {
    #[serde(rename = "Name")]
    pub name: String,
    pub body: Attitude,
    /// Fixed order: front-left, front-right, rear-left, rear-right.
    pub tires: Vec<Attitude>,
}

/// Reply to Update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Output {
    #[serde(rename = "Self")]
    pub self_vehicle: Option<VehicleWire>,
    #[serde(rename = "Others", default)]
    pub others: Vec<VehicleWire>,
}

// === RPC envelope ===

/// Methods exposed over the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Join,
    Update,
    Bye,
}

impl Method {
    /// Accepts both the service-qualified form (`World.Join`) and the bare name.
    pub fn parse(method: &str) -> Option<Self> {
        let bare = method.strip_prefix("World.").unwrap_or(method);
        match bare {
            "Join" => Some(Method::Join),
            "Update" => Some(Method::Update),
            "Bye" => Some(Method::Bye),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Join => "World.Join",
            Method::Update => "World.Update",
            Method::Bye => "World.Bye",
        }
    }
}

/// One call: `{"method": "World.Update", "params": [{...}], "id": 3}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    #[serde(default)]
    pub id: serde_json::Value,
}

impl RpcRequest {
    pub fn new(method: Method, param: serde_json::Value, id: u64) -> Self {
        Self {
            method: method.as_str().to_string(),
            params: vec![param],
            id: serde_json::Value::from(id),
        }
    }

    /// First positional parameter decoded as `T`.
    pub fn param<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        let value = self
            .params
            .first()
            .cloned()
            .ok_or_else(|| "missing parameter".to_string())?;
        serde_json::from_value(value).map_err(|e| format!("invalid parameter: {e}"))
    }
}

/// Reply to one call. Exactly one of `result` / `error` is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: serde_json::Value,
    pub result: serde_json::Value,
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            id,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

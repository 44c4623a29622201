use serde::{Deserialize, Serialize};

/// The caller identity extracted from a verified bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// `me` as the Request context's identity mapping (§3).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "username": self.username,
            "role": self.role,
        })
    }
}

/// The JWT claims carried inside the signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

fn default_role() -> String {
    "user".to_string()
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
            claims: serde_json::Map::new(),
        }
    }
}

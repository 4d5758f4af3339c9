//! Named entities that participate in the unified search index alongside
//! assets but whose own CRUD lives outside the catalog core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner_team_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProduct {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner_team_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

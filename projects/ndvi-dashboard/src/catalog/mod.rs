// Organizational hierarchy (domain → area → workspace → season → farm) and
// the read-only metadata source the dashboard drills through.

pub mod cache;
pub mod json_catalog;
pub mod selection;

use crate::error::CatalogError;
use crate::pipeline::types::FieldRecord;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Area {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Domain {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub areas: Vec<Area>,
    /// Workspaces reachable without choosing an area.
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Season {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Farm {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Common view over hierarchy entries.
pub trait Listed {
    fn id(&self) -> u64;
    fn name(&self) -> &str;
    fn deleted(&self) -> bool;
}

macro_rules! impl_listed {
    ($($ty:ty),*) => {
        $(impl Listed for $ty {
            fn id(&self) -> u64 {
                self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn deleted(&self) -> bool {
                self.deleted
            }
        })*
    };
}

impl_listed!(Workspace, Area, Domain, Season, Farm);

/// Non-deleted entries sorted by name.
pub fn visible<T: Listed + Clone>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = items.iter().filter(|i| !i.deleted()).cloned().collect();
    out.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
    out
}

/// Read-only hierarchy and field-listing queries.
pub trait MetadataSource: Send + Sync {
    fn domains_for_user(&self, email: &str) -> Result<Vec<Domain>, CatalogError>;
    fn seasons(&self, workspace_id: u64) -> Result<Vec<Season>, CatalogError>;
    fn farms(&self, workspace_id: u64, season_id: u64) -> Result<Vec<Farm>, CatalogError>;
    fn fields(&self, season_id: u64, farm_id: u64) -> Result<Vec<FieldRecord>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_filters_deleted_and_sorts() {
        let seasons = vec![
            Season { id: 3, name: "2024/25".to_string(), deleted: false },
            Season { id: 1, name: "2022/23".to_string(), deleted: true },
            Season { id: 2, name: "2023/24".to_string(), deleted: false },
        ];
        let out = visible(&seasons);
        assert_eq!(out.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 3]);
    }
}

// Resolves a partial selection request into an explicit `Selection` by walking
// the hierarchy cascade, each level gated on the one above it.

use crate::catalog::{visible, Listed, MetadataSource};
use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Domain,
    Area,
    Workspace,
    Season,
    Farm,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Domain => "domain",
            Self::Area => "area",
            Self::Workspace => "workspace",
            Self::Season => "season",
            Self::Farm => "farm",
        };
        f.write_str(name)
    }
}

/// How to fill a level whose preferred id is missing or unknown.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Take the first visible entry (by name).
    #[default]
    First,
    /// Fail with a `SelectionError`.
    Strict,
}

/// Preferred ids for each level, e.g. a user's saved defaults or query params.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SelectionRequest {
    pub email: String,
    #[serde(default)]
    pub domain_id: Option<u64>,
    /// `0` or absent means "all areas".
    #[serde(default)]
    pub area_id: Option<u64>,
    #[serde(default)]
    pub workspace_id: Option<u64>,
    #[serde(default)]
    pub season_id: Option<u64>,
    #[serde(default)]
    pub farm_id: Option<u64>,
}

/// A fully resolved cascade. `area_id == None` selects the domain's own
/// workspaces instead of an area's.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub domain_id: u64,
    pub area_id: Option<u64>,
    pub workspace_id: u64,
    pub season_id: u64,
    pub farm_id: u64,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "domain {} / area {} / workspace {} / season {} / farm {}",
            self.domain_id,
            self.area_id.map(|a| a.to_string()).unwrap_or_else(|| "--".to_string()),
            self.workspace_id,
            self.season_id,
            self.farm_id
        )
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: u64,
    pub name: String,
}

impl Choice {
    fn from_listed<T: Listed>(item: &T) -> Self {
        Self {
            id: item.id(),
            name: item.name().to_string(),
        }
    }
}

/// The resolved selection plus the options visible at every level.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Cascade {
    pub selection: Selection,
    pub domains: Vec<Choice>,
    pub areas: Vec<Choice>,
    pub workspaces: Vec<Choice>,
    pub seasons: Vec<Choice>,
    pub farms: Vec<Choice>,
}

fn choices<T: Listed>(items: &[T]) -> Vec<Choice> {
    items.iter().map(Choice::from_listed).collect()
}

fn pick<'a, T: Listed>(
    level: Level,
    items: &'a [T],
    preferred: Option<u64>,
    policy: FallbackPolicy,
) -> Result<&'a T, SelectionError> {
    let first = items.first().ok_or(SelectionError::Empty(level))?;
    if let Some(found) = preferred.and_then(|id| items.iter().find(|i| i.id() == id)) {
        return Ok(found);
    }
    match (preferred, policy) {
        (Some(id), FallbackPolicy::First) => {
            tracing::warn!("{} {} not available, falling back to '{}'", level, id, first.name());
            Ok(first)
        }
        (Some(id), FallbackPolicy::Strict) => Err(SelectionError::NotFound { level, id }),
        (None, FallbackPolicy::First) => Ok(first),
        (None, FallbackPolicy::Strict) => Err(SelectionError::Unselected(level)),
    }
}

/// Walk domain → area → workspace → season → farm for `request`.
pub fn resolve(
    request: &SelectionRequest,
    source: &dyn MetadataSource,
    policy: FallbackPolicy,
) -> Result<Cascade, SelectionError> {
    let domains = visible(&source.domains_for_user(&request.email)?);
    let domain = pick(Level::Domain, &domains, request.domain_id, policy)?;

    let areas = visible(&domain.areas);
    let area = match request.area_id.filter(|id| *id != 0) {
        None => None,
        Some(id) => match areas.iter().find(|a| a.id == id) {
            Some(area) => Some(area),
            None if policy == FallbackPolicy::First => {
                tracing::warn!("area {} not available, using all areas", id);
                None
            }
            None => return Err(SelectionError::NotFound { level: Level::Area, id }),
        },
    };

    let workspaces = visible(match area {
        Some(area) => &area.workspaces,
        None => &domain.workspaces,
    });
    let workspace = pick(Level::Workspace, &workspaces, request.workspace_id, policy)?;

    let seasons = visible(&source.seasons(workspace.id)?);
    let season = pick(Level::Season, &seasons, request.season_id, policy)?;

    let farms = visible(&source.farms(workspace.id, season.id)?);
    let farm = pick(Level::Farm, &farms, request.farm_id, policy)?;

    let selection = Selection {
        domain_id: domain.id,
        area_id: area.map(|a| a.id),
        workspace_id: workspace.id,
        season_id: season.id,
        farm_id: farm.id,
    };
    tracing::debug!("Resolved selection: {}", selection);

    Ok(Cascade {
        selection,
        domains: choices(&domains),
        areas: choices(&areas),
        workspaces: choices(&workspaces),
        seasons: choices(&seasons),
        farms: choices(&farms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::json_catalog::{CatalogDocument, JsonCatalog};

    fn catalog() -> JsonCatalog {
        let doc: CatalogDocument = serde_json::from_value(serde_json::json!({
            "users": [{"email": "u@x.com", "domains": [
                {"id": 2, "name": "Zeta", "workspaces": [{"id": 20, "name": "Z-WS"}]},
                {"id": 1, "name": "Alpha", "areas": [
                    {"id": 11, "name": "North", "workspaces": [{"id": 110, "name": "N-WS"}]},
                    {"id": 12, "name": "Old", "deleted": true, "workspaces": []}
                ], "workspaces": [
                    {"id": 101, "name": "Main"},
                    {"id": 102, "name": "Archive", "deleted": true}
                ]}
            ]}],
            "seasons": [
                {"workspace_id": 101, "seasons": [{"id": 500, "name": "2024"}, {"id": 501, "name": "2023"}]},
                {"workspace_id": 110, "seasons": [{"id": 600, "name": "2024"}]}
            ],
            "farms": [
                {"workspace_id": 101, "season_id": 500, "farms": [{"id": 7, "name": "B Farm"}, {"id": 8, "name": "A Farm"}]},
                {"workspace_id": 101, "season_id": 501, "farms": []}
            ]
        }))
        .unwrap();
        JsonCatalog::from_document(doc)
    }

    fn request() -> SelectionRequest {
        SelectionRequest {
            email: "u@x.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_available_walks_cascade() {
        let req = SelectionRequest {
            season_id: Some(500),
            ..request()
        };
        let cascade = resolve(&req, &catalog(), FallbackPolicy::First).unwrap();
        assert_eq!(
            cascade.selection,
            Selection {
                domain_id: 1,
                area_id: None,
                workspace_id: 101,
                season_id: 500,
                farm_id: 8,
            }
        );
        assert_eq!(cascade.domains.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_empty_level_is_error() {
        // Season "2023" sorts first and has no farms
        let err = resolve(&request(), &catalog(), FallbackPolicy::First).unwrap_err();
        assert!(matches!(err, SelectionError::Empty(Level::Farm)));
    }

    #[test]
    fn test_preferred_ids_are_honoured() {
        let req = SelectionRequest {
            domain_id: Some(1),
            area_id: Some(0),
            workspace_id: Some(101),
            season_id: Some(500),
            farm_id: Some(7),
            ..request()
        };
        let cascade = resolve(&req, &catalog(), FallbackPolicy::Strict).unwrap();
        assert_eq!(cascade.selection.farm_id, 7);
        assert_eq!(cascade.farms.iter().map(|f| f.id).collect::<Vec<_>>(), vec![8, 7]);
        assert_eq!(cascade.areas.len(), 1);
        assert_eq!(cascade.workspaces, vec![Choice { id: 101, name: "Main".to_string() }]);
    }

    #[test]
    fn test_area_narrows_workspaces() {
        let req = SelectionRequest {
            domain_id: Some(1),
            area_id: Some(11),
            season_id: Some(600),
            ..request()
        };
        let err = resolve(&req, &catalog(), FallbackPolicy::First).unwrap_err();
        // Workspace 110 has a season but no farm listing
        assert!(matches!(err, SelectionError::Empty(Level::Farm)));
    }

    #[test]
    fn test_strict_policy_reports_missing_levels() {
        let err = resolve(&request(), &catalog(), FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, SelectionError::Unselected(Level::Domain)));

        let req = SelectionRequest {
            domain_id: Some(99),
            ..request()
        };
        let err = resolve(&req, &catalog(), FallbackPolicy::Strict).unwrap_err();
        assert!(matches!(err, SelectionError::NotFound { level: Level::Domain, id: 99 }));
    }

    #[test]
    fn test_first_policy_replaces_unknown_ids() {
        let req = SelectionRequest {
            domain_id: Some(99),
            area_id: Some(12),
            season_id: Some(500),
            farm_id: Some(12345),
            ..request()
        };
        let cascade = resolve(&req, &catalog(), FallbackPolicy::First).unwrap();
        assert_eq!(cascade.selection.domain_id, 1);
        // Deleted area is not visible, so the cascade uses all areas
        assert_eq!(cascade.selection.area_id, None);
        assert_eq!(cascade.selection.farm_id, 8);
    }

    #[test]
    fn test_unknown_user_has_no_domains() {
        let req = SelectionRequest {
            email: "ghost@x.com".to_string(),
            ..Default::default()
        };
        let err = resolve(&req, &catalog(), FallbackPolicy::First).unwrap_err();
        assert!(matches!(err, SelectionError::Empty(Level::Domain)));
    }
}

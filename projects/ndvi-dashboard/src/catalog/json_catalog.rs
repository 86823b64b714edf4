use crate::catalog::{Domain, Farm, MetadataSource, Season};
use crate::error::CatalogError;
use crate::pipeline::types::FieldRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserDomains {
    pub email: String,
    pub domains: Vec<Domain>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SeasonListing {
    pub workspace_id: u64,
    pub seasons: Vec<Season>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FarmListing {
    pub workspace_id: u64,
    pub season_id: u64,
    pub farms: Vec<Farm>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FieldListing {
    pub season_id: u64,
    pub farm_id: u64,
    pub fields: Vec<FieldRecord>,
}

/// On-disk snapshot of the metadata service responses.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CatalogDocument {
    #[serde(default)]
    pub users: Vec<UserDomains>,
    #[serde(default)]
    pub seasons: Vec<SeasonListing>,
    #[serde(default)]
    pub farms: Vec<FarmListing>,
    #[serde(default)]
    pub fields: Vec<FieldListing>,
}

/// Metadata source backed by a [`CatalogDocument`].
///
/// Unknown keys answer with an empty listing, as the remote service does.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    domains: HashMap<String, Vec<Domain>>,
    seasons: HashMap<u64, Vec<Season>>,
    farms: HashMap<(u64, u64), Vec<Farm>>,
    fields: HashMap<(u64, u64), Vec<FieldRecord>>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let document: CatalogDocument = serde_json::from_str(&content)?;
        let catalog = Self::from_document(document);
        tracing::info!(
            "Loaded catalog from {:?}: {} user(s), {} field listing(s)",
            path,
            catalog.domains.len(),
            catalog.fields.len()
        );
        Ok(catalog)
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        let mut catalog = Self::default();
        for user in document.users {
            catalog
                .domains
                .entry(user.email.to_lowercase())
                .or_default()
                .extend(user.domains);
        }
        for listing in document.seasons {
            catalog
                .seasons
                .entry(listing.workspace_id)
                .or_default()
                .extend(listing.seasons);
        }
        for listing in document.farms {
            catalog
                .farms
                .entry((listing.workspace_id, listing.season_id))
                .or_default()
                .extend(listing.farms);
        }
        for listing in document.fields {
            catalog
                .fields
                .entry((listing.season_id, listing.farm_id))
                .or_default()
                .extend(listing.fields);
        }
        catalog
    }
}

impl MetadataSource for JsonCatalog {
    fn domains_for_user(&self, email: &str) -> Result<Vec<Domain>, CatalogError> {
        Ok(self
            .domains
            .get(&email.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    fn seasons(&self, workspace_id: u64) -> Result<Vec<Season>, CatalogError> {
        Ok(self.seasons.get(&workspace_id).cloned().unwrap_or_default())
    }

    fn farms(&self, workspace_id: u64, season_id: u64) -> Result<Vec<Farm>, CatalogError> {
        Ok(self
            .farms
            .get(&(workspace_id, season_id))
            .cloned()
            .unwrap_or_default())
    }

    fn fields(&self, season_id: u64, farm_id: u64) -> Result<Vec<FieldRecord>, CatalogError> {
        Ok(self
            .fields
            .get(&(season_id, farm_id))
            .cloned()
            .unwrap_or_default())
    }
}

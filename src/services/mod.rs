//! Business logic services

pub mod borrows;
pub mod catalog;
pub mod fines;
pub mod stats;

use crate::{config::PolicyConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub borrows: borrows::BorrowsService,
    pub fines: fines::FinesService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services with the given repository and policy
    pub fn new(repository: Repository, policy: PolicyConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            borrows: borrows::BorrowsService::new(repository.clone(), policy),
            fines: fines::FinesService::new(repository.clone()),
            stats: stats::StatsService::new(repository),
        }
    }
}

//! Business logic services

pub mod access;
pub mod catalog;
pub mod transactions;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub access: access::AccessService,
    pub catalog: catalog::CatalogService,
    pub users: users::UsersService,
    pub transactions: transactions::TransactionsService,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let access = access::AccessService::new(repository.clone(), config.auth.clone());
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            users: users::UsersService::new(repository.clone(), access.clone()),
            transactions: transactions::TransactionsService::new(
                repository,
                transactions::LoanPolicy::from(&config.loans),
            ),
            access,
        }
    }
}

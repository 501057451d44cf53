pub mod account_pg;
mod account_pg_helpers;
pub mod config;
pub mod repository;

pub use account_pg::PostgresAccountRepository;
pub use repository::{AccountRepository, RepoResult, RepositoryError};

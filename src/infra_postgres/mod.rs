mod blacklist_repo_postgres;
mod refresh_token_repo_postgres;
mod schema;

pub use blacklist_repo_postgres::*;
pub use refresh_token_repo_postgres::*;
pub use schema::*;

mod repo_tx_postgres;

pub use repo_tx_postgres::*;

mod util;

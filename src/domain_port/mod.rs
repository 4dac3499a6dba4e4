// notifier

mod origin_notifier;

pub use origin_notifier::*;

// repo

mod blacklist_repo;
mod refresh_token_repo;

mod repo_tx;

pub use blacklist_repo::*;
pub use refresh_token_repo::*;

pub use repo_tx::*;

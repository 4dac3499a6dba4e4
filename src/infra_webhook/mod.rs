mod webhook_notifier_reqwest;

pub use webhook_notifier_reqwest::*;
